//! The embedded assistant. The chatbot lives outside the `/api` prefix, so
//! it gets its own absolute URL instead of a path on the client's base.

use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError};

#[derive(Serialize)]
struct Question<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct Answer {
    reply: String,
}

pub async fn ask(api: &ApiClient, chatbot_url: &str, message: &str) -> Result<String, ApiError> {
    let response = api
        .execute(|http| http.post(chatbot_url).json(&Question { message }))
        .await?;
    let answer: Answer = response.json().await?;
    Ok(answer.reply)
}
