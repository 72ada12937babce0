mod api;
mod config;
mod review;
mod session;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use api::{
    ApiClient, ApiError, Upload,
    anuncios::{self, AnuncioDraft, AnuncioFilter},
    chat,
    entidades::{self, EntidadDraft},
    notificaciones,
    usuarios::{self, NuevoUsuario},
};
use config::AppConfig;
use review::{EstadoAnuncio, ReviewAction};
use session::{Role, SessionStore, storage::SessionFile};

/// Administration console for the Escomunidad announcement platform.
#[derive(Parser)]
#[command(name = "escomunidad", version, about = "Escomunidad administration console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and open a session
    Login {
        username: String,
    },
    /// End the current session
    Logout,
    /// Show the current session
    Whoami,
    /// Ask the API to mail a password-reset token
    ForgotPassword {
        email: String,
    },
    /// Set a new password using a reset token
    ResetPassword {
        token: String,
    },
    /// Organizations that publish announcements
    #[command(subcommand)]
    Entidades(EntidadesCmd),
    /// Announcements and their review workflow
    #[command(subcommand)]
    Anuncios(AnunciosCmd),
    /// Platform accounts
    #[command(subcommand)]
    Usuarios(UsuariosCmd),
    /// Notification feed
    #[command(subcommand)]
    Notificaciones(NotificacionesCmd),
    /// Talk to the embedded assistant; omit the message for a prompt loop
    Chat {
        message: Option<String>,
    },
}

#[derive(Subcommand)]
enum EntidadesCmd {
    List,
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        nombre: String,
        #[arg(long)]
        correo: Option<String>,
        #[arg(long)]
        contacto: Option<String>,
        #[arg(long)]
        telefono: Option<String>,
        /// Cover image, uploaded as multipart
        #[arg(long)]
        portada: Option<PathBuf>,
    },
    Update {
        id: i64,
        #[arg(long)]
        nombre: String,
        #[arg(long)]
        correo: Option<String>,
        #[arg(long)]
        contacto: Option<String>,
        #[arg(long)]
        telefono: Option<String>,
        #[arg(long)]
        portada: Option<PathBuf>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum AnunciosCmd {
    List {
        #[arg(long)]
        entidad: Option<i64>,
        #[arg(long)]
        estado: Option<EstadoAnuncio>,
    },
    /// Public banner feed, no session required
    Public,
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        titulo: String,
        #[arg(long)]
        descripcion: String,
        #[arg(long)]
        frase: Option<String>,
        #[arg(long)]
        entidad: i64,
        #[arg(long)]
        fecha_inicio: Option<NaiveDate>,
        #[arg(long)]
        fecha_fin: Option<NaiveDate>,
        #[arg(long)]
        banner: Option<PathBuf>,
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    Update {
        id: i64,
        #[arg(long)]
        titulo: String,
        #[arg(long)]
        descripcion: String,
        #[arg(long)]
        frase: Option<String>,
        #[arg(long)]
        entidad: i64,
        #[arg(long)]
        fecha_inicio: Option<NaiveDate>,
        #[arg(long)]
        fecha_fin: Option<NaiveDate>,
        #[arg(long)]
        banner: Option<PathBuf>,
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    Delete {
        id: i64,
    },
    /// Approve a pending announcement
    Aprobar {
        id: i64,
    },
    /// Reject a pending announcement with a comment for the author
    Rechazar {
        id: i64,
        #[arg(long)]
        comentario: String,
    },
    /// Resubmit a rejected announcement of your own, moving it back to review
    Reenviar {
        id: i64,
        #[arg(long)]
        titulo: String,
        #[arg(long)]
        descripcion: String,
        #[arg(long)]
        frase: Option<String>,
        #[arg(long)]
        fecha_inicio: Option<NaiveDate>,
        #[arg(long)]
        fecha_fin: Option<NaiveDate>,
        #[arg(long)]
        banner: Option<PathBuf>,
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum UsuariosCmd {
    List {
        #[arg(long)]
        role: Option<Role>,
    },
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        entidad: Option<i64>,
    },
    /// Enable or disable an account
    ToggleActive {
        id: i64,
    },
    /// Re-send the activation token to an account without a password yet
    ResendToken {
        id: i64,
    },
}

#[derive(Subcommand)]
enum NotificacionesCmd {
    List,
    /// Mark notifications as seen
    MarcarVista {
        ids: Vec<i64>,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    if let Err(err) = app_main().await {
        report_error(&err);
        std::process::exit(1);
    }
}

async fn app_main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let session = SessionStore::new(
        config.session_duration,
        SessionFile::new(&config.session_file),
    );
    if session.restore().await? {
        debug!("persisted session restored");
    }
    let api = ApiClient::new(config.api_base_url.clone(), session.clone());

    match cli.command {
        Commands::Login { username } => {
            let password = dialoguer::Password::new()
                .with_prompt(format!("Password for {username}"))
                .interact()
                .context("failed to read the password")?;
            let role = session.login(api.auth(), &username, &password).await?;
            println!("Logged in as {username} ({role})");
        }
        Commands::Logout => {
            session.logout(api.auth()).await;
            println!("Logged out");
        }
        Commands::Whoami => match session.current().await {
            Some(current) => {
                let remaining = (current.expires_at - Utc::now()).num_minutes().max(0);
                println!("{} ({})", current.claims.username, current.role);
                if let Some(entidad) = current.claims.entidad_id {
                    println!("entidad: {entidad}");
                }
                println!("session expires in {remaining} minutes");
            }
            None => println!("Not logged in"),
        },
        Commands::ForgotPassword { email } => {
            api.auth().forgot_password(&email).await?;
            println!("If the address exists, a reset token is on its way to {email}");
        }
        Commands::ResetPassword { token } => {
            api.auth().verify_reset_token(&token).await?;
            let password = dialoguer::Password::new()
                .with_prompt("New password")
                .with_confirmation("Repeat new password", "The passwords do not match")
                .interact()
                .context("failed to read the new password")?;
            api.auth().reset_password(&token, &password).await?;
            println!("Password updated, you can log in now");
        }
        Commands::Entidades(cmd) => run_entidades(&api, cmd).await?,
        Commands::Anuncios(cmd) => run_anuncios(&api, &session, cmd).await?,
        Commands::Usuarios(cmd) => run_usuarios(&api, cmd).await?,
        Commands::Notificaciones(cmd) => run_notificaciones(&api, cmd).await?,
        Commands::Chat { message } => run_chat(&api, &config, message).await?,
    }

    Ok(())
}

async fn run_entidades(api: &ApiClient, cmd: EntidadesCmd) -> Result<()> {
    match cmd {
        EntidadesCmd::List => {
            for entidad in entidades::list(api).await? {
                println!("{:>4}  {}", entidad.id, entidad.nombre);
            }
        }
        EntidadesCmd::Show { id } => {
            let entidad = entidades::get(api, id).await?;
            println!("#{} {}", entidad.id, entidad.nombre);
            if let Some(correo) = &entidad.correo {
                println!("correo: {correo}");
            }
            if let Some(contacto) = &entidad.contacto {
                println!("contacto: {contacto}");
            }
            if let Some(telefono) = &entidad.telefono {
                println!("telefono: {telefono}");
            }
            if let Some(portada) = &entidad.foto_portada {
                println!("portada: {portada}");
            }
        }
        EntidadesCmd::Create {
            nombre,
            correo,
            contacto,
            telefono,
            portada,
        } => {
            let cover = portada.map(Upload::from_path).transpose()?;
            let draft = EntidadDraft {
                nombre,
                correo,
                contacto,
                telefono,
            };
            let created = entidades::create(api, &draft, cover.as_ref()).await?;
            println!("Created entidad #{} {}", created.id, created.nombre);
        }
        EntidadesCmd::Update {
            id,
            nombre,
            correo,
            contacto,
            telefono,
            portada,
        } => {
            let cover = portada.map(Upload::from_path).transpose()?;
            let draft = EntidadDraft {
                nombre,
                correo,
                contacto,
                telefono,
            };
            let updated = entidades::update(api, id, &draft, cover.as_ref()).await?;
            println!("Updated entidad #{} {}", updated.id, updated.nombre);
        }
        EntidadesCmd::Delete { id } => {
            entidades::delete(api, id).await?;
            println!("Deleted entidad #{id}");
        }
    }
    Ok(())
}

async fn run_anuncios(api: &ApiClient, session: &SessionStore, cmd: AnunciosCmd) -> Result<()> {
    match cmd {
        AnunciosCmd::List { entidad, estado } => {
            let filter = AnuncioFilter { entidad, estado };
            for anuncio in anuncios::list(api, &filter).await? {
                println!("{:>4}  [{}]  {}", anuncio.id, anuncio.estado, anuncio.titulo);
            }
        }
        AnunciosCmd::Public => {
            for anuncio in anuncios::public(api).await? {
                println!("{:>4}  {}", anuncio.id, anuncio.titulo);
            }
        }
        AnunciosCmd::Show { id } => {
            let anuncio = anuncios::get(api, id).await?;
            print_anuncio(&anuncio);
        }
        AnunciosCmd::Create {
            titulo,
            descripcion,
            frase,
            entidad,
            fecha_inicio,
            fecha_fin,
            banner,
            pdf,
        } => {
            let banner = banner.map(Upload::from_path).transpose()?;
            let pdf = pdf.map(Upload::from_path).transpose()?;
            let draft = AnuncioDraft {
                titulo,
                frase,
                descripcion,
                fecha_inicio,
                fecha_fin,
                entidad,
                estado: None,
            };
            let created = anuncios::create(api, &draft, banner.as_ref(), pdf.as_ref()).await?;
            println!("Created anuncio #{} ({})", created.id, created.estado);
        }
        AnunciosCmd::Update {
            id,
            titulo,
            descripcion,
            frase,
            entidad,
            fecha_inicio,
            fecha_fin,
            banner,
            pdf,
        } => {
            let banner = banner.map(Upload::from_path).transpose()?;
            let pdf = pdf.map(Upload::from_path).transpose()?;
            let draft = AnuncioDraft {
                titulo,
                frase,
                descripcion,
                fecha_inicio,
                fecha_fin,
                entidad,
                estado: None,
            };
            let updated = anuncios::update(api, id, &draft, banner.as_ref(), pdf.as_ref()).await?;
            println!("Updated anuncio #{} ({})", updated.id, updated.estado);
        }
        AnunciosCmd::Delete { id } => {
            anuncios::delete(api, id).await?;
            println!("Deleted anuncio #{id}");
        }
        AnunciosCmd::Aprobar { id } => {
            let mut anuncio = anuncios::get(api, id).await?;
            review::submit_review(api, &mut anuncio, ReviewAction::Aprobar, None).await?;
            println!("Anuncio #{} is now {}", anuncio.id, anuncio.estado);
        }
        AnunciosCmd::Rechazar { id, comentario } => {
            let mut anuncio = anuncios::get(api, id).await?;
            review::submit_review(api, &mut anuncio, ReviewAction::Rechazar, Some(&comentario))
                .await?;
            println!("Anuncio #{} is now {}", anuncio.id, anuncio.estado);
        }
        AnunciosCmd::Reenviar {
            id,
            titulo,
            descripcion,
            frase,
            fecha_inicio,
            fecha_fin,
            banner,
            pdf,
        } => {
            let mut anuncio = anuncios::get(api, id).await?;
            let Some(current) = session.current().await else {
                bail!("resubmitting requires a session; log in first");
            };
            if !review::can_resubmit(&current.claims, &anuncio) {
                bail!(
                    "anuncio #{} is not a rejected announcement of yours; only its creator can resubmit it",
                    anuncio.id
                );
            }

            let banner = banner.map(Upload::from_path).transpose()?;
            let pdf = pdf.map(Upload::from_path).transpose()?;
            let draft = AnuncioDraft {
                titulo,
                frase,
                descripcion,
                fecha_inicio,
                fecha_fin,
                entidad: anuncio.entidad,
                estado: None,
            };
            review::resubmit(api, &mut anuncio, draft, banner.as_ref(), pdf.as_ref()).await?;
            println!("Anuncio #{} sent back to review ({})", anuncio.id, anuncio.estado);
        }
    }
    Ok(())
}

async fn run_usuarios(api: &ApiClient, cmd: UsuariosCmd) -> Result<()> {
    match cmd {
        UsuariosCmd::List { role } => {
            for usuario in usuarios::list(api, role).await? {
                let state = if usuario.is_active { "active" } else { "inactive" };
                println!(
                    "{:>4}  {:<24} {:<12} {}",
                    usuario.id, usuario.username, usuario.role, state
                );
            }
        }
        UsuariosCmd::Create {
            username,
            email,
            role,
            entidad,
        } => {
            let created = usuarios::create(
                api,
                &NuevoUsuario {
                    username,
                    email,
                    role,
                    entidad,
                },
            )
            .await?;
            println!("Created usuario #{} {}", created.id, created.username);
        }
        UsuariosCmd::ToggleActive { id } => {
            let updated = usuarios::toggle_active(api, id).await?;
            let state = if updated.is_active { "active" } else { "inactive" };
            println!("Usuario #{} is now {state}", updated.id);
        }
        UsuariosCmd::ResendToken { id } => {
            usuarios::resend_token(api, id).await?;
            println!("Activation token re-sent to usuario #{id}");
        }
    }
    Ok(())
}

async fn run_notificaciones(api: &ApiClient, cmd: NotificacionesCmd) -> Result<()> {
    match cmd {
        NotificacionesCmd::List => {
            for n in notificaciones::list(api).await? {
                let marker = if n.visto { " " } else { "*" };
                println!("{marker} {:>4}  {}", n.id, n.mensaje);
            }
        }
        NotificacionesCmd::MarcarVista { ids } => {
            if ids.is_empty() {
                bail!("pass at least one notification id");
            }
            notificaciones::marcar_vista(api, &ids).await?;
            println!("Marked {} notification(s) as seen", ids.len());
        }
    }
    Ok(())
}

async fn run_chat(api: &ApiClient, config: &AppConfig, message: Option<String>) -> Result<()> {
    if let Some(message) = message {
        let reply = chat::ask(api, &config.chatbot_url, &message).await?;
        println!("{reply}");
        return Ok(());
    }

    // Prompt loop; an empty message ends the conversation.
    loop {
        let message: String = dialoguer::Input::new()
            .with_prompt("you")
            .allow_empty(true)
            .interact_text()
            .context("failed to read the chat message")?;
        if message.trim().is_empty() {
            return Ok(());
        }
        let reply = chat::ask(api, &config.chatbot_url, &message).await?;
        println!("bot: {reply}");
    }
}

fn print_anuncio(anuncio: &anuncios::Anuncio) {
    println!("#{} {} [{}]", anuncio.id, anuncio.titulo, anuncio.estado);
    if let Some(frase) = &anuncio.frase {
        println!("{frase}");
    }
    println!("{}", anuncio.descripcion);
    if let (Some(inicio), Some(fin)) = (anuncio.fecha_inicio, anuncio.fecha_fin) {
        println!("vigencia: {inicio} a {fin}");
    }
    if let Some(banner) = &anuncio.banner {
        println!("banner: {banner}");
    }
    if let Some(pdf) = &anuncio.archivo_pdf {
        println!("pdf: {pdf}");
    }
    if anuncio.estado == EstadoAnuncio::Rechazado {
        if let Some(comentario) = &anuncio.comentarios_rechazo {
            println!("motivo del rechazo: {comentario}");
        }
    }
}

/// Render API failures by taxonomy: validation errors field by field, a
/// terminal session expiry as a log-in hint, everything else as the server's
/// detail message.
fn report_error(err: &anyhow::Error) {
    if let Some(api_err) = err.downcast_ref::<ApiError>() {
        match api_err {
            ApiError::SessionExpired => {
                eprintln!("Your session expired and could not be refreshed. Please log in again.");
            }
            _ => {
                let fields = api_err.field_errors();
                if !fields.is_empty() {
                    eprintln!("The API rejected the request:");
                    for (field, message) in fields {
                        eprintln!("  {field}: {message}");
                    }
                } else if let Some(detail) = api_err.detail() {
                    eprintln!("{detail}");
                } else {
                    eprintln!("{api_err}");
                }
            }
        }
        return;
    }
    error!(?err, "command failed");
    eprintln!("{err:#}");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
