use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use shelf_core::config::ShelfConfig;
use shelf_core::error::FailureKind;
use shelf_core::mutation::Outcome;
use shelf_core::session::{Opened, Session, SessionEvent, SessionManager};
use shelf_core::view::View;
use shelf_platform::model::{FileId, UserId};
use shelf_platform::persistence::{ProgressFn, UploadFile};

mod render;

#[derive(Parser, Debug)]
#[command(name = "cloudshelf")]
#[command(about = "Browse and manage files stored in a cloudshelf account")]
#[command(version)]
struct Cli {
    /// Persistence API base URL (e.g., https://shelf.example.com)
    #[arg(long, env = "SHELF_API_URL", global = true)]
    api_url: Option<String>,

    /// Signed-in user id
    #[arg(long, env = "SHELF_USER_ID", global = true)]
    user: Option<String>,

    /// Image CDN endpoint for image downloads and previews
    #[arg(long, env = "SHELF_IMAGE_ENDPOINT", global = true)]
    image_endpoint: Option<String>,

    /// Path to config file
    #[arg(long, env = "SHELF_CONFIG_PATH", global = true)]
    config_path: Option<String>,

    /// Folder id to operate in (default: root)
    #[arg(long, global = true)]
    folder: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SHELF_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the folder contents in one view
    Ls {
        /// all, starred or trash
        #[arg(long, default_value = "all")]
        view: View,
        /// Print entities as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle the starred flag of an item
    Star { id: String },
    /// Move an item to trash, or restore it if already trashed
    Trash { id: String },
    /// Permanently delete an item from trash
    Rm {
        id: String,
        /// Delete even if the item is not in trash
        #[arg(long)]
        force: bool,
    },
    /// Permanently delete everything in trash
    EmptyTrash,
    /// Create a folder
    Mkdir { name: String },
    /// Upload a local file (5 MB max)
    Upload { file: PathBuf },
    /// Download an item to a local file
    Download {
        id: String,
        /// Output path (default: the item's name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the image viewer URL for an image
    Preview { id: String },
    /// Interactive navigation over stdin
    Browse,
    /// Write the merged settings to the config file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("cloudshelf v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(ShelfConfig::default_path);

    let mut config = if config_path.exists() {
        info!("loading config from {}", config_path.display());
        ShelfConfig::load(&config_path)?
    } else {
        debug!("no config at {}, using defaults", config_path.display());
        ShelfConfig::default()
    };

    // CLI args override config file
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(endpoint) = cli.image_endpoint {
        config.image_endpoint = Some(endpoint);
    }
    if let Some(user) = cli.user {
        config.user_id = Some(user);
    }

    if let Commands::Config = cli.command {
        config.save(&config_path)?;
        println!("config saved to {}", config_path.display());
        return Ok(());
    }

    let user = match config.user_id.as_deref() {
        Some(user) if !user.trim().is_empty() => UserId::new(user.trim()),
        _ => bail!("user id is required (--user or config file)"),
    };

    let mut manager = SessionManager::from_config(config)?;
    let (session, events) = manager.open(user);

    let result = match cli.command {
        Commands::Browse => browse(&session, events, cli.folder).await,
        command => {
            // one-shot commands report through their return value
            drop(events);
            enter_start_folder(&session, cli.folder).await?;
            run_command(&session, command).await
        }
    };

    manager.close_all();
    result
}

async fn enter_start_folder(session: &Session, folder: Option<String>) -> Result<()> {
    match folder {
        Some(id) => session
            .enter(FileId::new(id.clone()), id)
            .await
            .context("failed to open folder"),
        None => session.refresh().await.context("failed to load files"),
    }
}

fn report(outcome: Outcome) -> Result<()> {
    println!("{}", render::outcome(&outcome));
    if outcome.is_success() {
        Ok(())
    } else {
        bail!("{} failed", outcome.action())
    }
}

async fn run_command(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Ls { view, json } => {
            session.set_view(view);
            let entities = session.visible_entities();
            if json {
                println!("{}", serde_json::to_string_pretty(&entities)?);
            } else {
                println!("{}", render::view_tabs(view, session.counts()));
                println!("{}", render::listing(&entities));
            }
            Ok(())
        }
        Commands::Star { id } => report(session.toggle_star(&FileId::new(id)).await),
        Commands::Trash { id } => report(session.toggle_trash(&FileId::new(id)).await),
        Commands::Rm { id, force } => {
            let id = FileId::new(id);
            if !force {
                check_deletable(session, &id)?;
            }
            report(session.delete_permanent(&id).await)
        }
        Commands::EmptyTrash => report(session.empty_trash().await),
        Commands::Mkdir { name } => report(session.create_folder(&name).await),
        Commands::Upload { file } => {
            let upload = read_upload(&file).await?;
            report(session.upload(upload, Some(progress_printer())).await)
        }
        Commands::Download { id, output } => {
            let (outcome, file) = session.download(&FileId::new(id)).await;
            if let Some(file) = file {
                let path = output.unwrap_or_else(|| PathBuf::from(&file.name));
                tokio::fs::write(&path, &file.data)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!("saved {} bytes to {}", file.data.len(), path.display());
            }
            report(outcome)
        }
        Commands::Preview { id } => {
            println!("{}", session.preview_url(&FileId::new(id))?);
            Ok(())
        }
        Commands::Browse | Commands::Config => bail!("{:?} is not a one-shot command", command),
    }
}

/// Permanent delete is only offered for trashed items
fn check_deletable(session: &Session, id: &FileId) -> Result<()> {
    match session.actions(id) {
        Some(actions) if !actions.delete_permanent => {
            bail!("{} is not in trash; trash it first or pass --force", id)
        }
        _ => Ok(()),
    }
}

async fn read_upload(path: &Path) -> Result<UploadFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("{} has no file name", path.display()))?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(UploadFile {
        content_type: guess_content_type(&name).to_string(),
        name,
        data: Bytes::from(data),
    })
}

fn guess_content_type(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

fn progress_printer() -> ProgressFn {
    Arc::new(|sent: u64, total: u64| {
        let pct = if total == 0 { 100 } else { sent * 100 / total };
        eprint!("\ruploading... {:>3}%", pct);
        if sent >= total {
            eprintln!();
        }
    })
}

const BROWSE_HELP: &str = "commands: ls | view <all|starred|trash> | cd <id> | open <id> | up | jump <n> | \
refresh | star <id> | trash <id> | rm <id> | empty-trash | mkdir <name> | upload <path> | \
download <id> | preview <id> | help | quit";

async fn browse(
    session: &Session,
    mut events: mpsc::Receiver<SessionEvent>,
    folder: Option<String>,
) -> Result<()> {
    if let Err(e) = enter_start_folder(session, folder).await {
        warn!("{:#}", e);
    }
    println!("signed in as {}", session.user());
    println!("{}", BROWSE_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if matches!(line, "quit" | "exit" | "q") {
                            break;
                        }
                        if let Err(e) = browse_command(session, line).await {
                            println!("error {:#}", e);
                        }
                    }
                    None => break,
                }
            }
            event = events.recv() => {
                match event {
                    Some(SessionEvent::Outcome(outcome)) => println!("{}", render::outcome(&outcome)),
                    Some(SessionEvent::LoadFailed { detail }) => {
                        println!("error {}: {}", FailureKind::FetchError.title(), detail);
                    }
                    Some(SessionEvent::Loaded { .. }) => print_scope(session),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn print_scope(session: &Session) {
    println!();
    println!("{}", render::breadcrumbs(&session.navigation_path()));
    if session.is_stale() {
        println!("(showing cached entries; `refresh` to retry)");
    }
    println!("{}", render::view_tabs(session.active_view(), session.counts()));
    println!("{}", render::listing(&session.visible_entities()));
}

async fn browse_command(session: &Session, line: &str) -> Result<()> {
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };
    let id = || -> Result<FileId> {
        if arg.is_empty() {
            bail!("{} needs an item id", cmd);
        }
        Ok(FileId::from(arg))
    };

    match cmd {
        "help" | "?" => println!("{}", BROWSE_HELP),
        "ls" => print_scope(session),
        "view" => {
            session.set_view(arg.parse().map_err(anyhow::Error::msg)?);
            print_scope(session);
        }
        "cd" | "open" => match session.open(&id()?).await? {
            Opened::Folder(_) => {}
            Opened::Image { url } => println!("{}", url),
            Opened::Nothing => println!("no preview for this item"),
        },
        "up" => session.up().await?,
        "jump" => {
            let index: isize = arg.parse().context("jump needs a crumb index")?;
            session.jump_to(index).await?;
        }
        "refresh" => session.refresh().await?,
        "star" => {
            session.toggle_star(&id()?).await;
        }
        "trash" => {
            session.toggle_trash(&id()?).await;
        }
        "rm" => {
            let id = id()?;
            check_deletable(session, &id)?;
            session.delete_permanent(&id).await;
        }
        "empty-trash" => {
            session.empty_trash().await;
        }
        "mkdir" => {
            session.create_folder(arg).await;
        }
        "upload" => {
            let upload = read_upload(Path::new(arg)).await?;
            session.upload(upload, Some(progress_printer())).await;
        }
        "download" => {
            let (_, file) = session.download(&id()?).await;
            if let Some(file) = file {
                tokio::fs::write(&file.name, &file.data)
                    .await
                    .with_context(|| format!("failed to write {}", file.name))?;
            }
        }
        "preview" => println!("{}", session.preview_url(&id()?)?),
        other => bail!("unknown command {:?}, try `help`", other),
    }
    Ok(())
}
