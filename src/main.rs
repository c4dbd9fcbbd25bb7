use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};

use pdfpane::api::ApiClient;
use pdfpane::panic_handler;
use pdfpane::pdf::{
    DocumentLocator, EngineConfig, MuPdfProvider, MuPdfRasterizer, RenderDriver, RenderState,
    write_pages,
};
use pdfpane::settings;

const LOG_FILE: &str = "pdfpane.log";
const PASSWORD_ENV: &str = "PDFPANE_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "pdfpane", version, about = "Render PDFs page by page from disk or the file API")]
struct Cli {
    /// Log debug output to pdfpane.log
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a local path or URL to PNG pages
    Render {
        locator: String,
        /// Output directory (defaults to the configured output_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Render a stored file by id
    View {
        id: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List stored files
    Files,
    /// Show one stored file's details
    Show { id: String },
    /// Check that the API is reachable
    Health,
    /// Sign in and store the session token in the settings file
    Login {
        email: String,
        /// Password (falls back to PDFPANE_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the stored session token
    Logout,
    /// Show the signed-in account
    Me,
    /// Upload a local PDF to the file API
    Upload { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    panic_handler::initialize_panic_handler();
    settings::load_settings();

    info!("Starting pdfpane");
    let engine = EngineConfig::initialize(&settings::current());

    let result = run(cli.command, engine);
    if let Err(e) = &result {
        error!("Command failed: {e:?}");
    }
    info!("Shutting down pdfpane");
    result
}

fn init_logging(verbose: bool) -> Result<()> {
    let file_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Warn,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            file_level,
            Config::default(),
            File::create(LOG_FILE).with_context(|| format!("creating {LOG_FILE}"))?,
        ),
    ])?;
    Ok(())
}

fn run(command: Command, engine: EngineConfig) -> Result<()> {
    match command {
        Command::Render { locator, out } => {
            let locator = DocumentLocator::new(locator)?;
            render(locator, &output_dir(out), engine)
        }
        Command::View { id, out } => {
            let api = api_client()?;
            let locator = DocumentLocator::for_file(api.base_url(), &id)?;
            render(locator, &output_dir(out), engine)
        }
        Command::Files => list_files(),
        Command::Show { id } => show_file(&id),
        Command::Health => {
            let health = api_client()?.health()?;
            println!("{}", health.status);
            Ok(())
        }
        Command::Login { email, password } => login(&email, password),
        Command::Logout => {
            if let Err(e) = api_client()?.logout() {
                warn!("Server-side logout failed: {e}");
            }
            settings::set_session_token(None);
            println!("Signed out.");
            Ok(())
        }
        Command::Me => {
            let user = api_client()?.me()?;
            println!("{} ({}, {} plan)", user.email, user.role, user.plan);
            println!("member since {}", user.created_at);
            Ok(())
        }
        Command::Upload { path } => {
            let slot = api_client()?
                .upload(&path)
                .with_context(|| format!("uploading {}", path.display()))?;
            println!("Uploaded {} as {}", path.display(), slot.file_id);
            Ok(())
        }
    }
}

fn output_dir(out: Option<PathBuf>) -> PathBuf {
    out.unwrap_or_else(settings::get_output_dir)
}

fn api_client() -> Result<ApiClient> {
    ApiClient::from_settings().context("building API client")
}

fn render(locator: DocumentLocator, out: &Path, engine: EngineConfig) -> Result<()> {
    let provider = MuPdfProvider::new(api_client()?);
    let mut driver = RenderDriver::new(provider, MuPdfRasterizer::new(engine));

    println!("Loading PDF… ({locator})");
    let cycle = driver.render(locator);
    let state = cycle.wait().unwrap_or_else(|| driver.state());

    let surface = driver.surface();
    let written = write_pages(out, surface.iter().map(Arc::as_ref))
        .with_context(|| format!("writing pages to {}", out.display()))?;

    match state {
        RenderState::Ready => {
            println!("Rendered {} page(s) into {}", written.len(), out.display());
            Ok(())
        }
        RenderState::Failed(message) => {
            if !written.is_empty() {
                eprintln!(
                    "{} page(s) rendered before the failure were kept in {}",
                    written.len(),
                    out.display()
                );
            }
            bail!(message)
        }
        RenderState::Loading => bail!("render cycle ended without a result"),
    }
}

fn login(email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => std::env::var(PASSWORD_ENV)
            .with_context(|| format!("pass --password or set {PASSWORD_ENV}"))?,
    };

    let token = api_client()?.login(email, &password)?;
    settings::set_session_token(Some(token));
    println!("Signed in as {email}.");
    Ok(())
}

fn list_files() -> Result<()> {
    let files = api_client()?.list_files()?;
    if files.is_empty() {
        println!("No files yet.");
        return Ok(());
    }

    for file in files {
        println!(
            "{}  {:>8.2} MB  {}  {}",
            file.id,
            file.size_mb(),
            file.created_at,
            file.name
        );
    }
    Ok(())
}

fn show_file(id: &str) -> Result<()> {
    let api = api_client()?;
    let file = api.file(id)?;
    println!("{}", file.name);
    println!("{:.2} MB • {}", file.size_mb(), file.created_at);
    if let Some(key) = &file.storage_key {
        println!("storage key: {key}");
    }
    let content = match &file.content_url {
        Some(url) => url.clone(),
        None => DocumentLocator::for_file(api.base_url(), &file.id)?.to_string(),
    };
    println!("content: {content}");
    Ok(())
}
