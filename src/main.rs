//! mini-stitch CLI: re-stitch and export persisted capture sessions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use mini_stitch::state::status::TracingSink;
use mini_stitch::storage::export::export_bundle;
use mini_stitch::{CaptureSession, PlacementMode, SessionConfig, SessionStore};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "mini-stitch")]
#[command(about = "Stitch 4x2 capture sessions from their metadata documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stitch the session described by a metadata document.
    Stitch {
        /// Path to a Session_<id>.json document.
        #[arg(long)]
        metadata: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Stitch the most recently written session in the store.
    Latest {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Write the export bundle for a session without stitching.
    Export {
        /// Path to a Session_<id>.json document.
        #[arg(long)]
        metadata: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// Session store directory (defaults to the user data directory).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Session config file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the placement mode from the config.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Grid,
    Position,
}

impl From<ModeArg> for PlacementMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Grid => PlacementMode::Grid,
            ModeArg::Position => PlacementMode::Position,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Stitch { metadata, common } => run_stitch(&metadata, &common),
        Commands::Latest { common } => run_latest(&common),
        Commands::Export { metadata, common } => run_export(&metadata, &common),
    };

    if let Err(e) = result {
        tracing::error!("❌ {}", e);
        std::process::exit(1);
    }
}

fn load_config(common: &CommonArgs) -> CliResult<SessionConfig> {
    let mut config = match &common.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(mode) = common.mode {
        config.stitch.mode = mode.into();
    }
    Ok(config)
}

fn open_store(common: &CommonArgs) -> CliResult<SessionStore> {
    let store = match &common.root {
        Some(root) => SessionStore::open(root)?,
        None => SessionStore::open_default()?,
    };
    Ok(store)
}

fn run_stitch(metadata: &Path, common: &CommonArgs) -> CliResult<()> {
    let config = load_config(common)?;
    let store = open_store(common)?;
    stitch_document(metadata, config, &store)
}

fn run_latest(common: &CommonArgs) -> CliResult<()> {
    let config = load_config(common)?;
    let store = open_store(common)?;

    let Some(metadata) = store.latest_document()? else {
        return Err(format!("no session documents under {}", store.root().display()).into());
    };
    tracing::info!("📂 Latest session: {}", metadata.display());
    stitch_document(&metadata, config, &store)
}

fn run_export(metadata: &Path, common: &CommonArgs) -> CliResult<()> {
    let store = open_store(common)?;
    let document = SessionStore::load_document(metadata)?;

    let extras: Vec<PathBuf> = match document.session_id() {
        Some(id) => vec![store.composite_path(id), store.preview_path(id)],
        None => Vec::new(),
    };
    let report = export_bundle(&store, &document, &extras, &TracingSink)?;

    println!("{}", report.bundle_dir.display());
    Ok(())
}

fn stitch_document(metadata: &Path, config: SessionConfig, store: &SessionStore) -> CliResult<()> {
    let mut session = CaptureSession::resume_from_file(metadata, config)?;
    let result = session.finalize(store, &TracingSink)?;

    println!("{}", result.composite_path.display());
    if let Some(export) = &result.export {
        println!("{}", export.bundle_dir.display());
    }
    Ok(())
}
