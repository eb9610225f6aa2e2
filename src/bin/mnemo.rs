//! mnemo - inspect and edit a memory snapshot
//!
//! Usage:
//!   mnemo stats                          → counts, edges, world state
//!   mnemo list --role semantic --last 10 → filtered listing
//!   mnemo add "text" --role episodic     → append a memory
//!   mnemo remove mem-1a2b3c4d            → delete a memory and its edges
//!   mnemo config                         → print the default config

use clap::{Parser, Subcommand};
use mnemo::format::{format_memories, world_state, MemoryFormat};
use mnemo_agent::EngineConfig;
use mnemo_core::{
    Error, MemoryId, MemoryKind, MetadataFilter, MetadataPatch, PriorityLevel, Query,
    TemporalScope,
};
use mnemo_memory::MemoryStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "mnemo",
    about = "Inspect and edit a mnemo memory snapshot",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to engine config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot file (overrides [store].path from the config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show memory counts, connections and the world state block
    Stats,
    /// List memories
    List {
        /// internal or external
        #[arg(long)]
        kind: Option<String>,
        /// Metadata role (e.g. semantic, message)
        #[arg(long)]
        role: Option<String>,
        /// Keep only the N oldest matches
        #[arg(long, conflicts_with = "last")]
        first: Option<usize>,
        /// Keep only the N newest matches
        #[arg(long)]
        last: Option<usize>,
        /// default or conversation
        #[arg(long, default_value = "default")]
        format: String,
    },
    /// Add a memory
    Add {
        content: String,
        #[arg(long, default_value = "internal")]
        kind: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        /// CORE, HIGH, MEDIUM, LOW or BACKGROUND
        #[arg(long)]
        priority: Option<String>,
        /// short_term or long_term
        #[arg(long)]
        scope: Option<String>,
        /// Parent memory ids
        #[arg(long = "parent")]
        parents: Vec<String>,
    },
    /// Remove a memory
    Remove { id: String },
    /// Print the default config as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    };
    let path = cli.store.clone().unwrap_or_else(|| config.store.path.clone());
    let store = MemoryStore::new().target(&path);

    match cli.command {
        Commands::Stats => {
            let stats = store.stats().await;
            println!("Snapshot: {}", path.display());
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!();
            println!("### World State");
            print!("{}", world_state(&stats));
        }

        Commands::List {
            kind,
            role,
            first,
            last,
            format,
        } => {
            let format: MemoryFormat = format.parse().map_err(anyhow::Error::msg)?;
            let mut query = Query::new();
            if let Some(kind) = kind {
                query = query.kind(kind.parse::<MemoryKind>().map_err(anyhow::Error::msg)?);
            }
            if let Some(role) = role {
                query = query.metadata(MetadataFilter::new().eq("role", role));
            }
            if let Some(n) = first {
                query = query.first(n);
            }
            if let Some(n) = last {
                query = query.last(n);
            }
            let memories = store.query(&query).await?;
            if memories.is_empty() {
                println!("(no memories)");
            } else {
                println!("{}", format_memories(&memories, format));
            }
        }

        Commands::Add {
            content,
            kind,
            role,
            unit,
            priority,
            scope,
            parents,
        } => {
            let kind: MemoryKind = kind
                .parse()
                .map_err(|e: String| Error::invalid_params("add", e))?;
            let mut patch = MetadataPatch::new();
            if let Some(role) = role {
                patch = patch.role(role);
            }
            if let Some(unit) = unit {
                patch = patch.unit_name(unit);
            }
            if let Some(p) = priority {
                let p: PriorityLevel = p.parse().map_err(|e: String| Error::invalid_params("add", e))?;
                patch = patch.priority(p);
            }
            if let Some(s) = scope {
                let s: TemporalScope = s.parse().map_err(|e: String| Error::invalid_params("add", e))?;
                patch = patch.scope(s);
            }
            let id = store
                .add(kind, content, patch, parents.into_iter().map(MemoryId::new))
                .await?;
            tracing::info!("Added {} to {}", id, path.display());
            println!("{}", id);
        }

        Commands::Remove { id } => {
            let id = MemoryId::new(id);
            if !store.remove(&id).await? {
                return Err(Error::NotFound(id).into());
            }
            tracing::info!("Removed {} from {}", id, path.display());
            println!("Removed {}", id);
        }

        Commands::Config => {
            print!("{}", EngineConfig::default().to_toml());
        }
    }

    Ok(())
}

fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mnemo=info,mnemo_memory=info,mnemo_agent=info".into());
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("invalid log file path: {}", path.display()))?;
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}
