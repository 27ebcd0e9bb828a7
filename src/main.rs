//! The `resound` command line: thin plumbing from arguments to the
//! repository facade.

use clap::{Parser, Subcommand};
use resound_config::RepositoryConfig;
use resound_container::AudioFormat;
use resound_convert::Converter;
use resound_repo::{AudioRepository, CachingStore, JsonMetadataStore};
use resound_store::{AudioItemId, LocalCacheTier, SandboxTier, SharedTier, TierHandle};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "resound", version, about = "Audio asset repository with tiered storage and format conversion")]
struct Cli {
    /// TOML configuration file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a new audio item from a file.
    Add { id: AudioItemId, source: PathBuf },
    /// Replace an existing item's content, refreshing every stored format.
    Update { id: AudioItemId, source: PathBuf },
    /// Print the path to an item in the given format, converting on demand.
    Get { id: AudioItemId, format: AudioFormat },
    /// Copy an item out of the repository (format taken from the target's
    /// extension unless given explicitly).
    Export {
        id: AudioItemId,
        target: PathBuf,
        #[arg(long)]
        format: Option<AudioFormat>,
    },
    /// Remove an item from storage and the metadata store.
    Delete { id: AudioItemId },
    /// Show which formats are currently stored for an item.
    Status { id: AudioItemId },
    /// Remove cached content that no metadata record references.
    Clean,
    /// Trim the local cache back to its configured byte budget.
    Gc,
}

/// exn error trees don't speak miette natively; their alternate debug
/// rendering carries the full tree and locations.
fn render(e: impl std::fmt::Debug) -> miette::Report {
    miette::miette!("{e:?}")
}

async fn build_repository(config: &RepositoryConfig) -> miette::Result<AudioRepository> {
    let local = LocalCacheTier::new(&config.local_cache_root).map_err(render)?;
    let shared: TierHandle = Arc::new(SharedTier::new(&config.shared_root).map_err(render)?);
    let sandbox: Option<TierHandle> = match &config.sandbox_root {
        Some(root) => Some(Arc::new(SandboxTier::new(root).map_err(render)?)),
        None => None,
    };
    let store = CachingStore::new(local, shared, sandbox);
    let converter = match &config.converter {
        Some(program) => Converter::at(program),
        None => Converter::discover().map_err(render)?,
    };
    let metadata = Arc::new(JsonMetadataStore::open(config.metadata_path()).await.map_err(render)?);
    Ok(AudioRepository::new(store, converter, metadata, config.gc_budget()))
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = resound_config::load(cli.config.as_deref()).map_err(render)?;
    let repo = build_repository(&config).await?;

    match cli.command {
        Command::Add { id, source } => {
            repo.add(&id, &source).await.map_err(render)?;
            println!("added {id}");
        },
        Command::Update { id, source } => {
            repo.update(&id, &source).await.map_err(render)?;
            println!("updated {id}");
        },
        Command::Get { id, format } => {
            let path = repo.get(&id, format).await.map_err(render)?;
            println!("{}", path.display());
        },
        Command::Export { id, target, format } => {
            let format = match format {
                Some(format) => format,
                None => AudioFormat::from_path(&target)
                    .ok_or_else(|| miette::miette!("cannot infer a format from {}", target.display()))?,
            };
            repo.export(&id, &target, format).await.map_err(render)?;
            println!("exported {id} to {}", target.display());
        },
        Command::Delete { id } => {
            let freed = repo.delete(&id).await.map_err(render)?;
            println!("deleted {id} ({freed} bytes)");
        },
        Command::Status { id } => {
            let formats = repo.stored_formats(&id).await;
            if formats.is_empty() {
                println!("{id}: nothing stored");
            } else {
                let list: Vec<_> = formats.iter().map(|f| f.to_string()).collect();
                println!("{id}: {}", list.join(", "));
            }
        },
        Command::Clean => {
            let report = repo.clean_unreferenced().await.map_err(render)?;
            println!("removed {} unreferenced items ({} bytes)", report.items_removed, report.bytes_freed);
            for (id, error) in &report.failures {
                eprintln!("failed to clean {id}: {error:?}");
            }
        },
        Command::Gc => {
            let report = repo.gc().await.map_err(render)?;
            println!("evicted {} files ({} bytes)", report.files_removed, report.bytes_freed);
        },
    }
    Ok(())
}
