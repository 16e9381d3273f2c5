use clap::{Parser, Subcommand};
use media_migrate::blob::BlobStore;
use media_migrate::cache::DerivationCache;
use media_migrate::feed::HttpFeed;
use media_migrate::imaging::RustBackend;
use media_migrate::migrate::{self, PublishStage};
use media_migrate::publish::HttpPublisher;
use media_migrate::upload::Uploader;
use media_migrate::{config, output, scan};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(clap::Args, Clone)]
struct UploadArgs {
    /// Derive and store renditions, but do not publish posts
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser)]
#[command(name = "media-migrate")]
#[command(about = "Migrate feed images into a content-addressed blob store")]
#[command(long_about = "\
Migrate feed images into a content-addressed blob store

Records are read page by page from the configured feed. Every image a
record references is derived into fixed renditions, named after the
SHA-256 of its compressed rendition, and written under generated/.
Extended records are then published as posts.

Source structure:

  content/
  ├── config.toml                  # Feed, publish and CDN settings
  ├── sources/
  │   ├── users/<name>.jpg         # Profile images → 200x200 avatar
  │   ├── restaurants/<name>.jpg   # Restaurant images → 200x200 avatar
  │   └── imagePosts/<name>.jpg    # Post images → compressed + original
  └── generated/                   # Written by upload
      ├── users/<digest>.jpg
      └── imagePosts/
          ├── <digest>.jpg
          └── orig.<digest>.jpg

Set RUST_LOG (e.g. RUST_LOG=media_migrate=debug) for diagnostic logging.

Run 'media-migrate gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Storage root holding config.toml, sources/ and generated/
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive, store and publish every page of the feed
    Upload(UploadArgs),
    /// Inventory the source tree and validate config without network access
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Upload(args) => {
            let config = config::load_config(&cli.source)?;
            let publishing = config.publish.enabled && !args.dry_run;
            config.require_upload_settings(publishing)?;
            init_thread_pool(&config.processing);

            let backend = RustBackend::new();
            let store = BlobStore::new(&cli.source);
            let cache = DerivationCache::new();
            let uploader = Uploader::new(&backend, &store, &cache);
            let feed = HttpFeed::new(&config.feed.url)?;

            let settings = config.post_settings();
            let publisher = if publishing {
                Some(HttpPublisher::new(&config.publish.url, &config.publish.api_key)?)
            } else {
                println!("==> Dry run: posts will not be published");
                None
            };
            let stage = publisher.as_ref().map(|sink| PublishStage {
                sink,
                settings: &settings,
            });

            println!("==> Migrating {} → {}", config.feed.url, cli.source.display());
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = migrate::run(feed, &uploader, stage, Some(tx));
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;
            let summary = result?;

            println!();
            output::print_summary(&summary);
            if !summary.is_clean() {
                tracing::warn!(
                    images = summary.image_failures.len(),
                    posts = summary.post_failures.len(),
                    "run completed with failures"
                );
            }
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            config::load_config(&cli.source)?;
            let inventory = scan::scan(&cli.source)?;
            output::print_inventory(&inventory);
            if !inventory.is_healthy() {
                return Err("source tree has unreadable sources or mismatched blobs".into());
            }
            println!("==> {} sources, config is valid", inventory.source_count());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Diagnostic logging to stderr; `RUST_LOG` overrides the default level.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
