use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use scopelog::config::source::ConfigSource;
use scopelog::lifecycle::{close_on_exit, Shutdown};
use scopelog::observability::{bridge, CategoryNamer, LogPipeline};

#[derive(Parser)]
#[command(name = "scopelog")]
#[command(about = "Inspect and exercise logging configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and print the effective merged document
    Check {
        /// Defaults to $SCOPELOG_CONFIG, then config/logging.toml
        config: Option<PathBuf>,
    },
    /// Print the category derived for a source location
    Category {
        location: String,

        #[arg(short, long, default_value = "src")]
        root: String,
    },
    /// Load a config file and log every reload until terminated
    Watch {
        config: Option<PathBuf>,
    },
}

fn source(config: Option<PathBuf>) -> ConfigSource {
    match config {
        Some(path) => ConfigSource::new(path),
        None => ConfigSource::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let source = source(config);
            match source.load() {
                Ok(snapshot) => {
                    println!("# {}", source.path().display());
                    println!("{}", toml::to_string_pretty(&snapshot.config)?);
                }
                Err(e) => {
                    eprintln!("Error: {}: {}", source.path().display(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Category { location, root } => {
            println!("{}", CategoryNamer::new(root).category_for(&location));
        }
        Commands::Watch { config } => {
            let pipeline = LogPipeline::from_source(Arc::new(source(config)))?;
            bridge::install(pipeline.clone())?;

            let subscription = Arc::new(pipeline.watch()?.ok_or("no configuration source")?);
            let log = pipeline.logger(file!());
            log.info(format_args!(
                "Watching {} at version {}",
                subscription.path().display(),
                pipeline.version()
            ));

            if let Some(task) = close_on_exit(subscription, Shutdown::new()) {
                task.await?;
            }
            pipeline.flush();
        }
    }

    Ok(())
}
