use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use otolith::{EngineConfig, SessionCommand};
use otolith_cli::{write_default_config, ProcessJob};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cut every detected specimen out of a tray photograph, in reading order
    Process {
        /// Path to the full-resolution image
        #[arg(short, long)]
        image: PathBuf,
        /// Path to the detections JSON
        #[arg(short, long)]
        detections: PathBuf,
        /// Output directory for the PNG crops
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Engine configuration (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Where to write the export list (defaults to <output_dir>/crops.json)
        #[arg(short, long)]
        export: Option<PathBuf>,
        /// Detection coordinates are already in preview space
        #[arg(long)]
        detections_in_preview: bool,
    },
    /// Print the JSON schema of the configuration file
    Schema {
        /// Print the session command schema instead
        #[arg(long)]
        commands: bool,
    },
    /// Write the default configuration as TOML
    InitConfig {
        #[arg(short, long, default_value = "otolith.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            image,
            detections,
            output_dir,
            config,
            export,
            detections_in_preview,
        } => {
            let job = ProcessJob {
                image,
                detections,
                output_dir,
                config,
                export,
                detections_in_preview,
            };
            let summary = job.run()?;
            info!(
                "Cut {} crops from {} rectangles in {} rows; export list at {}",
                summary.crops,
                summary.rectangles,
                summary.rows,
                summary.export_list.display()
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Schema { commands } => {
            let schema = if commands {
                SessionCommand::schema()
            } else {
                EngineConfig::schema()
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::InitConfig { output } => {
            write_default_config(&output)?;
            info!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}
