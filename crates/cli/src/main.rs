use anyhow::Result;
use clap::{Parser, Subcommand};
use groomer_cli::{paths, report};
use groomer_core::config::{self, UnpackerKind};
use groomer_core::pipeline;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Groom {
            source,
            destination,
            max_depth,
            unpacker,
            json,
        } => {
            let cfg = report::apply_overrides(cfg, max_depth, unpacker);
            let (src, dst) = paths::validate_roots(&source, &destination)?;
            let summary = pipeline::run(src, dst, cfg).await?;
            print!("{}", report::render_summary(&summary, json)?);
            if json {
                println!();
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(name = "groomer")]
#[command(about = "Sanitise files copied from an untrusted USB key", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect every file under SOURCE and write the sanitised copy to DESTINATION
    Groom {
        source: PathBuf,
        destination: PathBuf,
        /// Archive nesting bound; archives at this depth are not extracted
        #[arg(long)]
        max_depth: Option<usize>,
        /// Archive unpacker: 7z|zip
        #[arg(long)]
        unpacker: Option<UnpackerKind>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}
