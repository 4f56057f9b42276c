// CLI application
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use instsema_cli::commands::{analyze_database, generate_semantics};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "instsema")]
#[command(about = "Instruction semantics table generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Generate the semantics table for a pattern database
    Generate {
        /// Path to the pattern database (JSON)
        #[arg(short, long)]
        database: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to a target specification (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Don't emit source patterns as comments
        #[arg(long)]
        no_comments: bool,

        /// Print run statistics as JSON
        #[arg(long)]
        stats_json: bool,
    },
    /// Report which instructions get semantics and why others don't
    Analyze {
        /// Path to the pattern database (JSON)
        #[arg(short, long)]
        database: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            database,
            output,
            config,
            no_comments,
            stats_json,
        } => {
            let pb = create_progress_bar("Generating semantics table...");
            let stats = generate_semantics(&database, output.as_deref(), config.as_deref(), no_comments)?;
            pb.finish_with_message(format!(
                "Generation complete: {} of {} instructions, {} words",
                stats.collection.accepted, stats.collection.total_instructions, stats.table_words
            ));
            if stats_json {
                eprintln!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }
        Commands::Analyze { database } => {
            let pb = create_progress_bar("Analyzing pattern database...");
            analyze_database(&database)?;
            pb.finish_with_message("Analysis complete");
        }
    }

    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb
}
