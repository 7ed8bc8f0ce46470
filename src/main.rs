use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use d0010_importer::config::Config;
use d0010_importer::db::pool;
use d0010_importer::services::{ImportReport, ImportService};

#[derive(Parser)]
#[command(name = "import-d0010")]
#[command(about = "Import D0010 flow files into the metering database", long_about = None)]
struct Cli {
    /// Path(s) to D0010 file(s) to import
    #[arg(required = true)]
    file_paths: Vec<PathBuf>,

    /// Database connection string (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Parse files without saving to database
    #[arg(long)]
    dry_run: bool,

    /// Re-import files even if already processed
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = Config::from_env();
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }

    info!("Connecting to database...");
    let db = pool::connect(&config.database_url, config.max_connections).await?;
    let service = ImportService::new(db.clone());

    println!("Processing {} file(s)...", cli.file_paths.len());

    let mut success_count = 0;
    let mut error_count = 0;

    for path in &cli.file_paths {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message(format!("Importing {}...", path.display()));
        pb.enable_steady_tick(Duration::from_millis(120));

        match service.import_file(path, cli.dry_run, cli.force).await {
            Ok(report) => {
                pb.finish_and_clear();
                print_report(&report);
                success_count += 1;
            }
            Err(e) => {
                pb.finish_and_clear();
                error!("Failed to process {}: {e}", path.display());
                error_count += 1;
            }
        }
    }

    // Close the pool explicitly; the handle's lifetime is the run.
    db.close().await;

    println!("\nProcessing complete: {success_count} succeeded, {error_count} failed");

    Ok(if error_count > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &ImportReport) {
    if report.dry_run {
        println!("\n{} (dry run, nothing written)", report.filename);
        println!(
            "  {} lines processed, {} valid, {} skipped",
            report.total_lines,
            report.total_lines - report.skipped_count(),
            report.skipped_count()
        );
    } else {
        println!("\n{}", report.filename);
        println!(
            "  {} lines processed, {} imported, {} updated, {} skipped",
            report.total_lines,
            report.imported,
            report.updated,
            report.skipped_count()
        );
    }

    for skip in &report.skipped {
        println!("  - line {}: {}", skip.line_number, skip.reason);
    }
}
