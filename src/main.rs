use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medview::cli::{run_classify, run_reconcile, ReconcileOptions};
use medview::logging::{init_logging, LOG_ENV};
use medview::ViewerConfig;

#[derive(Parser)]
#[command(name = "medview")]
#[command(about = "Medical image viewer core: classify data sets and sync viewer scenes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Viewer settings (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mirror debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the viewer files under a directory into records
    Classify {
        /// Data directory
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile a remote scene into a headless viewer over a directory
    Reconcile {
        /// Data directory
        path: PathBuf,
        /// Remote scene JSON
        #[arg(long)]
        scene: PathBuf,
        /// Local scene JSON applied before the remote one
        #[arg(long)]
        local: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - guard must be held for logs to flush
    let _guard = init_logging(cli.verbose).ok();
    let timed = cli.verbose || std::env::var(LOG_ENV).is_ok();
    let start = Instant::now();

    let result = run_command(cli);

    if timed {
        eprintln!("Completed in {:.2?}", start.elapsed());
    }

    result
}

fn load_config(path: Option<&PathBuf>) -> Result<ViewerConfig> {
    match path {
        Some(path) => ViewerConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(ViewerConfig::default()),
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Classify { path, json } => {
            let (records, stats) = run_classify(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            for record in &records {
                let mut extras = Vec::new();
                if let Some(thumbnail) = &record.thumbnail {
                    extras.push(format!("thumbnail {}", thumbnail.name()));
                }
                if let Some(sidecar) = &record.sidecar {
                    extras.push(format!("sidecar {}", sidecar.name()));
                }
                let extras = if extras.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", extras.join(", "))
                };
                println!(
                    "{:>3} {:<18} {} [{} files]{}",
                    record.id,
                    record.image_kind.as_str(),
                    record.primary_path(),
                    record.files.len(),
                    extras
                );
            }
            println!(
                "{} records from {} files ({} DICOM series, {} volumes, {} other)",
                stats.records, stats.files, stats.dicom_series, stats.volumes, stats.other
            );
        }
        Commands::Reconcile { path, scene, local } => {
            let outcome = run_reconcile(&path, ReconcileOptions { scene, local, config })?;
            let report = &outcome.report;
            println!(
                "Reconciled: +{} -{} panes, {} updated, {} skipped{}",
                report.created.len(),
                report.destroyed.len(),
                report.updated.len(),
                report.skipped.len(),
                if report.link_changed { ", link changed" } else { "" }
            );
            if !report.skipped.is_empty() {
                let ids: Vec<String> = report.skipped.iter().map(|id| id.to_string()).collect();
                println!("Skipped unknown records: {}", ids.join(", "));
            }
            println!("Loaded: {} panes", outcome.loaded);
            println!("{}", outcome.scene.to_json_pretty()?);
        }
    }

    Ok(())
}
