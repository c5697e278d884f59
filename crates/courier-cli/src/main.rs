mod commands;
mod logging;
mod progress;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use courier_core::remote::FlywheelClient;
use courier_core::{report, AppConfig, DicomHeaderReader, UploadEngine};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match courier_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Upload { file, seg_index }) => {
            if let Err(err) = run_upload(&config, &file, seg_index) {
                error!("Fatal error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::Scan { file, seg_index }) => {
            if let Err(err) = run_scan(&config, &file, seg_index) {
                error!("Fatal error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }
}

fn run_upload(config: &AppConfig, file: &PathBuf, seg_index: usize) -> anyhow::Result<()> {
    let store = FlywheelClient::new(config).context("building Flywheel client")?;
    let reporter = CliReporter::new();
    let engine = UploadEngine::new(config.clone(), file, seg_index);

    let summary = engine
        .run(&store, &DicomHeaderReader, &reporter)
        .with_context(|| format!("uploading {}", file.display()))?;

    println!();
    info!(
        "{} subjects processed, {} aborted, {} entries skipped",
        format!("{}", summary.subjects_processed).green(),
        format!("{}", summary.subjects_failed).red(),
        format!("{}", summary.entries_skipped).yellow(),
    );
    info!(
        "{} bundles packaged, {} deposited, {} failed",
        format!("{}", summary.groups_packaged).green(),
        format!("{}", summary.groups_deposited).green(),
        format!("{}", summary.groups_failed).red(),
    );

    if let Some(path) = &config.report_path {
        report::write_report(Path::new(path), &summary)
            .with_context(|| format!("writing run report to {}", path))?;
    }

    Ok(())
}

fn run_scan(config: &AppConfig, file: &PathBuf, seg_index: usize) -> anyhow::Result<()> {
    let reporter = CliReporter::new();
    let engine = UploadEngine::new(config.clone(), file, seg_index);

    let preview = engine
        .preview(&DicomHeaderReader, &reporter)
        .with_context(|| format!("scanning {}", file.display()))?;

    println!();
    for subject in &preview.subjects {
        match &subject.error {
            Some(reason) => {
                println!(
                    "{} ({} files) — {}",
                    subject.label.red(),
                    subject.files,
                    reason
                );
            }
            None => {
                println!(
                    "{} ({} files, {} series)",
                    subject.label.green(),
                    subject.files,
                    subject.groups.len()
                );
                for group in &subject.groups {
                    println!(
                        "  {} -> {} ({} files) @ {}/{}/{}",
                        group.series_uid,
                        group.bundle.cyan(),
                        group.members,
                        group.hierarchy.subject,
                        group.hierarchy.session,
                        group.hierarchy.acquisition,
                    );
                }
            }
        }
    }
    println!();
    info!(
        "{} subjects, {} entries skipped — no remote calls made",
        preview.subjects.len(),
        preview.entries_skipped
    );

    Ok(())
}
