mod cli;

use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use cli::Cli;
use protein_prep::{Pipeline, write_reports};

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.log_level() {
        logger.filter_level(level);
    }
    logger.format_timestamp_millis().init();

    let config = cli.build_config()?;
    let identifiers = cli.identifiers()?;
    if identifiers.is_empty() {
        warn!("No identifiers given; nothing to prepare");
    }

    let report_path = config.report_path();
    let filter = config.filter.clone();
    let options = config.options;

    let mut pipeline = Pipeline::new(config)?;
    let reports = pipeline.process(&identifiers, &filter, &options);
    write_reports(&reports, &report_path)?;

    let failed = reports.iter().filter(|r| !r.is_done()).count();
    info!(
        "{} of {} structure(s) prepared; report written to {}",
        reports.len() - failed,
        reports.len(),
        report_path.display()
    );

    if failed > 0 {
        for report in reports.iter().filter(|r| !r.is_done()) {
            error!("{}: {}", report.id, report.state);
        }
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
