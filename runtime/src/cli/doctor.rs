//! Environment readiness check.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use lead_harvest::HarvestConfig;

use crate::cli::output;
use crate::renderer::find_chromium;

#[derive(Debug, Serialize)]
struct DoctorReport {
    os: &'static str,
    arch: &'static str,
    chromium: Option<PathBuf>,
    output_dir: PathBuf,
    output_dir_writable: bool,
    ready: bool,
}

/// Check Chromium availability and output directory writability.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => HarvestConfig::load(path)?,
        None => HarvestConfig::default(),
    };
    config.apply_env_overrides();

    let chromium = find_chromium();
    let output_dir = config.output.dir.clone();
    let output_dir_writable = probe_writable(&output_dir);
    let report = DoctorReport {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        ready: chromium.is_some() && output_dir_writable,
        chromium,
        output_dir,
        output_dir_writable,
    };

    if output::is_json() {
        output::print_json(&report);
        return Ok(());
    }

    println!("Lead Harvest Doctor");
    println!("===================");
    println!();
    println!("OS:   {}", report.os);
    println!("Arch: {}", report.arch);
    println!();
    match &report.chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set LEADHARVEST_CHROMIUM_PATH."
        ),
    }
    if report.output_dir_writable {
        println!("[OK] Output directory writable: {}", report.output_dir.display());
    } else {
        println!("[!!] Output directory not writable: {}", report.output_dir.display());
    }
    println!();
    println!("Status: {}", if report.ready { "READY" } else { "NOT READY" });
    Ok(())
}

/// Create the directory if needed and try writing a scratch file into it.
fn probe_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".leadharvest-doctor");
    let ok = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}
