//! Print the effective configuration as JSON, ready to edit and pass back
//! with `--config`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::harvest_cmd::{resolve_config, Mode};

pub async fn run(config_path: Option<&Path>, mode: Mode, validate: bool) -> Result<()> {
    let config = resolve_config(config_path, mode)?;
    if validate {
        config.validate().context("invalid configuration")?;
    }
    let text = serde_json::to_string_pretty(&config).context("failed to encode config")?;
    println!("{text}");
    Ok(())
}
