//! CLI-facing config glue: picks the config file and layers global flags
//! over what `zwbridge_config` loads.

use std::path::PathBuf;

use zwbridge_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(zwbridge_config::config_path)
}

/// Load the file and environment, then apply `--gateway` and `--scan-timeout`.
pub fn resolve(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = zwbridge_config::load_config_from(&config_file(global))?;

    if let Some(ref gateway) = global.gateway {
        zwbridge_config::parse_gateway(gateway)?;
        cfg.gateway.clone_from(gateway);
    }
    if let Some(secs) = global.scan_timeout {
        cfg.scan_timeout_secs = secs;
    }

    Ok(cfg)
}
