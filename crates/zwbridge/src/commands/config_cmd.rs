//! Config subcommand handlers.

use std::fmt::Write;

use zwbridge_config::ConfigError;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_file(global).display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let cfg = config::resolve(global)?;
            let mut text = toml::to_string_pretty(&cfg).map_err(ConfigError::from)?;
            if cfg.settings_path.is_none() {
                let _ = writeln!(text, "# settings_path = \"{}\"", cfg.state_path().display());
            }

            let out = output::render_single(
                &global.output,
                &cfg,
                |_| text.trim_end().to_owned(),
                |c| c.gateway.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
