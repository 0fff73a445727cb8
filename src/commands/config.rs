//! `flotilla config`

use anyhow::{Context as _, Result};
use std::process::ExitCode;

use crate::cli::ConfigCommand;
use crate::paths;
use crate::schema::FlotillaConfig;

pub fn run(cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Path => {
            println!("{}", paths::config_file()?.display());
        }
        ConfigCommand::Show => {
            let config = super::load_config()?;
            print!("{}", render(&config)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn render(config: &FlotillaConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_output_is_loadable() {
        let text = render(&FlotillaConfig::default()).unwrap();
        assert!(text.contains("[deploy]"));
        assert!(text.contains("max_parallel = 5"));
        let back: FlotillaConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, FlotillaConfig::default());
    }
}
