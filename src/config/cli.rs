//! Command-line surface.
//!
//! `-p`, `-l` and `-r` override the matching config-file settings; anything
//! not given on the command line keeps the file's (or the default) value.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::GatewayConfig;
use crate::config::validation::validate_config;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "pac-gateway", version)]
#[command(about = "Forward proxy that picks an upstream per request from a rule file", long_about = None)]
pub struct Cli {
    /// Rule source: local path or http(s) URL [default: wpad.dat]
    #[arg(short = 'p', long = "pac", value_name = "SOURCE")]
    pub pac: Option<String>,

    /// Listen address [default: 127.0.0.1:8080]
    #[arg(short = 'l', long = "listen", value_name = "ADDR")]
    pub listen: Option<String>,

    /// Rule refresh interval, e.g. 30s, 5m, 1h or plain seconds; 0 disables [default: disabled]
    #[arg(short = 'r', long = "refresh", value_name = "INTERVAL", value_parser = parse_interval)]
    pub refresh: Option<u64>,

    /// Optional TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file (if any), applies overrides and validates.
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => GatewayConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(self, config: &mut GatewayConfig) {
        if let Some(pac) = self.pac {
            config.rules.origin = pac;
        }
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(refresh) = self.refresh {
            config.rules.refresh_secs = refresh;
        }
    }
}

/// Parses an interval into whole seconds.
pub fn parse_interval(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("`{value}` is not an interval"))?;
    let scale = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("unknown interval unit `{unit}`, expected s, m or h")),
    };
    amount
        .checked_mul(scale)
        .ok_or_else(|| format!("`{value}` is too large"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn intervals() {
        assert_eq!(parse_interval("0"), Ok(0));
        assert_eq!(parse_interval("45"), Ok(45));
        assert_eq!(parse_interval("30s"), Ok(30));
        assert_eq!(parse_interval("5m"), Ok(300));
        assert_eq!(parse_interval("1h"), Ok(3600));
        assert!(parse_interval("").is_err());
        assert!(parse_interval("m").is_err());
        assert!(parse_interval("10d").is_err());
        assert!(parse_interval("-5").is_err());
    }

    #[test]
    fn defaults_match_the_classic_flags() {
        let config = Cli::parse_from(["pac-gateway"]).into_config().unwrap();
        assert_eq!(config.rules.origin, "wpad.dat");
        assert_eq!(config.listener.bind_address, "127.0.0.1:8080");
        assert_eq!(config.rules.refresh(), None);
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rules]\norigin = \"/etc/rules.toml\"\nrefresh_secs = 60\n[listener]\nbind_address = \"0.0.0.0:3128\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = Cli::parse_from(["pac-gateway", "-c", path, "-p", "http://wpad/wpad.dat", "-r", "5m"])
            .into_config()
            .unwrap();
        assert_eq!(config.rules.origin, "http://wpad/wpad.dat");
        assert_eq!(config.rules.refresh_secs, 300);
        assert_eq!(config.listener.bind_address, "0.0.0.0:3128");
    }

    #[test]
    fn invalid_overrides_fail_validation() {
        let err = Cli::parse_from(["pac-gateway", "-l", "not-an-address"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
