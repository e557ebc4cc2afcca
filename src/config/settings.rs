//! CLI configuration
//!
//! Loads defaults for the `partty` binary from a TOML file, `.partty.toml`
//! in the current directory unless another path is given.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::pty::SpawnOptions;

/// Configuration file name
pub const CONFIG_FILE: &str = ".partty.toml";

/// Errors that can occur during config operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings for launching a session from the command line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Program to run when none is given on the command line
    pub shell: Option<String>,
    /// Arguments for `shell`
    pub args: Vec<String>,
    /// Default spawn options
    pub terminal: SpawnOptions,
}

impl Config {
    /// Load configuration from `path`, or defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Program to run: the configured shell, then `$SHELL`, then `sh`
    pub fn shell(&self) -> String {
        self.shell
            .clone()
            .filter(|shell| !shell.is_empty())
            .or_else(|| std::env::var("SHELL").ok().filter(|shell| !shell.is_empty()))
            .unwrap_or_else(|| "sh".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_terminal_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
shell = "/bin/bash"
args = ["-l"]

[terminal]
name = "xterm-256color"
columns = 132
rows = 43
cwd = "/tmp"
inherit_current_size = true

[terminal.env]
LANG = "C.UTF-8"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.shell(), "/bin/bash");
        assert_eq!(config.args, vec!["-l".to_string()]);
        assert_eq!(config.terminal.name.as_deref(), Some("xterm-256color"));
        assert_eq!(config.terminal.columns, Some(132));
        assert_eq!(config.terminal.rows, Some(43));
        assert_eq!(config.terminal.cwd, Some(PathBuf::from("/tmp")));
        assert!(config.terminal.inherit_current_size);
        assert_eq!(config.terminal.env.unwrap()["LANG"], "C.UTF-8");
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "shell = [").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_configured_shell_wins() {
        let config = Config {
            shell: Some("zsh".to_string()),
            ..Default::default()
        };
        assert_eq!(config.shell(), "zsh");
        assert!(!Config::default().shell().is_empty());
    }
}
