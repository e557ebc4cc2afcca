//! Spawn and open options, and their resolution into a concrete request

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::size::{current_terminal_size, TerminalSize};

/// Multiplexer and sizing variables removed from an inherited environment
pub const SANITIZED_VARS: &[&str] = &[
    "TMUX",
    "TMUX_PANE",
    "STY",
    "WINDOW",
    "WINDOWID",
    "TERMCAP",
    "COLUMNS",
    "LINES",
];

/// Per-backend defaults used while resolving options
#[derive(Debug, Clone, Copy)]
pub struct BackendProfile {
    /// Program spawned when the caller passes an empty file
    pub default_file: &'static str,
    /// Terminal name when neither the options nor `TERM` supply one
    pub default_name: &'static str,
    /// Geometry used when nothing else applies
    pub default_size: TerminalSize,
    /// Strip [`SANITIZED_VARS`] from an inherited environment
    pub sanitize_inherited_env: bool,
}

/// Options accepted by `spawn`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnOptions {
    /// Terminal name, exported as `TERM`
    pub name: Option<String>,
    /// Requested columns
    pub columns: Option<i64>,
    /// Requested rows
    pub rows: Option<i64>,
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
    /// Custom environment; the process environment is inherited when absent
    pub env: Option<BTreeMap<String, String>>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Use the size of the terminal attached to stdout when no explicit size is given
    pub inherit_current_size: bool,
    /// Ask the agent helper for debug output
    pub debug: bool,
}

impl SpawnOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the terminal name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set terminal dimensions
    pub fn with_size(mut self, columns: i64, rows: i64) -> Self {
        self.columns = Some(columns);
        self.rows = Some(rows);
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Replace the inherited environment
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Run the child as another user
    pub fn with_user(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    /// Size the terminal after the one attached to stdout
    pub fn inherit_current_size(mut self) -> Self {
        self.inherit_current_size = true;
        self
    }

    /// Enable helper debug output
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Fill unset fields from `defaults`
    pub fn or(mut self, defaults: &SpawnOptions) -> Self {
        self.name = self.name.or_else(|| defaults.name.clone());
        self.columns = self.columns.or(defaults.columns);
        self.rows = self.rows.or(defaults.rows);
        self.cwd = self.cwd.or_else(|| defaults.cwd.clone());
        self.env = self.env.or_else(|| defaults.env.clone());
        self.uid = self.uid.or(defaults.uid);
        self.gid = self.gid.or(defaults.gid);
        self.inherit_current_size |= defaults.inherit_current_size;
        self.debug |= defaults.debug;
        self
    }

    /// Resolve these options into a concrete spawn request.
    pub fn resolve(
        &self,
        file: &str,
        args: &[String],
        profile: &BackendProfile,
    ) -> io::Result<SpawnRequest> {
        self.resolve_with(file, args, profile, inherited_env())
    }

    /// Resolve with `base` standing in for the process environment
    fn resolve_with(
        &self,
        file: &str,
        args: &[String],
        profile: &BackendProfile,
        base: BTreeMap<String, String>,
    ) -> io::Result<SpawnRequest> {
        let detected = if self.inherit_current_size {
            current_terminal_size()
        } else {
            None
        };
        let size = TerminalSize::resolve(
            self.columns,
            self.rows,
            detected.unwrap_or(profile.default_size),
        );

        let mut env = match &self.env {
            Some(env) => env.clone(),
            None => {
                let mut env = base;
                if profile.sanitize_inherited_env {
                    for key in SANITIZED_VARS {
                        env.remove(*key);
                    }
                }
                env
            }
        };

        let name = self
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| env.get("TERM").cloned().filter(|name| !name.is_empty()))
            .unwrap_or_else(|| profile.default_name.to_string());

        env.insert("TERM".to_string(), name.clone());
        env.insert("LINES".to_string(), size.rows.to_string());
        env.insert("COLUMNS".to_string(), size.cols.to_string());

        let cwd = absolute(self.cwd.as_deref())?;

        let file = if file.is_empty() {
            profile.default_file.to_string()
        } else {
            file.to_string()
        };

        let user = match (self.uid, self.gid) {
            (Some(uid), Some(gid)) => Some((uid, gid)),
            _ => None,
        };

        Ok(SpawnRequest {
            file,
            args: args.to_vec(),
            env,
            cwd,
            name,
            size,
            user,
            debug: self.debug,
        })
    }
}

/// Options accepted by `open`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    pub columns: Option<i64>,
    pub rows: Option<i64>,
}

impl OpenOptions {
    /// Set terminal dimensions
    pub fn with_size(columns: i64, rows: i64) -> Self {
        Self {
            columns: Some(columns),
            rows: Some(rows),
        }
    }

    /// Resolve the requested geometry against the backend default
    pub fn resolve(&self, profile: &BackendProfile) -> TerminalSize {
        TerminalSize::resolve(self.columns, self.rows, profile.default_size)
    }
}

/// A fully resolved request handed to a pty collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub file: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub name: String,
    pub size: TerminalSize,
    /// uid and gid, only when both were supplied
    pub user: Option<(u32, u32)>,
    pub debug: bool,
}

impl SpawnRequest {
    /// Environment as `KEY=VALUE` pairs
    pub fn environ(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }
}

fn inherited_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

fn absolute(cwd: Option<&Path>) -> io::Result<PathBuf> {
    match cwd {
        Some(path) if path.is_absolute() => Ok(path.to_path_buf()),
        Some(path) => Ok(std::env::current_dir()?.join(path)),
        None => std::env::current_dir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: BackendProfile = BackendProfile {
        default_file: "sh",
        default_name: "xterm",
        default_size: TerminalSize::new(80, 24),
        sanitize_inherited_env: true,
    };

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_defaults() {
        let request = SpawnOptions::new()
            .with_env(env(&[]))
            .resolve("", &[], &PROFILE)
            .unwrap();
        assert_eq!(request.file, "sh");
        assert_eq!(request.name, "xterm");
        assert_eq!(request.size, TerminalSize::new(80, 24));
        assert_eq!(request.cwd, std::env::current_dir().unwrap());
        assert!(request.user.is_none());
    }

    #[test]
    fn test_resolve_sets_term_lines_columns() {
        let request = SpawnOptions::new()
            .with_size(132, 43)
            .with_env(env(&[("TERM", "screen"), ("LINES", "1")]))
            .resolve("bash", &["-l".to_string()], &PROFILE)
            .unwrap();
        assert_eq!(request.name, "screen");
        assert_eq!(request.env["TERM"], "screen");
        assert_eq!(request.env["LINES"], "43");
        assert_eq!(request.env["COLUMNS"], "132");
        assert_eq!(request.args, vec!["-l".to_string()]);
    }

    #[test]
    fn test_custom_env_is_not_sanitized() {
        let request = SpawnOptions::new()
            .with_name("xterm-256color")
            .with_env(env(&[("TMUX", "/tmp/tmux-1000/default,1,0"), ("STY", "1.pts")]))
            .resolve("sh", &[], &PROFILE)
            .unwrap();
        assert!(request.env.contains_key("TMUX"));
        assert!(request.env.contains_key("STY"));
        assert_eq!(request.env["TERM"], "xterm-256color");
    }

    const MULTIPLEXER_VARS: [&str; 6] = ["TMUX", "TMUX_PANE", "STY", "WINDOW", "WINDOWID", "TERMCAP"];

    fn multiplexed_env() -> BTreeMap<String, String> {
        env(&[
            ("TMUX", "/tmp/tmux-1000/default,1,0"),
            ("TMUX_PANE", "%1"),
            ("STY", "1234.pts-0.host"),
            ("WINDOW", "0"),
            ("WINDOWID", "4194313"),
            ("TERMCAP", "SC|screen"),
            ("COLUMNS", "200"),
            ("LINES", "60"),
            ("HOME", "/home/user"),
        ])
    }

    #[test]
    fn test_inherited_env_is_sanitized() {
        let request = SpawnOptions::new()
            .with_size(90, 30)
            .resolve_with("sh", &[], &PROFILE, multiplexed_env())
            .unwrap();
        for key in MULTIPLEXER_VARS {
            assert!(!request.env.contains_key(key), "{key} should be removed");
        }
        assert_eq!(request.env["COLUMNS"], "90");
        assert_eq!(request.env["LINES"], "30");
        assert_eq!(request.env["HOME"], "/home/user");
    }

    #[test]
    fn test_inherited_env_kept_without_sanitizing() {
        let profile = BackendProfile {
            sanitize_inherited_env: false,
            ..PROFILE
        };
        let request = SpawnOptions::new()
            .resolve_with("sh", &[], &profile, multiplexed_env())
            .unwrap();
        for key in MULTIPLEXER_VARS {
            assert!(request.env.contains_key(key), "{key} should be kept");
        }
        assert_eq!(request.env["COLUMNS"], "80");
        assert_eq!(request.env["LINES"], "24");
    }

    #[test]
    fn test_backends_differ_on_sanitizing() {
        use crate::agent::Agent;
        use crate::pty::Direct;
        use crate::session::Backend;

        let direct = SpawnOptions::new()
            .resolve_with("sh", &[], &<Direct as Backend>::PROFILE, multiplexed_env())
            .unwrap();
        let agent = SpawnOptions::new()
            .resolve_with("cmd.exe", &[], &<Agent as Backend>::PROFILE, multiplexed_env())
            .unwrap();
        assert!(!direct.env.contains_key("TMUX"));
        assert!(agent.env.contains_key("TMUX"));
        assert_eq!(agent.env["LINES"], "30");
    }

    #[test]
    fn test_relative_cwd_is_made_absolute() {
        let request = SpawnOptions::new()
            .with_cwd("sub")
            .with_env(env(&[]))
            .resolve("sh", &[], &PROFILE)
            .unwrap();
        assert!(request.cwd.is_absolute());
        assert!(request.cwd.ends_with("sub"));
    }

    #[test]
    fn test_user_requires_both_ids() {
        let mut options = SpawnOptions::new().with_env(env(&[]));
        options.uid = Some(1000);
        assert!(options.resolve("sh", &[], &PROFILE).unwrap().user.is_none());

        let request = options.with_user(1000, 100).resolve("sh", &[], &PROFILE).unwrap();
        assert_eq!(request.user, Some((1000, 100)));
    }

    #[test]
    fn test_or_fills_missing_fields() {
        let defaults = SpawnOptions::new().with_name("vt100").with_size(100, 30);
        let options = SpawnOptions::new().with_name("xterm").or(&defaults);
        assert_eq!(options.name.as_deref(), Some("xterm"));
        assert_eq!(options.columns, Some(100));
        assert_eq!(options.rows, Some(30));
    }

    #[test]
    fn test_environ_pairs() {
        let request = SpawnOptions::new()
            .with_name("xterm")
            .with_env(env(&[("A", "1")]))
            .resolve("sh", &[], &PROFILE)
            .unwrap();
        let pairs = request.environ();
        assert!(pairs.contains(&"A=1".to_string()));
        assert!(pairs.contains(&"TERM=xterm".to_string()));
    }

    #[test]
    fn test_open_options_resolve() {
        assert_eq!(
            OpenOptions::with_size(0, 50).resolve(&PROFILE),
            TerminalSize::new(80, 50)
        );
    }
}
