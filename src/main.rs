//! partty
//!
//! Runs a program on a new pseudo-terminal and attaches the current terminal
//! to it until the program exits.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Run a program on a new pseudo-terminal
#[derive(Parser, Debug)]
#[command(name = "partty")]
#[command(version, about, long_about = None)]
struct Args {
    /// Terminal columns
    #[arg(long)]
    cols: Option<i64>,

    /// Terminal rows
    #[arg(long)]
    rows: Option<i64>,

    /// Terminal name, exported as TERM
    #[arg(long)]
    name: Option<String>,

    /// Working directory for the program
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Size the pty after the current terminal
    #[arg(long)]
    inherit_size: bool,

    /// Configuration file (default: .partty.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Program to run (default: configured shell, then $SHELL)
    command: Option<String>,

    /// Arguments for the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs share the terminal with the session, keep them quiet by default
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    run(args).await
}

#[cfg(unix)]
async fn run(args: Args) -> anyhow::Result<()> {
    attach::run(args).await
}

#[cfg(not(unix))]
async fn run(_args: Args) -> anyhow::Result<()> {
    anyhow::bail!("partty needs an agent host on this platform; use the library with an AgentHost")
}

#[cfg(unix)]
mod attach {
    use std::io::{IsTerminal, Read, Write};
    use std::path::PathBuf;

    use anyhow::Context;
    use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
    use tokio::signal::unix::{signal, SignalKind};
    use tokio::sync::mpsc;
    use tracing::{debug, info, warn};

    use partty::config::{Config, CONFIG_FILE};
    use partty::pty::current_terminal_size;
    use partty::{EventKind, SessionEvent, SpawnOptions};

    use super::Args;

    enum Step {
        Pumped(bool),
        Input(Option<Vec<u8>>),
        Resize,
    }

    struct RawModeGuard(bool);

    impl RawModeGuard {
        fn new(enable: bool) -> Self {
            if !enable {
                return Self(false);
            }
            match enable_raw_mode() {
                Ok(()) => Self(true),
                Err(e) => {
                    warn!("Failed to enable raw mode: {}", e);
                    Self(false)
                }
            }
        }
    }

    impl Drop for RawModeGuard {
        fn drop(&mut self) {
            if self.0 {
                let _ = disable_raw_mode();
            }
        }
    }

    /// Forward stdin on a blocking thread
    fn read_stdin() -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("Stopped reading stdin: {}", e);
                        break;
                    }
                }
            }
        });
        rx
    }

    pub(super) async fn run(args: Args) -> anyhow::Result<()> {
        let path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let config = Config::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;

        let options = SpawnOptions {
            name: args.name,
            columns: args.cols,
            rows: args.rows,
            cwd: args.cwd,
            inherit_current_size: args.inherit_size,
            ..Default::default()
        }
        .or(&config.terminal);

        let (file, file_args) = match args.command {
            Some(command) => (command, args.args),
            None => (config.shell(), config.args.clone()),
        };

        let mut term = partty::spawn(&file, &file_args, &options)?;
        info!(
            "Running {} on {} ({}x{})",
            term.file(),
            term.pty_id(),
            term.columns(),
            term.rows()
        );

        term.on(EventKind::Data, |event| {
            if let SessionEvent::Data(bytes) = event {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(bytes);
                let _ = stdout.flush();
            }
        });

        let _raw = RawModeGuard::new(std::io::stdin().is_terminal());
        let mut input = read_stdin();
        let mut input_open = true;
        let mut winch = signal(SignalKind::window_change())?;

        loop {
            let step = tokio::select! {
                more = term.pump() => Step::Pumped(more?),
                bytes = input.recv(), if input_open => Step::Input(bytes),
                _ = winch.recv() => Step::Resize,
            };

            match step {
                Step::Pumped(true) => {}
                Step::Pumped(false) => break,
                Step::Input(Some(bytes)) => term.write(&bytes)?,
                Step::Input(None) => {
                    input_open = false;
                    term.end(None)?;
                }
                Step::Resize => {
                    if let Some(size) = current_terminal_size() {
                        term.resize(size.cols.into(), size.rows.into())?;
                    }
                }
            }
        }

        info!("{} exited, {} sessions live", file, partty::live_sessions());
        Ok(())
    }
}
