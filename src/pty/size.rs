//! Terminal geometry and its validation rules

use std::io::IsTerminal;

use portable_pty::PtySize;
use serde::{Deserialize, Serialize};

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Both dimensions are usable
    pub fn is_valid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }

    /// Resolve a requested size dimension by dimension.
    ///
    /// A requested value wins when it is a positive integer that fits a
    /// terminal dimension; otherwise the `fallback` value for that dimension
    /// is used.
    pub fn resolve(cols: Option<i64>, rows: Option<i64>, fallback: TerminalSize) -> Self {
        Self {
            cols: cols.and_then(dimension).unwrap_or(fallback.cols),
            rows: rows.and_then(dimension).unwrap_or(fallback.rows),
        }
    }

    /// Normalize arguments to `resize`.
    ///
    /// Invalid values fall back to the current geometry, and to `default`
    /// when the current value is itself unusable.
    pub fn normalize(cols: i64, rows: i64, current: TerminalSize, default: TerminalSize) -> Self {
        let current_cols = if current.cols > 0 { current.cols } else { default.cols };
        let current_rows = if current.rows > 0 { current.rows } else { default.rows };
        Self {
            cols: dimension(cols).unwrap_or(current_cols),
            rows: dimension(rows).unwrap_or(current_rows),
        }
    }

    /// One cell larger in each direction, saturating
    pub fn grown(self) -> Self {
        Self {
            cols: self.cols.saturating_add(1),
            rows: self.rows.saturating_add(1),
        }
    }

    /// Convert to portable-pty PtySize
    pub(crate) fn to_pty_size(self) -> PtySize {
        PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// A positive integer that fits a terminal dimension.
pub fn dimension(value: i64) -> Option<u16> {
    u16::try_from(value).ok().filter(|v| *v > 0)
}

/// Size of the terminal attached to stdout, if there is one.
pub fn current_terminal_size() -> Option<TerminalSize> {
    if !std::io::stdout().is_terminal() {
        return None;
    }
    crossterm::terminal::size()
        .ok()
        .map(|(cols, rows)| TerminalSize::new(cols, rows))
        .filter(TerminalSize::is_valid)
}
