//! Semantic colors for sks output
//!
//! Color support respects `NO_COLOR`, `FORCE_COLOR`, `TERM=dumb` and
//! whether stdout is a terminal.

use colored::{ColoredString, Colorize};
use std::io::IsTerminal;

use crate::core::observer::LinkState;

/// Level of color support detected for the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSupport {
    /// No color support (NO_COLOR set, TERM=dumb, piped output)
    None,
    Basic,
}

impl ColorSupport {
    #[must_use]
    pub fn detect() -> Self {
        // https://no-color.org/
        if std::env::var_os("NO_COLOR").is_some() {
            return Self::None;
        }
        if std::env::var_os("FORCE_COLOR").is_some() {
            return Self::Basic;
        }
        if !std::io::stdout().is_terminal() {
            return Self::None;
        }
        if std::env::var("TERM").is_ok_and(|term| term == "dumb") {
            return Self::None;
        }
        Self::Basic
    }

    #[must_use]
    pub const fn has_color(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Default for ColorSupport {
    fn default() -> Self {
        Self::detect()
    }
}

pub struct SksStyles;

impl SksStyles {
    pub fn success(text: &str) -> ColoredString {
        text.green().bold()
    }

    pub fn error(text: &str) -> ColoredString {
        text.red().bold()
    }

    pub fn warning(text: &str) -> ColoredString {
        text.yellow()
    }

    pub fn muted(text: &str) -> ColoredString {
        text.dimmed()
    }

    pub fn path(text: &str) -> ColoredString {
        text.bright_cyan()
    }

    /// Style for a link state: green in sync, yellow for fixable drift, red
    /// for content that needs a decision.
    pub fn state(text: &str, state: LinkState) -> ColoredString {
        match state {
            LinkState::InSync => text.green(),
            LinkState::Missing | LinkState::Drifted | LinkState::OrphanLink => {
                text.yellow()
            }
            LinkState::LocalOnly => text.red().bold(),
        }
    }

    /// Success checkmark (✓)
    pub fn check() -> ColoredString {
        "✓".green().bold()
    }

    /// Error X (✗)
    pub fn cross() -> ColoredString {
        "✗".red().bold()
    }

    /// Warning indicator (!)
    pub fn exclaim() -> ColoredString {
        "!".yellow()
    }

    /// Arrow (→)
    pub fn arrow() -> ColoredString {
        "→".dimmed()
    }
}

/// Apply a style only when colors are supported.
pub fn styled<S, F>(text: S, style_fn: F, support: ColorSupport) -> String
where
    S: AsRef<str>,
    F: FnOnce(&str) -> ColoredString,
{
    if support.has_color() {
        style_fn(text.as_ref()).to_string()
    } else {
        text.as_ref().to_string()
    }
}

/// Apply a colored string only when colors are supported.
pub fn with_color<S: AsRef<str>>(colored: ColoredString, plain: S, support: ColorSupport) -> String {
    if support.has_color() {
        colored.to_string()
    } else {
        plain.as_ref().to_string()
    }
}

pub fn format_state(state: LinkState, support: ColorSupport) -> String {
    styled(state.as_str(), |s| SksStyles::state(s, state), support)
}

/// Format a status indicator (check/cross/exclaim)
pub fn format_status(success: Option<bool>, support: ColorSupport) -> String {
    match success {
        Some(true) => with_color(SksStyles::check(), "✓", support),
        Some(false) => with_color(SksStyles::cross(), "✗", support),
        None => with_color(SksStyles::exclaim(), "!", support),
    }
}
