//! Styled terminal output for parmap
//!
//! Status messages go to stderr so that stdout carries only mapped results.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Output handler for consistent CLI formatting
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    /// Create a new output handler
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("⚠").yellow(), message);
        }
    }

    /// Print a verbose message (only if verbose mode is enabled)
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            eprintln!("{} {}", style("ℹ").dim(), style(message).dim());
        }
    }

    /// Print a key-value pair with consistent styling
    pub fn key_value(&self, key: &str, value: &str, highlight: bool) {
        let styled_value = if highlight {
            style(value).green().bold()
        } else {
            style(value).dim()
        };
        println!("  {:<40} {}", key, styled_value);
    }

    /// Progress bar counting finished items. Hidden in quiet mode.
    pub fn progress_bar(&self, message: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb
    }
}
