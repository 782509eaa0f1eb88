//! Terminal and JSON presentation of command results.
//!
//! Human output goes to stdout except failures, which go to stderr. In
//! `--json` mode every helper here is silenced and commands print a single
//! document through [`json::print`].

pub mod human;
pub mod json;
pub mod palette;
pub mod progress;
pub mod reporter;

use console::Term;
use owo_colors::OwoColorize as _;

pub use human::HumanRenderer;
pub use palette::{Palette, Tone};
pub use reporter::TerminalReporter;

/// Where human-readable output goes and how it looks.
pub struct OutputContext {
    pub palette: Palette,
    /// stdout is a terminal.
    pub is_tty: bool,
    /// Only failures are printed.
    pub quiet: bool,
}

impl OutputContext {
    /// Colors are used only on a terminal and only without `--no-color`.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let palette = if !no_color && is_tty {
            Palette::colored()
        } else {
            Palette::plain()
        };
        Self {
            palette,
            is_tty,
            quiet,
        }
    }

    /// Spinners only make sense on an interactive, non-quiet terminal.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// `text` styled for `tone`.
    #[must_use]
    pub fn paint(&self, tone: Tone, text: &str) -> String {
        text.style(self.palette.style(tone)).to_string()
    }

    /// Print `msg` behind the tone's marker. `Fail` goes to stderr and is
    /// never silenced.
    pub fn say(&self, tone: Tone, msg: &str) {
        let line = match tone.marker() {
            Some(marker) => format!("  {} {msg}", self.paint(tone, marker)),
            None => format!("  {}", self.paint(tone, msg)),
        };
        if tone == Tone::Fail {
            eprintln!("{line}");
        } else if !self.quiet {
            println!("{line}");
        }
    }

    pub fn success(&self, msg: &str) {
        self.say(Tone::Ok, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.say(Tone::Warn, msg);
    }

    pub fn error(&self, msg: &str) {
        self.say(Tone::Fail, msg);
    }

    pub fn info(&self, msg: &str) {
        self.say(Tone::Note, msg);
    }

    pub fn header(&self, msg: &str) {
        self.say(Tone::Heading, msg);
    }

    /// `key` dimmed, then `value`.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", self.paint(Tone::Muted, key));
        }
    }
}
