//! [`ProgressReporter`] for install and runtime services, printing through
//! an [`OutputContext`].

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, Tone};

/// Prints service progress as `→`, `✓` and `⚠` lines. Silent when quiet.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        self.ctx.say(Tone::Step, message);
    }

    fn success(&self, message: &str) {
        self.ctx.say(Tone::Ok, message);
    }

    fn warn(&self, message: &str) {
        self.ctx.say(Tone::Warn, message);
    }
}
