//! Per-tone terminal colors.

use owo_colors::Style;

/// What a line of output means. Each tone has a marker and a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Ok,
    Warn,
    Fail,
    Note,
    /// An in-progress install or start step.
    Step,
    Muted,
    Heading,
}

impl Tone {
    /// Marker printed before a message of this tone, if any.
    #[must_use]
    pub fn marker(self) -> Option<&'static str> {
        match self {
            Self::Ok => Some("✓"),
            Self::Warn => Some("⚠"),
            Self::Fail => Some("✗"),
            Self::Note => Some("ℹ"),
            Self::Step => Some("→"),
            Self::Muted | Self::Heading => None,
        }
    }
}

/// Maps tones to styles. A plain palette emits no escape codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Palette {
    colored: bool,
}

impl Palette {
    #[must_use]
    pub fn colored() -> Self {
        Self { colored: true }
    }

    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_colored(self) -> bool {
        self.colored
    }

    #[must_use]
    pub fn style(self, tone: Tone) -> Style {
        if !self.colored {
            return Style::new();
        }
        match tone {
            Tone::Ok => Style::new().green(),
            Tone::Warn => Style::new().yellow(),
            Tone::Fail => Style::new().red(),
            Tone::Note | Tone::Step => Style::new().blue(),
            Tone::Muted => Style::new().dimmed(),
            Tone::Heading => Style::new().bold().cyan(),
        }
    }
}
