use owo_colors::{OwoColorize, Style};
use strum_macros::EnumIter;

/// Visual role of a piece of terminal text.
#[derive(Debug, Clone, Copy, Eq, PartialEq, EnumIter)]
pub(crate) enum Tone {
    Heading,
    Success,
    Warning,
    Failure,
    Muted,
    Value,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Heading => Style::new().bold().cyan(),
            Self::Success => Style::new().bold().green(),
            Self::Warning => Style::new().bold().yellow(),
            Self::Failure => Style::new().bold().red(),
            Self::Muted => Style::new().dimmed(),
            Self::Value => Style::new().bold(),
        }
    }
}

/// Styles terminal text, or passes it through untouched when output is not
/// a terminal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn paint(&self, tone: Tone, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.use_colour {
            text.style(tone.style()).to_string()
        } else {
            text.to_owned()
        }
    }

    pub(crate) fn heading(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Heading, text)
    }

    pub(crate) fn success(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Success, text)
    }

    pub(crate) fn warning(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Warning, text)
    }

    pub(crate) fn failure(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Failure, text)
    }

    pub(crate) fn muted(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Muted, text)
    }

    pub(crate) fn value(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Value, text)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_tone_is_plain_without_colour() {
        let painter = Painter::new(false);
        for tone in Tone::iter() {
            assert_eq!("dock", painter.paint(tone, "dock"), "{tone:?}");
        }
    }

    #[test]
    fn every_tone_styles_text_with_colour() {
        let painter = Painter::new(true);
        for tone in Tone::iter() {
            let styled = painter.paint(tone, "dock");
            assert_ne!("dock", styled, "{tone:?}");
            assert!(styled.contains("dock"));
        }
    }
}
