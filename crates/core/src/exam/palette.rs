/// Display category of one question in the navigation palette.
///
/// The variants are mutually exclusive; [`PaletteStatus::classify`] picks one
/// for every combination of flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaletteStatus {
    AnsweredAndMarked,
    Marked,
    Answered,
    NotAnswered,
    NotVisited,
}

impl PaletteStatus {
    /// Classify a question from its three flags.
    ///
    /// Precedence: answered-and-marked, marked, answered, not-answered (visited),
    /// and only when nothing else is set, not-visited.
    #[must_use]
    pub fn classify(answered: bool, marked: bool, visited: bool) -> Self {
        match (answered, marked, visited) {
            (true, true, _) => Self::AnsweredAndMarked,
            (false, true, _) => Self::Marked,
            (true, false, _) => Self::Answered,
            (false, false, true) => Self::NotAnswered,
            (false, false, false) => Self::NotVisited,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AnsweredAndMarked => "answered-and-marked",
            Self::Marked => "marked",
            Self::Answered => "answered",
            Self::NotAnswered => "not-answered",
            Self::NotVisited => "not-visited",
        }
    }
}

/// Per-status totals for the palette legend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaletteCounts {
    pub answered_and_marked: usize,
    pub marked: usize,
    pub answered: usize,
    pub not_answered: usize,
    pub not_visited: usize,
}

impl PaletteCounts {
    pub(crate) fn add(&mut self, status: PaletteStatus) {
        match status {
            PaletteStatus::AnsweredAndMarked => self.answered_and_marked += 1,
            PaletteStatus::Marked => self.marked += 1,
            PaletteStatus::Answered => self.answered += 1,
            PaletteStatus::NotAnswered => self.not_answered += 1,
            PaletteStatus::NotVisited => self.not_visited += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.answered_and_marked
            + self.marked
            + self.answered
            + self.not_answered
            + self.not_visited
    }
}
