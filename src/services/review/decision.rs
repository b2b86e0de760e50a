#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReviewDecision {
    Approved,
    Rejected,
    /// Any other value is a neutral comment that never moves the status.
    Other(String),
}

impl ReviewDecision {
    pub(crate) fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("approved") {
            Self::Approved
        } else if trimmed.eq_ignore_ascii_case("rejected") {
            Self::Rejected
        } else {
            Self::Other(trimmed.to_string())
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Other(_) => "other",
        }
    }
}
