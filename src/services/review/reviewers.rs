/// Reviewer identities in vote order. Stored comma-joined on the material;
/// membership compares trimmed ids exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReviewerSet(Vec<String>);

impl ReviewerSet {
    pub(crate) fn parse(stored: &str) -> Self {
        let mut set = Self::default();
        for reviewer in stored.split(',') {
            set.insert(reviewer);
        }
        set
    }

    pub(crate) fn contains(&self, reviewer: &str) -> bool {
        let reviewer = reviewer.trim();
        self.0.iter().any(|existing| existing == reviewer)
    }

    /// Returns `true` when the reviewer was not present before.
    pub(crate) fn insert(&mut self, reviewer: &str) -> bool {
        let reviewer = reviewer.trim();
        if reviewer.is_empty() || self.contains(reviewer) {
            return false;
        }
        self.0.push(reviewer.to_string());
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn joined(&self) -> String {
        self.0.join(",")
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.0
    }
}
