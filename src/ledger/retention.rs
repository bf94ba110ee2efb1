//! Retention policy for undelivered readings.
//!
//! The ledger grows without bound by default. A limit makes the agent discard
//! the oldest pending readings, each one logged as dropped.

/// How many pending readings the ledger may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Retention {
    max_entries: Option<usize>,
}

impl Retention {
    /// Keep everything until it is delivered
    pub fn unbounded() -> Self {
        Self { max_entries: None }
    }

    /// Keep at most `max` pending readings
    pub fn max_entries(max: usize) -> Self {
        Self {
            max_entries: Some(max.max(1)),
        }
    }

    /// Build from a config value where 0 means unbounded
    pub fn from_limit(limit: usize) -> Self {
        match limit {
            0 => Self::unbounded(),
            max => Self::max_entries(max),
        }
    }

    /// Number of oldest entries to discard when `pending` are held
    pub fn excess(&self, pending: usize) -> usize {
        match self.max_entries {
            Some(max) => pending.saturating_sub(max),
            None => 0,
        }
    }
}
