//! Row mappings for the domain types in `questline-common`.

/// Aggregate over a user's play sessions within the cycle window.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayStats {
    pub count: i64,
    pub total_score: i64,
}
