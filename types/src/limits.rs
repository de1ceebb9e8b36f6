//! Bounds enforced when a bet is created or edited.

/// Minimum title length, in characters, after trimming.
pub const TITLE_MIN_LEN: usize = 5;
/// Maximum title length, in characters, after trimming.
pub const TITLE_MAX_LEN: usize = 200;
/// Maximum description length, in characters.
pub const DESCRIPTION_MAX_LEN: usize = 1_000;
/// Minimum number of options on a bet.
pub const MIN_OPTIONS: usize = 2;
/// Maximum number of options on a bet.
pub const MAX_OPTIONS: usize = 10;
/// Largest stake amount a host may attach to a bet.
pub const MAX_STAKE_AMOUNT: f64 = 1_000_000.0;
