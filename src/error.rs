// Error taxonomy for the one genuinely fallible path in this crate: a
// checked capacity reservation. Every other absent-key read reports absence
// through sentinels (`None`, `Default::default()`, an empty `Vec`, `false`),
// never a `Result`.
//
// Scoped to what this crate actually produces instead of carrying a sprawl
// of unused variants.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupHashError {
    #[error("requested capacity overflows usize")]
    CapacityOverflow,
}

pub type Result<T> = std::result::Result<T, GroupHashError>;
