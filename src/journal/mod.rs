//! Journal entry construction and posting

pub mod builder;
pub mod poster;

pub use builder::{patterns, JournalBuilder};
pub use poster::{JournalPoster, REVERSAL_SUFFIX};
