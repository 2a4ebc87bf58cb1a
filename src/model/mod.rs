//! Core value types for patricia_db

mod hash;
mod nibbles;

pub use hash::Hash;
pub use nibbles::{common_prefix_len, Nibbles};
