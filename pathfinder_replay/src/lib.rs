#![forbid(unsafe_code)]

/// Version of the canonical store serialization. Bump when the hashed
/// layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;

pub mod ids;
pub mod domain;
pub mod error;
pub mod events;
pub mod classify;
pub mod invariants;
pub mod store;
pub mod transitions;
pub mod hashing;
pub mod engine;
