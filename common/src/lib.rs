//! Multiledger Common Types
//!
//! Shared types used across the multiledger workspace: account and
//! transaction identifiers, currency and money types, and time helpers.

pub mod identifiers;
pub mod monetary;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use time::*;
