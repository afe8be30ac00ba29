//! Data models for ledger entities and tool inputs.
//!
//! Wire models use `#[serde(default)]` for optional fields so partial
//! provider records deserialize without errors.

mod inputs;
mod transaction;

pub use inputs::*;
pub use transaction::{Account, Category, Transaction, categorize};
