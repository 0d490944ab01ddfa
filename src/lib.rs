//! Main library crate for protein-prep

// Internal module organization
mod core;

// Public API exports
pub use core::clean::*;
pub use core::config::*;
pub use core::error::*;
pub use core::fetch::*;
pub use core::input::*;
pub use core::pipeline::*;
pub use core::report::*;
pub use core::structure::*;
pub use core::tool::*;
pub use core::utils::*;
