//! Utility elements.
//!
//! - [`Identity`]: pass-through with error injection
//! - [`CapsFilter`]: restricts the formats negotiated across it

mod capsfilter;
mod identity;

pub use capsfilter::CapsFilter;
pub use identity::Identity;
