//! Chart pattern matchers
//!
//! # Pattern Catalog
//!
//! - **Reversal tops**: Double Top, Head and Shoulders, Rising Wedge
//! - **Reversal bottoms**: Double Bottom, Falling Wedge
//! - **Continuations**: Cup and Handle, Ascending Triangle

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod ascending_triangle;
pub mod cup_and_handle;
pub mod double;
pub mod head_and_shoulders;
pub mod wedge;

// Re-export all detectors for convenience
pub use ascending_triangle::*;
pub use cup_and_handle::*;
pub use double::*;
pub use head_and_shoulders::*;
pub use wedge::*;
