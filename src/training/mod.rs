//! Local training
//!
//! The [`Trainer`] seam plus a synthetic implementation that lets a node run
//! end to end without a real model.

mod synthetic;
mod traits;

pub use synthetic::*;
pub use traits::*;
