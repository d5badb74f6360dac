//! # PGception-Core
//!
//! Core types for the PGception pose-based action recognizer: the COCO
//! keypoint ordering, the fixed skeleton neighborhoods that define each graph
//! branch, and the shared error type.

pub mod error;
pub mod skeleton;
pub mod types;

pub use error::{Error, Result};
pub use skeleton::*;
pub use types::*;
