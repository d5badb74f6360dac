//! # PGception
//!
//! Multi-branch graph convolution network for human action recognition from
//! 2D pose keypoints.
//!
//! ## Architecture Overview
//!
//! 1. **Adjacency**: four fixed 17×17 normalized graphs over the skeleton
//!    (identity, local, extended, dense)
//! 2. **Graph Convolution Unit**: linear transform plus aggregation over one graph
//! 3. **PGception Layer**: one graph convolution per branch, run in parallel
//!    and concatenated along channels in branch order
//! 4. **Block**: linear bottleneck feeding a PGception layer
//! 5. **Classification Head**: mean-pooled or flattened joints into an MLP
//!
//! The model emits raw multi-label logits `[batch, actions]`; training pairs
//! it with binary cross-entropy on logits.

pub mod adjacency;
pub mod block;
pub mod checkpoint;
pub mod gcn;
pub mod heads;
pub mod inference;
pub mod init;
pub mod layer;
pub mod model;

pub use adjacency::*;
pub use block::*;
pub use checkpoint::*;
pub use gcn::*;
pub use heads::*;
pub use inference::*;
pub use init::*;
pub use layer::*;
pub use model::*;
