//! Fixed joint neighborhoods over the COCO skeleton.
//!
//! Each table lists, for every joint in [`Keypoint`] order, the joints it
//! aggregates from. Every joint lists itself, and every edge is declared in
//! both directions, so the tables describe undirected graphs with self-loops.
//!
//! [`Keypoint`]: crate::types::Keypoint

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Keypoint;

/// Neighbor table indexed by joint
pub type NeighborTable = [&'static [usize]; Keypoint::COUNT];

/// One-hop neighborhoods along the skeleton's bones
pub const LOCAL_NEIGHBORS: NeighborTable = [
    &[0, 1, 2, 5, 6],
    &[0, 1, 3],
    &[0, 2, 4],
    &[1, 3],
    &[2, 4],
    &[0, 5, 6, 7, 11],
    &[0, 5, 6, 8, 12],
    &[5, 7, 9],
    &[6, 8, 10],
    &[7, 9],
    &[8, 10],
    &[5, 11, 12, 13],
    &[6, 11, 12, 14],
    &[11, 13, 15],
    &[12, 14, 16],
    &[13, 15],
    &[14, 16],
];

/// Two-hop neighborhoods along the skeleton's bones
pub const EXTENDED_NEIGHBORS: NeighborTable = [
    &[0, 1, 2, 3, 4, 5, 6, 7, 8, 11, 12],
    &[0, 1, 2, 3, 5, 6],
    &[0, 1, 2, 4, 5, 6],
    &[0, 1, 3],
    &[0, 2, 4],
    &[0, 1, 2, 5, 6, 7, 8, 9, 11, 12, 13],
    &[0, 1, 2, 5, 6, 7, 8, 10, 11, 12, 14],
    &[0, 5, 6, 7, 9, 11],
    &[0, 5, 6, 8, 10, 12],
    &[5, 7, 9],
    &[6, 8, 10],
    &[0, 5, 6, 7, 11, 12, 13, 14, 15],
    &[0, 5, 6, 8, 11, 12, 13, 14, 16],
    &[5, 11, 12, 13, 15],
    &[6, 11, 12, 14, 16],
    &[11, 13, 15],
    &[12, 14, 16],
];

/// How a branch connects joints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Every joint aggregates only from itself
    SelfOnly,
    /// Explicit per-joint neighbor lists
    Table(&'static NeighborTable),
    /// Every joint aggregates from every joint
    Complete,
}

/// Parallel graph-convolution path of a PGception layer
///
/// The discriminant fixes the concatenation order of branch outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Identity = 0,
    Local = 1,
    Extended = 2,
    Dense = 3,
}

impl Branch {
    pub const COUNT: usize = 4;

    pub const ALL: [Branch; Self::COUNT] =
        [Branch::Identity, Branch::Local, Branch::Extended, Branch::Dense];

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Branch::Identity => "identity",
            Branch::Local => "local",
            Branch::Extended => "extended",
            Branch::Dense => "dense",
        }
    }

    pub fn topology(self) -> Topology {
        match self {
            Branch::Identity => Topology::SelfOnly,
            Branch::Local => Topology::Table(&LOCAL_NEIGHBORS),
            Branch::Extended => Topology::Table(&EXTENDED_NEIGHBORS),
            Branch::Dense => Topology::Complete,
        }
    }

    /// Whether learned edge attention may be applied on this branch.
    /// Self-only aggregation has no edges to reweight.
    pub fn supports_attention(self) -> bool {
        !matches!(self, Branch::Identity)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Branch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "identity" => Ok(Branch::Identity),
            "1" | "local" => Ok(Branch::Local),
            "2" | "extended" => Ok(Branch::Extended),
            "3" | "dense" => Ok(Branch::Dense),
            other => Err(Error::InvalidConfig(format!(
                "unknown branch '{other}', expected one of identity, local, extended, dense"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_undirected_with_self_loops(table: &NeighborTable) {
        for (joint, neighbors) in table.iter().enumerate() {
            assert!(neighbors.contains(&joint), "joint {joint} lacks a self-loop");
            for &n in neighbors.iter() {
                assert!(n < Keypoint::COUNT);
                assert!(
                    table[n].contains(&joint),
                    "edge {joint}->{n} is not declared in both directions"
                );
            }
        }
    }

    #[test]
    fn test_local_neighbors_are_symmetric() {
        assert_undirected_with_self_loops(&LOCAL_NEIGHBORS);
    }

    #[test]
    fn test_extended_neighbors_are_symmetric() {
        assert_undirected_with_self_loops(&EXTENDED_NEIGHBORS);
    }

    #[test]
    fn test_extended_contains_local() {
        for joint in 0..Keypoint::COUNT {
            for n in LOCAL_NEIGHBORS[joint] {
                assert!(EXTENDED_NEIGHBORS[joint].contains(n));
            }
        }
    }

    #[test]
    fn test_branch_parsing() {
        assert_eq!("local".parse::<Branch>().unwrap(), Branch::Local);
        assert_eq!("3".parse::<Branch>().unwrap(), Branch::Dense);
        assert!("sideways".parse::<Branch>().is_err());
    }

    #[test]
    fn test_identity_branch_has_no_attention() {
        assert!(!Branch::Identity.supports_attention());
        assert!(Branch::ALL[1..].iter().all(|b| b.supports_attention()));
    }
}
