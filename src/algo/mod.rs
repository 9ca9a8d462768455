//! Mesh fairing algorithms.
//!
//! The engine is split into small pieces that build on each other:
//!
//! - **Weights** ([`weights`]): uniform, Voronoi area and cotangent weights
//! - **Regions** ([`region`]): boundary faces and k-ring growth of face sets
//! - **Sparse algebra** ([`sparse`]): CSR matrices and preconditioned CG
//! - **Fairing** ([`fair`]): the continuity-constrained solve itself
//! - **Status** ([`status`]): phase reporting and cooperative cancellation
//!
//! The background task that chains them lives in [`crate::task`].

pub mod fair;
pub mod region;
pub mod sparse;
pub mod status;
pub mod weights;

pub use fair::{fair, try_fair, Continuity, FairOptions, FairReport};
pub use region::{boundary_faces, expand, involved_faces};
pub use status::{CancelToken, FairingStatus, StatusSnapshot};
pub use weights::{LoopWeight, LoopWeightCache, VertexWeight, VertexWeightCache};
