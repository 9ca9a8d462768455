//! # fairmesh
//!
//! Continuity-constrained fairing of polygon meshes.
//!
//! Select a region of a surface mesh and fairmesh replaces it with the
//! smoothest patch that blends into the surrounding surface, matching its
//! position, tangent plane or curvature at the border.
//!
//! ## Features
//!
//! - **Half-edge data structure**: O(1) adjacency queries with type-safe indices
//! - **Polygon support**: triangles, quads and n-gons, with optional
//!   triangulation of the region around a selection
//! - **Discrete operators**: uniform, Voronoi area and cotangent weights
//! - **Background execution**: cancellable task with live status text and an
//!   atomic commit into a shared mesh
//!
//! ## Quick Start
//!
//! ```
//! use fairmesh::prelude::*;
//! use nalgebra::Point3;
//!
//! // A 5x5 grid of quads with a spike in the middle
//! let mut vertices = Vec::new();
//! for j in 0..5 {
//!     for i in 0..5 {
//!         vertices.push(Point3::new(i as f64, j as f64, 0.0));
//!     }
//! }
//! vertices[12].z = 2.0;
//! let mut faces = Vec::new();
//! for j in 0..4 {
//!     for i in 0..4 {
//!         let v = j * 5 + i;
//!         faces.push(vec![v, v + 1, v + 6, v + 5]);
//!     }
//! }
//! let mut mesh = build_from_polygons(&vertices, &faces).unwrap();
//!
//! let vertex_weights = VertexWeight::Voronoi.build(&mesh);
//! let loop_weights = LoopWeight::Cotan.build(&mesh);
//! let ok = fair(
//!     &mut mesh,
//!     &[VertexId::new(12)],
//!     Continuity::Tangent,
//!     &vertex_weights,
//!     &loop_weights,
//!     &CancelToken::new(),
//!     &FairingStatus::new(),
//!     &FairOptions::default(),
//! );
//! assert!(ok);
//! assert!(mesh.position(VertexId::new(12)).z.abs() < 1e-6);
//! ```
//!
//! ## Running in the Background
//!
//! ```
//! use std::sync::{Arc, RwLock};
//! use fairmesh::prelude::*;
//! use nalgebra::Point3;
//!
//! # let vertices = vec![
//! #     Point3::new(0.0, 0.0, 0.0),
//! #     Point3::new(1.0, 0.0, 0.0),
//! #     Point3::new(1.0, 1.0, 0.0),
//! #     Point3::new(0.0, 1.0, 0.0),
//! # ];
//! # let faces = vec![[0, 1, 2], [0, 2, 3]];
//! let mesh: SharedMesh = Arc::new(RwLock::new(build_from_triangles(&vertices, &faces).unwrap()));
//!
//! // Nothing selected: the task ends without touching the mesh
//! let handle = FairingTask::new(Arc::clone(&mesh), FairRequest::new(Vec::new())).start();
//! println!("{}", handle.status());
//! assert_eq!(handle.join(), FairOutcome::NothingToDo);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;
pub mod task;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use fairmesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::fair::{fair, try_fair, Continuity, FairOptions, FairReport};
    pub use crate::algo::status::{CancelToken, FairingStatus};
    pub use crate::algo::weights::{LoopWeight, VertexWeight};
    pub use crate::error::{FairError, MeshError, Result, SolveError};
    pub use crate::mesh::{
        build_from_polygons, build_from_triangles, to_face_vertex, triangulate_faces, FaceId,
        HalfEdgeId, HalfEdgeMesh, VertexId,
    };
    pub use crate::task::{FairOutcome, FairRequest, FairingHandle, FairingTask, SharedMesh};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
