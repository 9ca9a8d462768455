//! Core mesh data structures.
//!
//! This module provides the half-edge mesh the fairing engine operates on.
//!
//! # Overview
//!
//! The primary type is [`HalfEdgeMesh`], a polygon mesh stored as a half-edge
//! (doubly-connected edge list) structure. One-ring and face-adjacency queries
//! are O(1) per step, which is what the region expander and the operator
//! assembly lean on.
//!
//! Elements are identified by [`VertexId`], [`HalfEdgeId`] and [`FaceId`].
//!
//! # Construction
//!
//! ```
//! use fairmesh::mesh::{build_from_polygons, HalfEdgeMesh};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mesh: HalfEdgeMesh = build_from_polygons(&vertices, &[vec![0, 1, 2, 3]]).unwrap();
//! assert_eq!(mesh.num_faces(), 1);
//! ```

mod builder;
mod halfedge;
mod index;
mod triangulate;

pub use builder::{build_from_polygons, build_from_triangles, to_face_vertex};
pub use halfedge::{Face, FaceHalfEdgeIter, HalfEdge, HalfEdgeMesh, Vertex, VertexHalfEdgeIter};
pub use index::{FaceId, HalfEdgeId, VertexId};
pub use triangulate::triangulate_faces;
