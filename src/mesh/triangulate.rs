//! Triangulation of a face subset.
//!
//! Cotangent weights and Voronoi areas are only exact on triangles, so hosts
//! may ask for the faces around a selection to be triangulated before fairing.
//! This is the only step that changes topology, and it always happens before a
//! fairing pass starts.

use std::collections::HashSet;

use super::builder::{build_from_polygons, to_face_vertex};
use super::halfedge::HalfEdgeMesh;
use super::index::FaceId;
use crate::error::Result;

/// Return a copy of `mesh` in which every face in `faces` is split into triangles.
///
/// Quads are split along their shorter diagonal; larger polygons are fanned
/// from their first corner. Faces not listed, and faces that already are
/// triangles, are kept unchanged. Vertex ids are preserved, face ids are not.
///
/// # Example
/// ```
/// use std::collections::HashSet;
/// use fairmesh::mesh::{build_from_polygons, triangulate_faces, FaceId};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let quad = build_from_polygons(&vertices, &[vec![0, 1, 2, 3]]).unwrap();
/// let all: HashSet<FaceId> = quad.face_ids().collect();
/// let tris = triangulate_faces(&quad, &all).unwrap();
/// assert_eq!(tris.num_faces(), 2);
/// assert!(tris.is_triangle_mesh());
/// ```
pub fn triangulate_faces(mesh: &HalfEdgeMesh, faces: &HashSet<FaceId>) -> Result<HalfEdgeMesh> {
    let (positions, polygons) = to_face_vertex(mesh);
    let mut out: Vec<Vec<usize>> = Vec::with_capacity(polygons.len() + faces.len() * 2);

    for (fi, polygon) in polygons.into_iter().enumerate() {
        if polygon.len() == 3 || !faces.contains(&FaceId::new(fi)) {
            out.push(polygon);
            continue;
        }

        if polygon.len() == 4 {
            let [a, b, c, d] = [polygon[0], polygon[1], polygon[2], polygon[3]];
            let ac = (positions[c] - positions[a]).norm_squared();
            let bd = (positions[d] - positions[b]).norm_squared();
            if ac <= bd {
                out.push(vec![a, b, c]);
                out.push(vec![a, c, d]);
            } else {
                out.push(vec![a, b, d]);
                out.push(vec![b, c, d]);
            }
        } else {
            let apex = polygon[0];
            for pair in polygon[1..].windows(2) {
                out.push(vec![apex, pair[0], pair[1]]);
            }
        }
    }

    build_from_polygons(&positions, &out)
}
