//! Mesh construction utilities.
//!
//! Meshes are built from face-vertex lists, the representation hosts hand over
//! when they pass a selection to the fairing engine, and can be exported back
//! to the same form after a commit.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::{Face, HalfEdge, HalfEdgeMesh};
use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::error::{MeshError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// # Example
/// ```
/// use fairmesh::mesh::build_from_triangles;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<HalfEdgeMesh> {
    let polygons: Vec<Vec<usize>> = faces.iter().map(|f| f.to_vec()).collect();
    build_from_polygons(vertices, &polygons)
}

/// Build a half-edge mesh from vertices and polygonal faces.
///
/// Faces are counter-clockwise corner lists of three or more distinct vertex
/// indices. Vertex ids in the result equal the input positions, which is what
/// lets [`triangulate_faces`](super::triangulate_faces) rebuild a mesh without
/// invalidating a selection.
///
/// # Errors
///
/// - [`MeshError::EmptyMesh`] if `faces` is empty
/// - [`MeshError::InvalidVertexIndex`] for an out-of-range corner
/// - [`MeshError::DegenerateFace`] for a face with fewer than 3 or repeated corners
/// - [`MeshError::NonManifoldEdge`] if a directed edge is used by two faces
pub fn build_from_polygons(vertices: &[Point3<f64>], faces: &[Vec<usize>]) -> Result<HalfEdgeMesh> {
    if faces.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    for (fi, face) in faces.iter().enumerate() {
        if let Some(&vi) = face.iter().find(|&&vi| vi >= vertices.len()) {
            return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
        }
        let mut sorted = face.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if face.len() < 3 || sorted.len() != face.len() {
            return Err(MeshError::DegenerateFace { face: fi });
        }
    }

    let corner_count: usize = faces.iter().map(Vec::len).sum();
    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), corner_count + corner_count / 4, faces.len());

    let vertex_ids: Vec<VertexId> = vertices.iter().map(|&pos| mesh.add_vertex(pos)).collect();

    // Directed edge (v0, v1) -> interior half-edge
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId> = HashMap::with_capacity(corner_count);
    let mut directed: Vec<(usize, usize)> = Vec::with_capacity(corner_count);

    // First pass: create interior half-edges and faces
    for face in faces {
        let n = face.len();
        let base = mesh.num_halfedges();
        let face_id = FaceId::new(mesh.num_faces());
        mesh.faces.push(Face {
            halfedge: HalfEdgeId::new(base),
        });

        for (k, &vi) in face.iter().enumerate() {
            let vj = face[(k + 1) % n];
            let he = HalfEdgeId::new(base + k);
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[vi],
                twin: HalfEdgeId::invalid(),
                next: HalfEdgeId::new(base + (k + 1) % n),
                prev: HalfEdgeId::new(base + (k + n - 1) % n),
                face: face_id,
            });
            mesh.vertex_mut(vertex_ids[vi]).halfedge = he;

            if edge_map.insert((vi, vj), he).is_some() {
                return Err(MeshError::NonManifoldEdge { v0: vi, v1: vj });
            }
            directed.push((vi, vj));
        }
    }

    // Second pass: link twins, creating boundary half-edges where needed.
    // Walk in half-edge order so boundary ids are deterministic.
    for (i, &(v0, v1)) in directed.iter().enumerate() {
        let he = HalfEdgeId::new(i);
        if let Some(&twin) = edge_map.get(&(v1, v0)) {
            mesh.halfedge_mut(he).twin = twin;
        } else {
            let boundary_he = HalfEdgeId::new(mesh.num_halfedges());
            mesh.halfedges.push(HalfEdge {
                origin: vertex_ids[v1],
                twin: he,
                ..HalfEdge::default()
            });
            mesh.halfedge_mut(he).twin = boundary_he;
        }
    }

    link_boundary_loops(&mut mesh, directed.len());
    fix_boundary_vertex_halfedges(&mut mesh);

    Ok(mesh)
}

/// Link boundary half-edges (ids from `first_boundary` on) into loops.
fn link_boundary_loops(mesh: &mut HalfEdgeMesh, first_boundary: usize) {
    let boundary_hes: Vec<HalfEdgeId> = (first_boundary..mesh.num_halfedges())
        .map(HalfEdgeId::new)
        .collect();

    let outgoing: HashMap<VertexId, HalfEdgeId> = boundary_hes
        .iter()
        .map(|&he| (mesh.origin(he), he))
        .collect();

    for &he in &boundary_hes {
        // The next boundary half-edge starts where this one ends
        let dest = mesh.dest(he);
        if let Some(&next_he) = outgoing.get(&dest) {
            mesh.halfedge_mut(he).next = next_he;
            mesh.halfedge_mut(next_he).prev = he;
        }
    }
}

/// Ensure boundary vertices point to a boundary half-edge.
fn fix_boundary_vertex_halfedges(mesh: &mut HalfEdgeMesh) {
    for i in 0..mesh.num_vertices() {
        let vid = VertexId::new(i);
        let boundary = mesh
            .vertex_halfedges(vid)
            .find(|&he| mesh.is_boundary_halfedge(he));
        if let Some(he) = boundary {
            mesh.vertex_mut(vid).halfedge = he;
        }
    }
}

/// Convert a half-edge mesh back to a face-vertex representation.
///
/// Returns the positions and one corner list per face.
pub fn to_face_vertex(mesh: &HalfEdgeMesh) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_vertices(f).map(VertexId::index).collect())
        .collect();
    (mesh.positions(), faces)
}
