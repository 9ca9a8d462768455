//! Topological regions of faces around a selection.
//!
//! A fairing pass of continuity order `k` reads `k` rings of context around
//! the affected vertices. When the involved faces are triangulated first, the
//! triangulated region has to reach that far too, which is what
//! [`involved_faces`] computes from [`boundary_faces`] and [`expand`].

use std::collections::{HashMap, HashSet, VecDeque};

use crate::mesh::{FaceId, HalfEdgeMesh, VertexId};

use super::fair::Continuity;

/// Faces of `faces` that share an edge with a face outside the set.
///
/// Edges on the mesh border have no face on the other side and do not count.
pub fn boundary_faces(mesh: &HalfEdgeMesh, faces: &HashSet<FaceId>) -> HashSet<FaceId> {
    faces
        .iter()
        .copied()
        .filter(|&f| mesh.face_neighbors(f).any(|g| !faces.contains(&g)))
        .collect()
}

/// Grow `faces` outward by `rings` breadth-first hops across shared edges.
///
/// `rings == 0` returns the input unchanged. Growth stops early once no new
/// face can be reached (the whole connected component is covered).
pub fn expand(mesh: &HalfEdgeMesh, faces: &HashSet<FaceId>, rings: usize) -> HashSet<FaceId> {
    let mut result = faces.clone();
    let mut frontier: VecDeque<FaceId> = faces.iter().copied().collect();

    for _ in 0..rings {
        if frontier.is_empty() {
            break;
        }
        let mut next = VecDeque::new();
        while let Some(f) = frontier.pop_front() {
            for g in mesh.face_neighbors(f) {
                if result.insert(g) {
                    next.push_back(g);
                }
            }
        }
        frontier = next;
    }

    result
}

/// Faces incident to any of `vertices`.
pub fn adjacent_faces(mesh: &HalfEdgeMesh, vertices: &[VertexId]) -> HashSet<FaceId> {
    vertices
        .iter()
        .filter(|&&v| mesh.contains_vertex(v))
        .flat_map(|&v| mesh.vertex_faces(v))
        .collect()
}

/// Faces to triangulate so that a pass of order `continuity` has full support.
///
/// This is the faces adjacent to the affected vertices, plus their boundary
/// faces expanded by `continuity.rings()`.
///
/// # Example
///
/// ```
/// use fairmesh::prelude::*;
/// use fairmesh::algo::region::involved_faces;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let mesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap();
///
/// let faces = involved_faces(&mesh, &[VertexId::new(1)], Continuity::Position);
/// assert_eq!(faces.len(), 1);
/// let faces = involved_faces(&mesh, &[VertexId::new(1)], Continuity::Tangent);
/// assert_eq!(faces.len(), 2);
/// ```
pub fn involved_faces(
    mesh: &HalfEdgeMesh,
    affected: &[VertexId],
    continuity: Continuity,
) -> HashSet<FaceId> {
    let mut involved = adjacent_faces(mesh, affected);
    let grown = expand(mesh, &boundary_faces(mesh, &involved), continuity.rings());
    involved.extend(grown);
    involved
}

/// Vertices within `rings` edge hops of `seeds`, with their hop distance.
///
/// Seeds have distance 0. Used by the solver to bound the support of the
/// order-`k` operator.
pub(crate) fn vertex_rings(
    mesh: &HalfEdgeMesh,
    seeds: &[VertexId],
    rings: usize,
) -> Vec<(VertexId, usize)> {
    let mut distance: HashMap<VertexId, usize> = HashMap::with_capacity(seeds.len() * 4);
    let mut order: Vec<(VertexId, usize)> = Vec::with_capacity(seeds.len() * 4);
    let mut queue: VecDeque<VertexId> = VecDeque::new();

    for &v in seeds {
        if distance.insert(v, 0).is_none() {
            order.push((v, 0));
            queue.push_back(v);
        }
    }

    while let Some(v) = queue.pop_front() {
        let d = distance[&v];
        if d == rings {
            continue;
        }
        for w in mesh.vertex_neighbors(v) {
            if !distance.contains_key(&w) {
                distance.insert(w, d + 1);
                order.push((w, d + 1));
                queue.push_back(w);
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_triangles;
    use nalgebra::Point3;

    /// n x n quads, each split into two triangles.
    fn create_grid(n: usize) -> HalfEdgeMesh {
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v10 = v00 + 1;
                let v01 = v00 + (n + 1);
                let v11 = v01 + 1;
                faces.push([v00, v10, v11]);
                faces.push([v00, v11, v01]);
            }
        }
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_expand_zero_is_identity() {
        let mesh = create_grid(3);
        let seed: HashSet<FaceId> = [FaceId::new(4), FaceId::new(7)].into_iter().collect();
        assert_eq!(expand(&mesh, &seed, 0), seed);
    }

    #[test]
    fn test_expand_is_monotone_and_stabilizes() {
        let mesh = create_grid(4);
        let all: HashSet<FaceId> = mesh.face_ids().collect();
        let seed: HashSet<FaceId> = [FaceId::new(0)].into_iter().collect();

        let mut previous = seed.clone();
        for k in 1..=40 {
            let grown = expand(&mesh, &seed, k);
            assert!(grown.is_superset(&previous), "ring {} lost faces", k);
            previous = grown;
        }
        assert_eq!(previous, all);
        assert_eq!(expand(&mesh, &all, 3), all);
    }

    #[test]
    fn test_expand_one_ring_across_edges() {
        let mesh = create_grid(2);
        // Face 0 is the lower triangle of the corner cell; it shares edges with
        // face 1 (its partner) and face 3 (upper triangle of the cell to the right).
        let seed: HashSet<FaceId> = [FaceId::new(0)].into_iter().collect();
        let grown = expand(&mesh, &seed, 1);
        let expected: HashSet<FaceId> = [0, 1, 3].into_iter().map(FaceId::new).collect();
        assert_eq!(grown, expected);
    }

    #[test]
    fn test_boundary_faces_of_whole_mesh_is_empty() {
        let mesh = create_grid(3);
        let all: HashSet<FaceId> = mesh.face_ids().collect();
        assert!(boundary_faces(&mesh, &all).is_empty());
    }

    #[test]
    fn test_boundary_faces_of_single_face() {
        let mesh = create_grid(2);
        let seed: HashSet<FaceId> = [FaceId::new(0)].into_iter().collect();
        assert_eq!(boundary_faces(&mesh, &seed), seed);
        assert!(boundary_faces(&mesh, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_involved_faces_grow_with_continuity() {
        let mesh = create_grid(6);
        // Centre vertex of the 7x7 grid
        let centre = [VertexId::new(24)];

        let pos = involved_faces(&mesh, &centre, Continuity::Position);
        let tan = involved_faces(&mesh, &centre, Continuity::Tangent);
        let curv = involved_faces(&mesh, &centre, Continuity::Curvature);

        assert_eq!(pos.len(), 6);
        assert!(tan.is_superset(&pos) && tan.len() > pos.len());
        assert!(curv.is_superset(&tan) && curv.len() > tan.len());
    }

    #[test]
    fn test_vertex_rings_distances() {
        let mesh = create_grid(4);
        let centre = VertexId::new(12);
        let rings = vertex_rings(&mesh, &[centre, centre], 1);

        assert_eq!(rings[0], (centre, 0));
        assert_eq!(rings.len(), 7);
        assert!(rings[1..].iter().all(|&(_, d)| d == 1));
    }
}
