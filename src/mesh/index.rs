//! Index types for mesh elements.
//!
//! Vertices, half-edges and faces are addressed through distinct newtypes over
//! `u32`, so a face id can never be handed to a vertex lookup by accident.
//! Weight caches and solver tables are dense arrays indexed by these ids.

use std::fmt::{self, Debug};

/// Sentinel value marking an absent element.
const INVALID: u32 = u32::MAX;

/// A type-safe vertex index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId(u32);

/// A type-safe half-edge index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct HalfEdgeId(u32);

/// A type-safe face index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId(u32);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl $name {
            /// Create an id from a dense array position.
            ///
            /// Positions beyond `u32::MAX - 1` are a programming error and are
            /// caught in debug builds.
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index < INVALID as usize, "index {} does not fit in u32", index);
                Self(index as u32)
            }

            /// The id that refers to nothing.
            #[inline]
            pub const fn invalid() -> Self {
                Self(INVALID)
            }

            /// Position of this element in the mesh's dense storage.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Whether this id refers to an element.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 != INVALID
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.0)
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, "V");
impl_index_type!(HalfEdgeId, "HE");
impl_index_type!(FaceId, "F");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_id() {
        let v = VertexId::new(42);
        assert_eq!(v.index(), 42);
        assert!(v.is_valid());
        assert!(!VertexId::invalid().is_valid());
        assert_eq!(VertexId::default(), VertexId::invalid());
    }

    #[test]
    fn test_ids_order_by_index() {
        let mut faces = vec![FaceId::new(7), FaceId::new(2), FaceId::new(5)];
        faces.sort();
        assert_eq!(faces, vec![FaceId::new(2), FaceId::new(5), FaceId::new(7)]);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", VertexId::new(42)), "V(42)");
        assert_eq!(format!("{:?}", HalfEdgeId::new(3)), "HE(3)");
        assert_eq!(format!("{:?}", FaceId::invalid()), "F(INVALID)");
    }
}
