//! Handle types for arena-stored physics objects
//!
//! Bodies and octree nodes live in slot maps; everything else refers to them
//! through these keys instead of identity-keyed references.

pub use slotmap::{SlotMap, Key};

slotmap::new_key_type! {
    /// Handle to a rigid body registered in a [`World`](crate::physics::World)
    pub struct BodyHandle;
}

/// Identifier of a collision shape, unique within its owning body
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(pub(crate) u32);

impl ShapeId {
    /// Get the raw identifier value
    pub fn index(self) -> u32 {
        self.0
    }
}

/// World-wide key of a collision shape: owning body plus per-body shape id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeKey {
    /// Body that owns the shape
    pub body: BodyHandle,
    /// Shape identifier inside that body
    pub shape: ShapeId,
}

impl ShapeKey {
    /// Create a new shape key
    pub fn new(body: BodyHandle, shape: ShapeId) -> Self {
        Self { body, shape }
    }
}

/// Unordered pair of shapes, stored with the smaller key first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapePair {
    /// Smaller shape key
    pub first: ShapeKey,
    /// Larger shape key
    pub second: ShapeKey,
}

impl ShapePair {
    /// Create a new pair (always stores the smaller key first for consistency)
    pub fn new(a: ShapeKey, b: ShapeKey) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_pair_is_unordered() {
        let mut bodies: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let a = bodies.insert(());
        let b = bodies.insert(());

        let key_a = ShapeKey::new(a, ShapeId(0));
        let key_b = ShapeKey::new(b, ShapeId(3));

        assert_eq!(ShapePair::new(key_a, key_b), ShapePair::new(key_b, key_a));
        assert_ne!(
            ShapePair::new(key_a, key_b),
            ShapePair::new(key_a, ShapeKey::new(b, ShapeId(4)))
        );
    }
}
