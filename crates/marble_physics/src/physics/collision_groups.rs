//! Collision group masks for filtering detection and response
//!
//! Every shape carries two masks: a detection mask deciding whether a pair is
//! tested at all, and a response mask deciding whether a detected contact is
//! resolved by the impulse solver. Trigger-like shapes detect but do not
//! respond. Ray and shape casts filter with the same detection mask.

use bitflags::bitflags;

bitflags! {
    /// Collision group bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CollisionGroups: u32 {
        /// Generic objects
        const DEFAULT = 1 << 0;

        /// Static level geometry
        const ENVIRONMENT = 1 << 1;

        /// Moving bodies (marbles, props)
        const DYNAMIC = 1 << 2;

        /// Trigger volumes (no physical response)
        const TRIGGER = 1 << 3;

        /// Camera probes
        const CAMERA = 1 << 4;

        /// Every group
        const ALL = u32::MAX;
    }
}

impl Default for CollisionGroups {
    fn default() -> Self {
        Self::ALL
    }
}

impl CollisionGroups {
    /// Check whether two masks share at least one group
    ///
    /// # Example
    /// ```
    /// use marble_physics::physics::CollisionGroups;
    ///
    /// let floor = CollisionGroups::ENVIRONMENT;
    /// let marble = CollisionGroups::ENVIRONMENT | CollisionGroups::DYNAMIC;
    /// assert!(floor.overlaps(marble));
    /// assert!(!floor.overlaps(CollisionGroups::CAMERA));
    /// ```
    pub fn overlaps(self, other: Self) -> bool {
        self.intersects(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collides_with_everything() {
        let default = CollisionGroups::default();
        assert!(default.overlaps(CollisionGroups::TRIGGER));
        assert!(default.overlaps(CollisionGroups::CAMERA));
    }

    #[test]
    fn test_empty_mask_never_overlaps() {
        assert!(!CollisionGroups::empty().overlaps(CollisionGroups::ALL));
    }
}
