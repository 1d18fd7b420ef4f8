//! Loose octree spatial partitioning structure
//!
//! Divides 3D space into hierarchical cubes for fast bounding-box overlap
//! queries. Each node's query volume is twice its nominal cube, so an object
//! only has to have its center inside a node (and be smaller than it) to be
//! stored there. Objects sitting near a boundary therefore do not thrash
//! between siblings when they move.
//!
//! Nodes live in a slot map; an auxiliary object→node map gives O(1) removal
//! and lets [`Octree::update`] start from the object's current node instead of
//! re-descending from the root.

use std::collections::HashMap;
use std::hash::Hash;

use slotmap::SlotMap;

use crate::config::OctreeConfig;
use crate::foundation::math::Vec3;
use super::Aabb;

slotmap::new_key_type! {
    /// Key of a node inside an [`Octree`]
    pub struct NodeKey;
}

/// Single node in the octree hierarchy
#[derive(Debug, Clone)]
struct OctreeNode<T> {
    /// Parent node, `None` for the root
    parent: Option<NodeKey>,

    /// Minimum corner of the nominal cube
    min: Vec3,

    /// Edge length of the nominal cube
    size: f32,

    /// Subdivision level; the unit cube is level 0, children are one deeper
    level: i32,

    /// Objects that fit this node but none of its octants
    objects: Vec<(T, Aabb)>,

    /// Child nodes (8 octants), None if this is a leaf
    children: Option<[NodeKey; 8]>,

    /// Objects stored in this node and all descendants
    count: usize,
}

impl<T> OctreeNode<T> {
    fn new(parent: Option<NodeKey>, min: Vec3, size: f32, level: i32) -> Self {
        Self {
            parent,
            min,
            size,
            level,
            objects: Vec::new(),
            children: None,
            count: 0,
        }
    }

    fn unit_root() -> Self {
        Self::new(None, Vec3::zeros(), 1.0, 0)
    }

    fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    fn bounds(&self) -> Aabb {
        Aabb::new(self.min, self.min + Vec3::repeat(self.size))
    }

    /// Query volume: the nominal cube grown by half its size on every side
    fn loose_bounds(&self) -> Aabb {
        self.bounds().expanded(self.size * 0.5)
    }

    /// Strictly larger than the box on every axis
    fn larger_than(&self, aabb: &Aabb) -> bool {
        let size = aabb.size();
        self.size > size.x && self.size > size.y && self.size > size.z
    }

    fn contains_center(&self, aabb: &Aabb) -> bool {
        self.bounds().contains_point(&aabb.center())
    }

    fn fits(&self, aabb: &Aabb) -> bool {
        self.larger_than(aabb) && self.contains_center(aabb)
    }

    /// Get the octant index (0-7) for a position within this node's cube
    fn octant_index(&self, position: &Vec3) -> usize {
        let half = self.size * 0.5;
        let x_bit = usize::from(position.x >= self.min.x + half);
        let y_bit = usize::from(position.y >= self.min.y + half);
        let z_bit = usize::from(position.z >= self.min.z + half);

        // Octant layout:
        // 0: -X, -Y, -Z    4: -X, -Y, +Z
        // 1: +X, -Y, -Z    5: +X, -Y, +Z
        // 2: -X, +Y, -Z    6: -X, +Y, +Z
        // 3: +X, +Y, -Z    7: +X, +Y, +Z
        (z_bit << 2) | (y_bit << 1) | x_bit
    }

    fn octant_min(&self, octant: usize) -> Vec3 {
        let half = self.size * 0.5;
        self.min + Vec3::new(
            if octant & 1 != 0 { half } else { 0.0 },
            if octant & 2 != 0 { half } else { 0.0 },
            if octant & 4 != 0 { half } else { 0.0 },
        )
    }
}

/// Loose octree mapping objects to their bounding boxes
#[derive(Debug, Clone)]
pub struct Octree<T> {
    /// Node arena
    nodes: SlotMap<NodeKey, OctreeNode<T>>,

    /// Current root node
    root: NodeKey,

    /// Node each object is stored in
    object_nodes: HashMap<T, NodeKey>,

    /// Configuration
    config: OctreeConfig,
}

impl<T: Copy + Eq + Hash + std::fmt::Debug> Default for Octree<T> {
    fn default() -> Self {
        Self::new(OctreeConfig::default())
    }
}

impl<T: Copy + Eq + Hash + std::fmt::Debug> Octree<T> {
    /// Create an empty octree rooted at the unit cube
    pub fn new(config: OctreeConfig) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(OctreeNode::unit_root());
        Self {
            nodes,
            root,
            object_nodes: HashMap::new(),
            config,
        }
    }

    /// Number of objects in the tree
    pub fn len(&self) -> usize {
        self.object_nodes.len()
    }

    /// Whether the tree holds no objects
    pub fn is_empty(&self) -> bool {
        self.object_nodes.is_empty()
    }

    /// Whether the object is stored in the tree
    pub fn contains(&self, object: &T) -> bool {
        self.object_nodes.contains_key(object)
    }

    /// Number of live nodes (1 for a lone leaf root)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nominal cube of the root node
    pub fn root_bounds(&self) -> Aabb {
        self.nodes[self.root].bounds()
    }

    /// Insert an object with its bounding box
    ///
    /// Inserting an object that is already present moves it to the new box.
    pub fn insert(&mut self, object: T, aabb: Aabb) {
        if self.object_nodes.contains_key(&object) {
            self.update(object, aabb);
            return;
        }

        while !self.nodes[self.root].fits(&aabb) {
            if self.nodes[self.root].level <= -(self.config.max_grow_steps as i32) {
                log::warn!(
                    "Octree cannot grow to fit {:?} ({:?}); storing it in the root",
                    object,
                    aabb
                );
                let root = self.root;
                self.nodes[root].count += 1;
                self.nodes[root].objects.push((object, aabb));
                self.object_nodes.insert(object, root);
                return;
            }
            self.grow(&aabb);
        }

        self.insert_into(self.root, object, aabb);
        self.shrink();
    }

    /// Remove an object; returns whether it was present
    pub fn remove(&mut self, object: &T) -> bool {
        let Some(key) = self.object_nodes.remove(object) else {
            return false;
        };

        self.detach_entry(key, object);
        self.merge_upwards(key);
        self.shrink();
        true
    }

    /// Move an object to a new bounding box
    ///
    /// Walks up from the object's current node only as far as the first
    /// ancestor that still fits the box, then descends from there.
    pub fn update(&mut self, object: T, aabb: Aabb) {
        let Some(&key) = self.object_nodes.get(&object) else {
            self.insert(object, aabb);
            return;
        };

        self.detach_entry(key, &object);

        let mut ancestor = key;
        while !self.nodes[ancestor].fits(&aabb) {
            match self.nodes[ancestor].parent {
                Some(parent) => ancestor = parent,
                None => {
                    // Not even the root fits; fall back to a full insert
                    self.object_nodes.remove(&object);
                    self.merge_upwards(key);
                    self.shrink();
                    self.insert(object, aabb);
                    return;
                }
            }
        }

        self.adjust_ancestor_counts(ancestor, 1);
        self.insert_into(ancestor, object, aabb);
        self.merge_upwards(key);
        self.shrink();
    }

    /// All objects whose bounding box intersects the query box
    pub fn intersect_aabb(&self, query: &Aabb) -> Vec<T> {
        let mut results = Vec::new();
        let mut stack = vec![self.root];

        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if node.count == 0 {
                continue;
            }
            // Root objects are always tested: failed growth parks objects there
            if key != self.root && !node.loose_bounds().intersects(query) {
                continue;
            }

            results.extend(
                node.objects
                    .iter()
                    .filter(|(_, aabb)| aabb.intersects(query))
                    .map(|(object, _)| *object),
            );

            if let Some(children) = node.children {
                stack.extend_from_slice(&children);
            }
        }

        results
    }

    /// Remove every object and reset the root to the unit cube
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.object_nodes.clear();
        self.root = self.nodes.insert(OctreeNode::unit_root());
    }

    /// Descend from `start` to the deepest fitting node and store the object
    ///
    /// Counts of `start` and the nodes below it are incremented here; the
    /// caller is responsible for the ancestors of `start`.
    fn insert_into(&mut self, start: NodeKey, object: T, aabb: Aabb) {
        let center = aabb.center();
        let mut key = start;

        loop {
            let node = &mut self.nodes[key];
            node.count += 1;
            let Some(children) = node.children else {
                break;
            };
            let child = children[node.octant_index(&center)];
            if !self.nodes[child].fits(&aabb) {
                break;
            }
            key = child;
        }

        self.nodes[key].objects.push((object, aabb));
        self.object_nodes.insert(object, key);

        let node = &self.nodes[key];
        if node.is_leaf()
            && node.objects.len() > self.config.max_objects_per_node
            && node.level < self.config.max_split_level
        {
            self.split(key);
        }
    }

    /// Subdivide a leaf into 8 octants and push down the objects that fit
    fn split(&mut self, key: NodeKey) {
        let (min, size, level) = {
            let node = &self.nodes[key];
            (node.min, node.size, node.level)
        };
        let half = size * 0.5;

        let children: [NodeKey; 8] = std::array::from_fn(|octant| {
            let offset = Vec3::new(
                if octant & 1 != 0 { half } else { 0.0 },
                if octant & 2 != 0 { half } else { 0.0 },
                if octant & 4 != 0 { half } else { 0.0 },
            );
            self.nodes.insert(OctreeNode::new(Some(key), min + offset, half, level + 1))
        });

        let objects = std::mem::take(&mut self.nodes[key].objects);
        self.nodes[key].children = Some(children);

        let mut kept = Vec::new();
        for (object, aabb) in objects {
            let child = children[self.nodes[key].octant_index(&aabb.center())];
            if self.nodes[child].fits(&aabb) {
                let child_node = &mut self.nodes[child];
                child_node.objects.push((object, aabb));
                child_node.count += 1;
                self.object_nodes.insert(object, child);
            } else {
                kept.push((object, aabb));
            }
        }
        self.nodes[key].objects = kept;

        for child in children {
            let node = &self.nodes[child];
            if node.objects.len() > self.config.max_objects_per_node
                && node.level < self.config.max_split_level
            {
                self.split(child);
            }
        }
    }

    /// Collapse every descendant of `key` back into it
    fn merge(&mut self, key: NodeKey) {
        let Some(children) = self.nodes[key].children.take() else {
            return;
        };

        let mut gathered = Vec::new();
        let mut stack = children.to_vec();
        while let Some(child) = stack.pop() {
            if let Some(node) = self.nodes.remove(child) {
                gathered.extend(node.objects);
                if let Some(grandchildren) = node.children {
                    stack.extend_from_slice(&grandchildren);
                }
            }
        }

        for (object, _) in &gathered {
            self.object_nodes.insert(*object, key);
        }
        self.nodes[key].objects.extend(gathered);
    }

    /// Merge the highest ancestor of `key` whose subtree is small enough
    fn merge_upwards(&mut self, key: NodeKey) {
        let mut candidate = None;
        let mut current = Some(key);
        while let Some(k) = current {
            let node = &self.nodes[k];
            if !node.is_leaf() && node.count <= self.config.max_objects_per_node {
                candidate = Some(k);
            }
            current = node.parent;
        }
        if let Some(k) = candidate {
            self.merge(k);
        }
    }

    /// Double the root toward the object, re-parenting the old root
    fn grow(&mut self, aabb: &Aabb) {
        let old_root = self.root;
        let (min, size, level, count) = {
            let node = &self.nodes[old_root];
            (node.min, node.size, node.level, node.count)
        };
        let old_bounds = self.nodes[old_root].bounds();
        let corners = aabb.corners();

        // Bit set on an axis means the new root extends in the positive direction
        let mut best_direction = 0;
        let mut best_covered = 0;
        for direction in 0..8usize {
            let new_min = Self::grown_min(min, size, direction);
            let grown = Aabb::new(new_min, new_min + Vec3::repeat(size * 2.0));
            let covered = corners
                .iter()
                .filter(|c| !old_bounds.contains_point(c) && grown.contains_point(c))
                .count();
            if covered > best_covered {
                best_covered = covered;
                best_direction = direction;
            }
        }

        let new_min = Self::grown_min(min, size, best_direction);
        let new_root = self.nodes.insert(OctreeNode::new(None, new_min, size * 2.0, level - 1));
        // The old root occupies the octant opposite to the growth direction
        let old_octant = !best_direction & 7;

        let children: [NodeKey; 8] = std::array::from_fn(|octant| {
            if octant == old_octant {
                old_root
            } else {
                let child_min = self.nodes[new_root].octant_min(octant);
                self.nodes.insert(OctreeNode::new(Some(new_root), child_min, size, level))
            }
        });

        self.nodes[old_root].parent = Some(new_root);
        let root = &mut self.nodes[new_root];
        root.children = Some(children);
        root.count = count;
        self.root = new_root;
    }

    fn grown_min(min: Vec3, size: f32, direction: usize) -> Vec3 {
        Vec3::new(
            if direction & 1 != 0 { min.x } else { min.x - size },
            if direction & 2 != 0 { min.y } else { min.y - size },
            if direction & 4 != 0 { min.z } else { min.z - size },
        )
    }

    /// Drop the root while it only forwards to a single non-empty child
    fn shrink(&mut self) {
        loop {
            let root = &self.nodes[self.root];
            if root.count == 0 {
                if root.children.is_some() || root.level != 0 || root.min != Vec3::zeros() {
                    self.nodes.clear();
                    self.root = self.nodes.insert(OctreeNode::unit_root());
                }
                return;
            }
            if !root.objects.is_empty() {
                return;
            }
            let Some(children) = root.children else {
                return;
            };

            let mut non_empty = children.iter().filter(|c| self.nodes[**c].count > 0);
            let (Some(&only), None) = (non_empty.next(), non_empty.next()) else {
                return;
            };

            let old_root = self.root;
            for child in children {
                if child != only {
                    self.free_subtree(child);
                }
            }
            self.nodes.remove(old_root);
            self.nodes[only].parent = None;
            self.root = only;
        }
    }

    fn free_subtree(&mut self, key: NodeKey) {
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(node) = self.nodes.remove(k) {
                if let Some(children) = node.children {
                    stack.extend_from_slice(&children);
                }
            }
        }
    }

    /// Take an object's entry out of its node and decrement counts up to the root
    fn detach_entry(&mut self, key: NodeKey, object: &T) {
        let node = &mut self.nodes[key];
        if let Some(index) = node.objects.iter().position(|(o, _)| o == object) {
            node.objects.swap_remove(index);
        }
        node.count = node.count.saturating_sub(1);
        self.adjust_ancestor_counts(key, -1);
    }

    /// Add `delta` to the count of every strict ancestor of `key`
    fn adjust_ancestor_counts(&mut self, key: NodeKey, delta: isize) {
        let mut current = self.nodes[key].parent;
        while let Some(k) = current {
            let node = &mut self.nodes[k];
            node.count = node.count.saturating_add_signed(delta);
            current = node.parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn small_box(center: Vec3) -> Aabb {
        Aabb::from_center_extents(center, Vec3::repeat(0.025))
    }

    fn random_box(rng: &mut StdRng, spread: f32) -> Aabb {
        let center = Vec3::new(
            rng.gen_range(-spread..spread),
            rng.gen_range(-spread..spread),
            rng.gen_range(-spread..spread),
        );
        let extents = Vec3::new(
            rng.gen_range(0.01..2.0),
            rng.gen_range(0.01..2.0),
            rng.gen_range(0.01..2.0),
        );
        Aabb::from_center_extents(center, extents)
    }

    #[test]
    fn test_octree_split_and_merge() {
        let mut octree: Octree<u32> = Octree::default();

        let centers = [
            Vec3::new(0.25, 0.25, 0.25),
            Vec3::new(0.75, 0.25, 0.25),
            Vec3::new(0.25, 0.75, 0.25),
            Vec3::new(0.75, 0.75, 0.25),
            Vec3::new(0.25, 0.25, 0.75),
            Vec3::new(0.75, 0.25, 0.75),
            Vec3::new(0.25, 0.75, 0.75),
            Vec3::new(0.75, 0.75, 0.75),
            Vec3::new(0.35, 0.35, 0.35),
        ];

        for (id, center) in centers.iter().take(8).enumerate() {
            octree.insert(id as u32, small_box(*center));
        }
        assert_eq!(octree.node_count(), 1); // 8 objects stay in a leaf

        octree.insert(8, small_box(centers[8]));
        assert_eq!(octree.node_count(), 9); // exactly one split
        assert_eq!(octree.len(), 9);

        assert!(octree.remove(&0));
        assert!(octree.remove(&1));
        assert_eq!(octree.node_count(), 1); // merged back into a leaf
        assert_eq!(octree.len(), 7);

        for id in 2..9u32 {
            let found = octree.intersect_aabb(&small_box(centers[id as usize]));
            assert!(found.contains(&id));
        }
    }

    #[test]
    fn test_octree_insert_query_remove() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut octree: Octree<u32> = Octree::default();
        let boxes: Vec<Aabb> = (0..200).map(|_| random_box(&mut rng, 100.0)).collect();

        for (id, aabb) in boxes.iter().enumerate() {
            octree.insert(id as u32, *aabb);
        }
        assert_eq!(octree.len(), boxes.len());

        for (id, aabb) in boxes.iter().enumerate() {
            assert!(octree.intersect_aabb(aabb).contains(&(id as u32)), "object {id} missing");
        }

        for id in (0..200u32).step_by(2) {
            assert!(octree.remove(&id));
        }
        for (id, aabb) in boxes.iter().enumerate() {
            let found = octree.intersect_aabb(aabb).contains(&(id as u32));
            assert_eq!(found, id % 2 == 1, "object {id} presence after removal");
        }
    }

    #[test]
    fn test_octree_update_moves_object() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut octree: Octree<u32> = Octree::default();
        let mut boxes: Vec<Aabb> = (0..64).map(|_| random_box(&mut rng, 20.0)).collect();
        for (id, aabb) in boxes.iter().enumerate() {
            octree.insert(id as u32, *aabb);
        }

        for _ in 0..5 {
            for (id, aabb) in boxes.iter_mut().enumerate() {
                let offset = Vec3::new(
                    rng.gen_range(-3.0..3.0),
                    rng.gen_range(-3.0..3.0),
                    rng.gen_range(-3.0..3.0),
                );
                *aabb = Aabb::new(aabb.min + offset, aabb.max + offset);
                octree.update(id as u32, *aabb);
            }
            for (id, aabb) in boxes.iter().enumerate() {
                assert!(octree.intersect_aabb(aabb).contains(&(id as u32)));
            }
        }

        // Moving far away must drop the object from its old neighborhood
        let old = boxes[0];
        octree.update(0, small_box(Vec3::new(500.0, 500.0, 500.0)));
        assert!(!octree.intersect_aabb(&old).contains(&0));
        assert!(octree.intersect_aabb(&small_box(Vec3::repeat(500.0))).contains(&0));
        assert_eq!(octree.len(), 64);
    }

    #[test]
    fn test_octree_resets_when_empty() {
        let mut octree: Octree<u32> = Octree::default();
        octree.insert(1, small_box(Vec3::new(40.0, -12.0, 3.0)));
        assert!(octree.root_bounds().size().x > 1.0);

        octree.remove(&1);
        assert!(octree.is_empty());
        assert_eq!(octree.node_count(), 1);
        assert_eq!(octree.root_bounds(), Aabb::new(Vec3::zeros(), Vec3::repeat(1.0)));
    }

    #[test]
    fn test_octree_growth_limit_keeps_object_queryable() {
        let config = OctreeConfig {
            max_grow_steps: 2,
            ..OctreeConfig::default()
        };
        let mut octree: Octree<u32> = Octree::new(config);
        let far = small_box(Vec3::new(1000.0, 0.0, 0.0));
        octree.insert(5, far);

        assert!(octree.contains(&5));
        assert_eq!(octree.intersect_aabb(&far), vec![5]);
        assert!(octree.remove(&5));
        assert!(octree.intersect_aabb(&far).is_empty());
    }
}
