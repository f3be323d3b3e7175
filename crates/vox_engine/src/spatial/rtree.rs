//! Bounded-fanout R-tree over axis-aligned boxes
//!
//! The scene's collision index. Leaves carry collision masks and a weak
//! back-reference to the owning transform; branch nodes carry the union of
//! their children's bounds and masks so that mask-filtered queries can prune
//! whole subtrees.
//!
//! Balancing quality is deliberately simple: insertion picks the subtree
//! needing the least enlargement and overflowing nodes split along their
//! longest axis.

use crate::physics::PhysicsGroups;
use crate::scene::TransformId;
use slotmap::{new_key_type, SlotMap};

use super::Aabb;

new_key_type! {
    /// Opaque handle to a leaf entry in the spatial index
    ///
    /// Handles are generation-checked: after the leaf is removed, lookups
    /// through a stale handle yield `None`.
    pub struct RtreeLeafId;
}

#[derive(Debug)]
struct Node {
    aabb: Aabb,
    parent: Option<RtreeLeafId>,
    children: Vec<RtreeLeafId>,
    groups: u32,
    collides_with: u32,
    /// Owning transform, present on leaves only
    owner: Option<TransformId>,
}

/// Bounded-fanout R-tree of collidable volumes
#[derive(Debug)]
pub struct Rtree {
    nodes: SlotMap<RtreeLeafId, Node>,
    root: Option<RtreeLeafId>,
    max_per_node: usize,
    leaf_count: usize,
    masks_dirty: bool,
}

impl Rtree {
    /// Create an empty index
    ///
    /// `max_per_node` is the fanout bound; a node exceeding it is split.
    pub fn new(min_per_node: usize, max_per_node: usize) -> Self {
        debug_assert!(min_per_node >= 2 && max_per_node >= min_per_node * 2);
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            max_per_node,
            leaf_count: 0,
            masks_dirty: false,
        }
    }

    /// Number of leaves currently stored
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Insert a collider box and return its leaf handle
    pub fn insert(
        &mut self,
        aabb: Aabb,
        groups: u32,
        collides_with: u32,
        owner: TransformId,
    ) -> RtreeLeafId {
        let leaf = self.nodes.insert(Node {
            aabb,
            parent: None,
            children: Vec::new(),
            groups,
            collides_with,
            owner: Some(owner),
        });
        self.leaf_count += 1;

        if let Some(root) = self.root {
            let target = self.choose_subtree(root, &aabb);
            self.nodes[target].children.push(leaf);
            self.nodes[leaf].parent = Some(target);
            self.adjust_upward(target, &aabb, groups, collides_with);
            if self.nodes[target].children.len() > self.max_per_node {
                self.split(target);
            }
        } else {
            let root = self.nodes.insert(Node {
                aabb,
                parent: None,
                children: vec![leaf],
                groups,
                collides_with,
                owner: None,
            });
            self.nodes[leaf].parent = Some(root);
            self.root = Some(root);
        }
        leaf
    }

    /// Remove a leaf; an absent or stale handle is a no-op
    pub fn remove(&mut self, leaf: RtreeLeafId) {
        let Some(node) = self.nodes.get(leaf) else {
            return;
        };
        debug_assert!(node.owner.is_some(), "remove expects a leaf handle");
        let parent = node.parent;
        self.nodes.remove(leaf);
        self.leaf_count -= 1;

        // Prune emptied branches and shrink bounds on the way up
        let mut current = parent;
        while let Some(id) = current {
            let parent_of = self.nodes[id].parent;
            let mut children = std::mem::take(&mut self.nodes[id].children);
            children.retain(|c| self.nodes.contains_key(*c));

            if children.is_empty() {
                if self.root == Some(id) {
                    self.root = None;
                }
                self.nodes.remove(id);
            } else {
                let (aabb, groups, collides_with) = self.bounds_of(&children);
                let node = &mut self.nodes[id];
                node.children = children;
                node.aabb = aabb;
                node.groups = groups;
                node.collides_with = collides_with;
            }
            current = parent_of;
        }
    }

    /// Update a leaf's collision masks
    ///
    /// The leaf itself changes immediately; aggregated branch masks stay
    /// stale-conservative until [`Self::refresh_pending_masks`] runs.
    pub fn set_masks(&mut self, leaf: RtreeLeafId, groups: u32, collides_with: u32) {
        if let Some(node) = self.nodes.get_mut(leaf) {
            debug_assert!(node.owner.is_some(), "set_masks expects a leaf handle");
            node.groups = groups;
            node.collides_with = collides_with;
            self.masks_dirty = true;
        }
    }

    /// Recompute aggregated branch masks after mid-frame mask changes
    pub fn refresh_pending_masks(&mut self) {
        if !self.masks_dirty {
            return;
        }
        if let Some(root) = self.root {
            self.refresh_masks_recurse(root);
        }
        self.masks_dirty = false;
    }

    /// Collect all leaves overlapping `aabb` that pass the mask filter
    ///
    /// Returns the number of hits appended to `out`.
    pub fn query_overlap(
        &self,
        aabb: &Aabb,
        groups: u32,
        collides_with: u32,
        epsilon: f32,
        out: &mut Vec<RtreeLeafId>,
    ) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !PhysicsGroups::should_collide(node.groups, node.collides_with, groups, collides_with)
            {
                continue;
            }
            if !node.aabb.intersects_epsilon(aabb, epsilon) {
                continue;
            }
            if node.owner.is_some() {
                out.push(id);
                count += 1;
            } else {
                stack.extend(node.children.iter().copied());
            }
        }
        count
    }

    /// Bounds of a leaf, if the handle is still live
    pub fn leaf_aabb(&self, leaf: RtreeLeafId) -> Option<Aabb> {
        self.nodes.get(leaf).map(|n| n.aabb)
    }

    /// Owning transform of a leaf, if the handle is still live
    pub fn leaf_owner(&self, leaf: RtreeLeafId) -> Option<TransformId> {
        self.nodes.get(leaf).and_then(|n| n.owner)
    }

    /// Collision masks of a leaf, if the handle is still live
    pub fn leaf_masks(&self, leaf: RtreeLeafId) -> Option<(u32, u32)> {
        self.nodes.get(leaf).map(|n| (n.groups, n.collides_with))
    }

    fn choose_subtree(&self, root: RtreeLeafId, aabb: &Aabb) -> RtreeLeafId {
        let mut current = root;
        loop {
            let node = &self.nodes[current];
            match node.children.first().copied() {
                // Empty branch or a branch of leaves: insert here
                None => return current,
                Some(first) if self.nodes[first].owner.is_some() => return current,
                _ => {
                    let mut best = node.children[0];
                    let mut best_cost = f32::MAX;
                    for &child in &node.children {
                        let cost = self.nodes[child].aabb.enlargement(aabb);
                        if cost < best_cost {
                            best_cost = cost;
                            best = child;
                        }
                    }
                    current = best;
                }
            }
        }
    }

    fn adjust_upward(&mut self, from: RtreeLeafId, aabb: &Aabb, groups: u32, collides_with: u32) {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = &mut self.nodes[id];
            node.aabb.merge(aabb);
            node.groups |= groups;
            node.collides_with |= collides_with;
            current = node.parent;
        }
    }

    fn bounds_of(&self, children: &[RtreeLeafId]) -> (Aabb, u32, u32) {
        debug_assert!(!children.is_empty());
        let mut aabb = self.nodes[children[0]].aabb;
        let mut groups = 0;
        let mut collides_with = 0;
        for &child in children {
            let node = &self.nodes[child];
            aabb.merge(&node.aabb);
            groups |= node.groups;
            collides_with |= node.collides_with;
        }
        (aabb, groups, collides_with)
    }

    fn split(&mut self, start: RtreeLeafId) {
        let mut id = start;
        loop {
            if self.nodes[id].children.len() <= self.max_per_node {
                return;
            }

            // Distribute children across the node and a new sibling, sorted
            // by center along the node's longest axis
            let axis = self.nodes[id].aabb.longest_axis();
            let mut children = std::mem::take(&mut self.nodes[id].children);
            children.sort_by(|a, b| {
                let ca = self.nodes[*a].aabb.center()[axis];
                let cb = self.nodes[*b].aabb.center()[axis];
                ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
            });
            let right = children.split_off(children.len() / 2);
            let left = children;

            let (left_aabb, left_groups, left_cw) = self.bounds_of(&left);
            let (right_aabb, right_groups, right_cw) = self.bounds_of(&right);
            let parent = self.nodes[id].parent;

            {
                let node = &mut self.nodes[id];
                node.children = left;
                node.aabb = left_aabb;
                node.groups = left_groups;
                node.collides_with = left_cw;
            }

            let sibling = self.nodes.insert(Node {
                aabb: right_aabb,
                parent,
                children: right,
                groups: right_groups,
                collides_with: right_cw,
                owner: None,
            });
            let sibling_children = self.nodes[sibling].children.clone();
            for child in sibling_children {
                self.nodes[child].parent = Some(sibling);
            }

            if let Some(parent) = parent {
                self.nodes[parent].children.push(sibling);
                id = parent;
            } else {
                let new_root = self.nodes.insert(Node {
                    aabb: left_aabb.merged(&right_aabb),
                    parent: None,
                    children: vec![id, sibling],
                    groups: left_groups | right_groups,
                    collides_with: left_cw | right_cw,
                    owner: None,
                });
                self.nodes[id].parent = Some(new_root);
                self.nodes[sibling].parent = Some(new_root);
                self.root = Some(new_root);
                return;
            }
        }
    }

    fn refresh_masks_recurse(&mut self, id: RtreeLeafId) -> (u32, u32) {
        if self.nodes[id].owner.is_some() {
            let node = &self.nodes[id];
            return (node.groups, node.collides_with);
        }
        let children = self.nodes[id].children.clone();
        let mut groups = 0;
        let mut collides_with = 0;
        for child in children {
            let (g, cw) = self.refresh_masks_recurse(child);
            groups |= g;
            collides_with |= cw;
        }
        let node = &mut self.nodes[id];
        node.groups = groups;
        node.collides_with = collides_with;
        (groups, collides_with)
    }
}
