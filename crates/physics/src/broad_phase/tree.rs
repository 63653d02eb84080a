//! Dynamic bounding volume tree.
//!
//! Leaves store a fattened AABB and a payload. Internal nodes are kept
//! balanced with AVL style rotations on every insert and remove. Proxy handles
//! are leaf node indices; they stay valid until the leaf is removed, including
//! across [`DynamicTree::optimize`].

use glam::Vec3;

use crate::types::Aabb;

const NULL: u32 = u32::MAX;

#[derive(Clone, Debug)]
struct Node<T> {
    aabb: Aabb,
    parent: u32,
    children: [u32; 2],
    /// Leaves are 0, free nodes -1.
    height: i32,
    payload: Option<T>,
}

impl<T> Node<T> {
    fn is_leaf(&self) -> bool {
        self.children[0] == NULL
    }
}

#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    nodes: Vec<Node<T>>,
    root: u32,
    free: Vec<u32>,
    margin: f32,
    leaf_count: usize,
}

impl<T: Copy> DynamicTree<T> {
    /// `margin` fattens leaf boxes so small movements do not restructure the tree.
    #[must_use]
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL,
            free: Vec::new(),
            margin,
            leaf_count: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Height of the tree, 0 when empty or a single leaf.
    #[must_use]
    pub fn height(&self) -> i32 {
        if self.root == NULL {
            0
        } else {
            self.node(self.root).height
        }
    }

    pub fn insert(&mut self, aabb: Aabb, payload: T) -> u32 {
        let leaf = self.allocate();
        let margin = self.margin;
        {
            let node = self.node_mut(leaf);
            node.aabb = aabb.expanded(margin);
            node.height = 0;
            node.payload = Some(payload);
        }
        self.insert_leaf(leaf);
        self.leaf_count += 1;
        leaf
    }

    /// Removes a leaf and returns its payload. Unknown handles return `None`.
    pub fn remove(&mut self, proxy: u32) -> Option<T> {
        if !self.is_live_leaf(proxy) {
            return None;
        }
        let payload = self.node(proxy).payload;
        self.remove_leaf(proxy);
        self.release(proxy);
        self.leaf_count -= 1;
        payload
    }

    /// Moves a leaf. Returns `true` when the fat box had to be rebuilt.
    pub fn update(&mut self, proxy: u32, aabb: Aabb) -> bool {
        if !self.is_live_leaf(proxy) || self.node(proxy).aabb.contains(&aabb) {
            return false;
        }
        self.remove_leaf(proxy);
        let margin = self.margin;
        self.node_mut(proxy).aabb = aabb.expanded(margin);
        self.insert_leaf(proxy);
        true
    }

    #[must_use]
    pub fn fat_aabb(&self, proxy: u32) -> Option<Aabb> {
        self.is_live_leaf(proxy).then(|| self.node(proxy).aabb)
    }

    #[must_use]
    pub fn payload(&self, proxy: u32) -> Option<T> {
        if self.is_live_leaf(proxy) {
            self.node(proxy).payload
        } else {
            None
        }
    }

    /// Calls `visit` for every leaf whose fat box overlaps `aabb`.
    pub fn query(&self, aabb: &Aabb, mut visit: impl FnMut(u32, T)) {
        if self.root == NULL {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = self.node(index);
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if let Some(payload) = node.payload {
                    visit(index, payload);
                }
            } else {
                stack.extend(node.children);
            }
        }
    }

    /// Walks leaves hit by the ray `origin + t * direction`, `t` in
    /// `[0, max_fraction]`, nearer boxes first. `visit` receives the box entry
    /// fraction and may return a new, closer maximum fraction to prune the
    /// rest of the walk.
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_fraction: f32, mut visit: impl FnMut(T, f32) -> Option<f32>) {
        if self.root == NULL {
            return;
        }
        let mut max_fraction = max_fraction;
        let Some(root_entry) = self.node(self.root).aabb.ray_entry(origin, direction, max_fraction) else {
            return;
        };
        let mut stack = vec![(self.root, root_entry)];
        while let Some((index, entry)) = stack.pop() {
            if entry > max_fraction {
                continue;
            }
            let node = self.node(index);
            if node.is_leaf() {
                if let Some(payload) = node.payload {
                    if let Some(closer) = visit(payload, entry) {
                        max_fraction = max_fraction.min(closer);
                    }
                }
                continue;
            }
            let mut hits = node
                .children
                .map(|child| self.node(child).aabb.ray_entry(origin, direction, max_fraction).map(|t| (child, t)));
            // the nearer child goes on top of the stack
            if let [Some((_, t0)), Some((_, t1))] = hits {
                if t0 < t1 {
                    hits.swap(0, 1);
                }
            }
            stack.extend(hits.into_iter().flatten());
        }
    }

    /// Rebuilds all internal nodes top down by median split. Leaf handles are
    /// unchanged.
    pub fn optimize(&mut self) {
        let mut leaves = Vec::with_capacity(self.leaf_count);
        for index in 0..self.nodes.len() {
            let node = &self.nodes[index];
            if node.height < 0 {
                continue;
            }
            let index = u32::try_from(index).unwrap_or(NULL);
            if node.is_leaf() {
                leaves.push(index);
            } else {
                self.release(index);
            }
        }
        self.root = if leaves.is_empty() { NULL } else { self.build(&mut leaves, NULL) };
    }

    fn build(&mut self, items: &mut [u32], parent: u32) -> u32 {
        if let [single] = items {
            self.node_mut(*single).parent = parent;
            return *single;
        }
        let centroids = Aabb::from_points(items.iter().map(|&i| self.node(i).aabb.center()));
        let size = centroids.max - centroids.min;
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        items.sort_by(|&a, &b| {
            let ca = self.node(a).aabb.center()[axis];
            let cb = self.node(b).aabb.center()[axis];
            ca.total_cmp(&cb)
        });
        let index = self.allocate();
        let (left, right) = items.split_at_mut(items.len() / 2);
        let c0 = self.build(left, index);
        let c1 = self.build(right, index);
        let aabb = self.node(c0).aabb.union(self.node(c1).aabb);
        let height = 1 + self.node(c0).height.max(self.node(c1).height);
        let node = self.node_mut(index);
        node.parent = parent;
        node.children = [c0, c1];
        node.aabb = aabb;
        node.height = height;
        index
    }

    fn node(&self, index: u32) -> &Node<T> {
        &self.nodes[index as usize]
    }

    fn node_mut(&mut self, index: u32) -> &mut Node<T> {
        &mut self.nodes[index as usize]
    }

    fn is_live_leaf(&self, index: u32) -> bool {
        self.nodes
            .get(index as usize)
            .is_some_and(|n| n.height == 0 && n.is_leaf() && n.payload.is_some())
    }

    fn allocate(&mut self) -> u32 {
        let fresh = Node {
            aabb: Aabb::EMPTY,
            parent: NULL,
            children: [NULL, NULL],
            height: 0,
            payload: None,
        };
        if let Some(index) = self.free.pop() {
            *self.node_mut(index) = fresh;
            index
        } else {
            self.nodes.push(fresh);
            u32::try_from(self.nodes.len() - 1).unwrap_or(NULL)
        }
    }

    fn release(&mut self, index: u32) {
        let node = self.node_mut(index);
        node.height = -1;
        node.payload = None;
        node.children = [NULL, NULL];
        node.parent = NULL;
        self.free.push(index);
    }

    fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        if parent == NULL {
            self.root = new;
            return;
        }
        let children = &mut self.node_mut(parent).children;
        if children[0] == old {
            children[0] = new;
        } else {
            children[1] = new;
        }
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL {
            self.root = leaf;
            self.node_mut(leaf).parent = NULL;
            return;
        }

        // Descend along the cheapest surface area increase.
        let leaf_aabb = self.node(leaf).aabb;
        let mut index = self.root;
        while !self.node(index).is_leaf() {
            let node = self.node(index);
            let area = node.aabb.surface_area();
            let combined_area = node.aabb.union(leaf_aabb).surface_area();
            let cost = 2.0 * combined_area;
            let inheritance = 2.0 * (combined_area - area);
            let child_cost = |child: u32| {
                let c = self.node(child);
                let grown = leaf_aabb.union(c.aabb).surface_area();
                if c.is_leaf() {
                    grown + inheritance
                } else {
                    grown - c.aabb.surface_area() + inheritance
                }
            };
            let [c0, c1] = node.children;
            let (cost0, cost1) = (child_cost(c0), child_cost(c1));
            if cost < cost0 && cost < cost1 {
                break;
            }
            index = if cost0 < cost1 { c0 } else { c1 };
        }

        let sibling = index;
        let old_parent = self.node(sibling).parent;
        let new_parent = self.allocate();
        let aabb = leaf_aabb.union(self.node(sibling).aabb);
        let height = self.node(sibling).height + 1;
        {
            let node = self.node_mut(new_parent);
            node.parent = old_parent;
            node.children = [sibling, leaf];
            node.aabb = aabb;
            node.height = height;
        }
        self.replace_child(old_parent, sibling, new_parent);
        self.node_mut(sibling).parent = new_parent;
        self.node_mut(leaf).parent = new_parent;
        self.refit(new_parent);
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL;
            return;
        }
        let parent = self.node(leaf).parent;
        let grand_parent = self.node(parent).parent;
        let [c0, c1] = self.node(parent).children;
        let sibling = if c0 == leaf { c1 } else { c0 };

        self.replace_child(grand_parent, parent, sibling);
        self.node_mut(sibling).parent = grand_parent;
        self.release(parent);
        if grand_parent != NULL {
            self.refit(grand_parent);
        }
    }

    /// Walks to the root, rebalancing and recomputing boxes and heights.
    fn refit(&mut self, start: u32) {
        let mut index = start;
        while index != NULL {
            index = self.balance(index);
            let [c0, c1] = self.node(index).children;
            let aabb = self.node(c0).aabb.union(self.node(c1).aabb);
            let height = 1 + self.node(c0).height.max(self.node(c1).height);
            let node = self.node_mut(index);
            node.aabb = aabb;
            node.height = height;
            index = node.parent;
        }
    }

    /// Rotates the taller child of `a` above it when the subtree is out of
    /// balance. Returns the new subtree root.
    fn balance(&mut self, a: u32) -> u32 {
        if self.node(a).is_leaf() || self.node(a).height < 2 {
            return a;
        }
        let [b, c] = self.node(a).children;
        let skew = self.node(c).height - self.node(b).height;
        if skew > 1 {
            self.rotate_up(a, c, 1)
        } else if skew < -1 {
            self.rotate_up(a, b, 0)
        } else {
            a
        }
    }

    /// Promotes `child` (stored at `slot` of `a`) to `a`'s position.
    fn rotate_up(&mut self, a: u32, child: u32, slot: usize) -> u32 {
        let other = self.node(a).children[1 - slot];
        let [f, g] = self.node(child).children;
        let a_parent = self.node(a).parent;

        self.node_mut(child).children[0] = a;
        self.node_mut(child).parent = a_parent;
        self.node_mut(a).parent = child;
        self.replace_child(a_parent, a, child);

        let (keep, give) = if self.node(f).height > self.node(g).height { (f, g) } else { (g, f) };
        self.node_mut(child).children[1] = keep;
        self.node_mut(a).children[slot] = give;
        self.node_mut(give).parent = a;

        let a_aabb = self.node(other).aabb.union(self.node(give).aabb);
        let a_height = 1 + self.node(other).height.max(self.node(give).height);
        {
            let node = self.node_mut(a);
            node.aabb = a_aabb;
            node.height = a_height;
        }
        let c_aabb = a_aabb.union(self.node(keep).aabb);
        let c_height = 1 + a_height.max(self.node(keep).height);
        let node = self.node_mut(child);
        node.aabb = c_aabb;
        node.height = c_height;
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32, y: f32, z: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec3::new(x, y, z), Vec3::splat(0.5))
    }

    fn build_grid(n: i32) -> (DynamicTree<usize>, Vec<(u32, Aabb)>) {
        let mut tree = DynamicTree::new(0.0);
        let mut proxies = Vec::new();
        let mut id = 0;
        for x in 0..n {
            for z in 0..n {
                #[allow(clippy::cast_precision_loss)]
                let aabb = unit_box(x as f32 * 2.0, 0.0, z as f32 * 2.0);
                proxies.push((tree.insert(aabb, id), aabb));
                id += 1;
            }
        }
        (tree, proxies)
    }

    fn collect(tree: &DynamicTree<usize>, aabb: &Aabb) -> Vec<usize> {
        let mut hits = Vec::new();
        tree.query(aabb, |_, p| hits.push(p));
        hits.sort_unstable();
        hits
    }

    #[test]
    fn query_matches_brute_force() {
        let (tree, proxies) = build_grid(10);
        let query = Aabb::new(Vec3::new(3.0, -1.0, 3.0), Vec3::new(7.2, 1.0, 5.0));
        let expected: Vec<usize> = proxies
            .iter()
            .enumerate()
            .filter(|(_, (_, aabb))| aabb.overlaps(&query))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(collect(&tree, &query), expected);
    }

    #[test]
    fn stays_balanced() {
        let mut tree = DynamicTree::new(0.1);
        for i in 0..256 {
            #[allow(clippy::cast_precision_loss)]
            tree.insert(unit_box(i as f32, 0.0, 0.0), i);
        }
        assert_eq!(tree.len(), 256);
        assert!(tree.height() <= 12, "height {}", tree.height());
    }

    #[test]
    fn remove_and_update() {
        let (mut tree, proxies) = build_grid(4);
        let (proxy, _) = proxies[5];
        assert_eq!(tree.remove(proxy), Some(5));
        assert_eq!(tree.remove(proxy), None);
        assert!(!collect(&tree, &Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0))).contains(&5));

        let (moved, _) = proxies[0];
        assert!(tree.update(moved, unit_box(50.0, 0.0, 50.0)));
        assert_eq!(collect(&tree, &unit_box(50.0, 0.0, 50.0)), vec![0]);
        assert!(!tree.update(moved, unit_box(50.0, 0.0, 50.0)));
    }

    #[test]
    fn optimize_keeps_handles() {
        let (mut tree, proxies) = build_grid(8);
        tree.optimize();
        for (i, (proxy, aabb)) in proxies.iter().enumerate() {
            assert_eq!(tree.payload(*proxy), Some(i));
            assert_eq!(tree.fat_aabb(*proxy), Some(*aabb));
        }
        let all = collect(&tree, &Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0)));
        assert_eq!(all.len(), 64);
        assert!(tree.height() <= 7);
    }

    #[test]
    fn ray_walk_reaches_closest_leaf() {
        let (tree, _) = build_grid(5);
        let mut visited = Vec::new();
        tree.cast_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(20.0, 0.0, 0.0), 1.0, |p, entry| {
            visited.push(p);
            Some(entry)
        });
        assert!(visited.contains(&0));
        assert!(visited.iter().all(|p| p % 5 == 0));
    }

    #[test]
    fn ray_walk_visits_nearest_leaves_first() {
        let mut tree = DynamicTree::new(0.0);
        for i in [5, 2, 7, 0, 3, 6, 1, 4] {
            #[allow(clippy::cast_precision_loss)]
            tree.insert(unit_box(i as f32 * 2.0, 0.0, 0.0), i);
        }
        tree.optimize();
        let mut entries = Vec::new();
        tree.cast_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(25.0, 0.0, 0.0), 1.0, |_, entry| {
            entries.push(entry);
            None
        });
        assert_eq!(entries.len(), 8);
        assert!(entries.windows(2).all(|w| w[0] <= w[1]), "{entries:?}");

        // the closest hit prunes every box behind it
        let mut visited = Vec::new();
        tree.cast_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(25.0, 0.0, 0.0), 1.0, |p, entry| {
            visited.push(p);
            Some(entry)
        });
        assert_eq!(visited, vec![0]);
    }
}
