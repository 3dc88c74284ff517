//src/tree.rs

use ahash::AHashSet;
use std::collections::BTreeSet;

/// Opaque handle into a `Tree` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub name: Option<String>,
    /// Length of the branch leading to this node
    pub length: f64,
    /// Support of the branch leading to this node
    pub support: Option<f64>,
}

/// Rooted phylogenetic tree stored as an arena of nodes.
///
/// Rerooting and contraction leave orphaned slots behind; everything that
/// walks the tree starts from `root`, so those slots are never visited.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Creates a tree holding a single unnamed root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id.0].children.is_empty()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].name.as_deref()
    }

    /// Size of the arena, including orphaned slots.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_child(&mut self, parent: NodeId, name: Option<String>, length: f64) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            name,
            length,
            support: None,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Parents before children, children in stored order.
    pub fn preorder_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.nodes[id.0].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    pub fn preorder(&self) -> Vec<NodeId> {
        self.preorder_from(self.root)
    }

    /// Children before parents.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = self.preorder();
        order.reverse();
        order
    }

    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        self.preorder_from(id)
            .into_iter()
            .filter(|&n| self.is_leaf(n))
            .collect()
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.leaves_under(self.root)
    }

    pub fn leaf_names_under(&self, id: NodeId) -> Vec<String> {
        self.leaves_under(id)
            .into_iter()
            .filter_map(|n| self.nodes[n.0].name.clone())
            .collect()
    }

    pub fn leaf_names(&self) -> Vec<String> {
        self.leaf_names_under(self.root)
    }

    pub fn find_leaf(&self, name: &str) -> Option<NodeId> {
        self.leaves()
            .into_iter()
            .find(|&n| self.name(n) == Some(name))
    }

    /// Number of leaves below each node, indexed by `NodeId.0`.
    pub fn leaf_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.nodes.len()];
        for id in self.postorder() {
            counts[id.0] = if self.is_leaf(id) {
                1
            } else {
                self.children(id).iter().map(|c| counts[c.0]).sum()
            };
        }
        counts
    }

    /// Longest branch-length path from `id` down to one of its leaves.
    pub fn height(&self, id: NodeId) -> f64 {
        let mut best: f64 = 0.0;
        let mut stack = vec![(id, 0.0f64)];
        while let Some((n, dist)) = stack.pop() {
            if self.is_leaf(n) {
                best = best.max(dist);
            }
            for &child in self.children(n) {
                stack.push((child, dist + self.nodes[child.0].length));
            }
        }
        best
    }

    /// Distance from the root to each node, indexed by `NodeId.0`.
    pub fn depths(&self) -> Vec<f64> {
        let mut depths = vec![0.0; self.nodes.len()];
        for id in self.preorder() {
            if let Some(p) = self.parent(id) {
                depths[id.0] = depths[p.0] + self.nodes[id.0].length;
            }
        }
        depths
    }

    /// Self first, root last.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cur = id;
        while let Some(p) = self.parent(cur) {
            path.push(p);
            cur = p;
        }
        path
    }

    pub fn mrca(&self, ids: &[NodeId]) -> Option<NodeId> {
        let (first, rest) = ids.split_first()?;
        let others: Vec<AHashSet<NodeId>> = rest
            .iter()
            .map(|&id| self.ancestors(id).into_iter().collect())
            .collect();
        self.ancestors(*first)
            .into_iter()
            .find(|candidate| others.iter().all(|set| set.contains(candidate)))
    }

    /// Moves the root onto the branch above `target`, splitting its length in half.
    pub fn reroot_above(&mut self, target: NodeId) {
        let Some(parent) = self.parent(target) else {
            return;
        };
        let edge_length = self.nodes[target.0].length;
        let edge_support = self.nodes[target.0].support;

        let path = self.ancestors(parent);
        let lengths: Vec<f64> = path.iter().map(|n| self.nodes[n.0].length).collect();
        let supports: Vec<Option<f64>> = path.iter().map(|n| self.nodes[n.0].support).collect();

        self.nodes[parent.0].children.retain(|&c| c != target);

        // Flip every edge between `parent` and the old root
        for i in 0..path.len() - 1 {
            let (child, up) = (path[i], path[i + 1]);
            self.nodes[up.0].children.retain(|&c| c != child);
            self.nodes[child.0].children.push(up);
            self.nodes[up.0].parent = Some(child);
            self.nodes[up.0].length = lengths[i];
            self.nodes[up.0].support = supports[i];
        }

        let new_root = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: vec![target, parent],
            name: None,
            length: 0.0,
            support: None,
        });
        self.nodes[target.0].parent = Some(new_root);
        self.nodes[target.0].length = edge_length / 2.0;
        self.nodes[parent.0].parent = Some(new_root);
        self.nodes[parent.0].length = edge_length / 2.0;
        self.nodes[parent.0].support = edge_support;
        self.root = new_root;

        let old_root = path[path.len() - 1];
        if self.nodes[old_root.0].children.len() == 1 {
            self.splice_unifurcation(old_root);
        }
    }

    /// Roots the tree on the outgroup leaves (matched by name).
    ///
    /// Returns false when the outgroup is empty or not monophyletic. A
    /// non-monophyletic outgroup is rooted on its first leaf alone.
    pub fn reroot_on_outgroup(&mut self, outgroup: &BTreeSet<String>) -> bool {
        let og_leaves: Vec<NodeId> = self
            .leaves()
            .into_iter()
            .filter(|&n| self.name(n).is_some_and(|name| outgroup.contains(name)))
            .collect();

        match og_leaves.len() {
            0 => false,
            1 => {
                self.reroot_above(og_leaves[0]);
                true
            }
            _ => {
                // Get the root off the outgroup first so the MRCA is meaningful
                let anchor = self
                    .leaves()
                    .into_iter()
                    .find(|&n| !self.name(n).is_some_and(|name| outgroup.contains(name)));
                let Some(anchor) = anchor else {
                    // Everything is outgroup; nothing to root against
                    return false;
                };
                self.reroot_above(anchor);

                let Some(mrca) = self.mrca(&og_leaves) else {
                    return false;
                };
                let monophyletic = self
                    .leaf_names_under(mrca)
                    .iter()
                    .all(|name| outgroup.contains(name));
                if monophyletic {
                    self.reroot_above(mrca);
                } else {
                    self.reroot_above(og_leaves[0]);
                }
                monophyletic
            }
        }
    }

    /// Canonical child order: by leaf count, ties by smallest leaf name.
    pub fn ladderize(&mut self, descending: bool) {
        let counts = self.leaf_counts();
        let mut min_names: Vec<String> = vec![String::new(); self.nodes.len()];
        for id in self.postorder() {
            min_names[id.0] = if self.is_leaf(id) {
                self.name(id).unwrap_or_default().to_string()
            } else {
                self.children(id)
                    .iter()
                    .map(|c| min_names[c.0].clone())
                    .min()
                    .unwrap_or_default()
            };
        }

        for id in self.preorder() {
            let mut children = self.nodes[id.0].children.clone();
            children.sort_by(|a, b| {
                let by_size = if descending {
                    counts[b.0].cmp(&counts[a.0])
                } else {
                    counts[a.0].cmp(&counts[b.0])
                };
                by_size.then_with(|| min_names[a.0].cmp(&min_names[b.0]))
            });
            self.nodes[id.0].children = children;
        }
    }

    /// Dissolves every internal non-root node whose branch is no longer than
    /// `threshold`, handing its children to its parent. Returns how many went.
    pub fn contract_short_edges(&mut self, threshold: f64) -> usize {
        let mut contracted = 0;
        for id in self.postorder() {
            if id == self.root || self.is_leaf(id) || self.nodes[id.0].length > threshold {
                continue;
            }
            let Some(parent) = self.parent(id) else {
                continue;
            };
            let length = self.nodes[id.0].length;
            let children = std::mem::take(&mut self.nodes[id.0].children);
            for &child in &children {
                self.nodes[child.0].parent = Some(parent);
                self.nodes[child.0].length += length;
            }
            let siblings = &mut self.nodes[parent.0].children;
            if let Some(pos) = siblings.iter().position(|&c| c == id) {
                siblings.splice(pos..=pos, children);
            }
            self.nodes[id.0].parent = None;
            contracted += 1;
        }
        contracted
    }

    /// Moves `members` (children of `parent`) under a fresh zero-length node.
    pub fn group_children(&mut self, parent: NodeId, members: &[NodeId]) -> NodeId {
        let id = NodeId(self.nodes.len());
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| members.contains(c))
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[parent.0].children.retain(|c| !members.contains(c));
        let position = position.min(self.nodes[parent.0].children.len());
        self.nodes[parent.0].children.insert(position, id);

        self.nodes.push(Node {
            parent: Some(parent),
            children: members.to_vec(),
            name: None,
            length: 0.0,
            support: None,
        });
        for &member in members {
            self.nodes[member.0].parent = Some(id);
        }
        id
    }

    fn splice_unifurcation(&mut self, id: NodeId) {
        let Some(&child) = self.nodes[id.0].children.first() else {
            return;
        };
        let length = self.nodes[id.0].length;
        match self.parent(id) {
            Some(parent) => {
                for slot in self.nodes[parent.0].children.iter_mut() {
                    if *slot == id {
                        *slot = child;
                    }
                }
                self.nodes[child.0].parent = Some(parent);
                self.nodes[child.0].length += length;
            }
            None => {
                self.nodes[child.0].parent = None;
                self.nodes[child.0].length = 0.0;
                self.root = child;
            }
        }
        self.nodes[id.0].children.clear();
        self.nodes[id.0].parent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::parse_newick;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mrca_and_leaf_counts() {
        let tree = parse_newick("((a:1,b:1):1,(c:1,d:1):1);").unwrap();
        let a = tree.find_leaf("a").unwrap();
        let b = tree.find_leaf("b").unwrap();
        let c = tree.find_leaf("c").unwrap();
        let ab = tree.mrca(&[a, b]).unwrap();
        assert_eq!(tree.leaf_names_under(ab), vec!["a", "b"]);
        assert_eq!(tree.mrca(&[a, c]), Some(tree.root()));
        assert_eq!(tree.leaf_counts()[tree.root().0], 4);
    }

    #[test]
    fn test_reroot_single_outgroup() {
        let mut tree = parse_newick("((a:1,b:1):1,(c:1,og:2):1);").unwrap();
        assert!(tree.reroot_on_outgroup(&set(&["og"])));
        let root = tree.root();
        let names: Vec<Vec<String>> = tree
            .children(root)
            .iter()
            .map(|&c| tree.leaf_names_under(c))
            .collect();
        assert!(names.contains(&vec!["og".to_string()]));
        assert_eq!(tree.leaves().len(), 4);
        let og = tree.find_leaf("og").unwrap();
        assert!((tree.node(og).length - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reroot_multiple_outgroup() {
        let mut tree = parse_newick("(a:1,(b:1,(og1:1,og2:1):1):1,c:1);").unwrap();
        assert!(tree.reroot_on_outgroup(&set(&["og1", "og2"])));
        let root = tree.root();
        let mut sides: Vec<Vec<String>> = tree
            .children(root)
            .iter()
            .map(|&c| {
                let mut n = tree.leaf_names_under(c);
                n.sort();
                n
            })
            .collect();
        sides.sort();
        assert_eq!(sides, vec![vec!["a", "b", "c"], vec!["og1", "og2"]]);
        // Every node reachable from the root knows its parent
        for id in tree.preorder() {
            for &child in tree.children(id) {
                assert_eq!(tree.parent(child), Some(id));
            }
        }
    }

    #[test]
    fn test_reroot_non_monophyletic_outgroup() {
        let mut tree = parse_newick("((a:1,og1:1):1,(b:1,og2:1):1);").unwrap();
        assert!(!tree.reroot_on_outgroup(&set(&["og1", "og2"])));
        assert_eq!(tree.leaves().len(), 4);

        // Rooted on og1 alone, every ingroup leaf on the other side
        let mut sides: Vec<Vec<String>> = tree
            .children(tree.root())
            .iter()
            .map(|&side| {
                let mut names = tree.leaf_names_under(side);
                names.sort();
                names
            })
            .collect();
        sides.sort_by_key(|names| names.len());
        assert_eq!(sides, vec![vec!["og1"], vec!["a", "b", "og2"]]);
        assert!(!tree.reroot_on_outgroup(&set(&["zz"])));
    }

    #[test]
    fn test_ladderize_is_deterministic() {
        let mut t1 = parse_newick("((c,d,e),(a,b),f);").unwrap();
        let mut t2 = parse_newick("(f,(b,a),(e,c,d));").unwrap();
        t1.ladderize(true);
        t2.ladderize(true);
        assert_eq!(t1.leaf_names(), t2.leaf_names());
        assert_eq!(t1.leaf_names(), vec!["c", "d", "e", "a", "b", "f"]);
    }

    #[test]
    fn test_contract_and_group() {
        let mut tree = parse_newick("((a:1,b:1):0,(c:1,d:1):0.5);").unwrap();
        assert_eq!(tree.contract_short_edges(0.1), 1);
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 3);

        let a = tree.find_leaf("a").unwrap();
        let b = tree.find_leaf("b").unwrap();
        let grouped = tree.group_children(root, &[a, b]);
        assert_eq!(tree.children(root).len(), 2);
        assert_eq!(tree.parent(a), Some(grouped));
        assert_eq!(tree.leaf_names(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_height() {
        let tree = parse_newick("((a:0.5,b:0.25):1,c:0.1);").unwrap();
        assert!((tree.height(tree.root()) - 1.5).abs() < 1e-9);
    }
}
