//! In-memory view of the classifier grouping tree.
//!
//! The codifier table is immutable reference data, so lookups load it once
//! and resolve ancestor paths and child levels without further queries.

use std::collections::HashMap;

use super::error::{Result, StatsError};
use super::models::ClassifierNode;

/// Root sentinel in `parent_id` links.
pub const ROOT_PARENT_ID: i64 = 0;

#[derive(Debug, Clone)]
pub struct ClassifierTree {
    nodes: HashMap<i64, ClassifierNode>,
    children: HashMap<i64, Vec<i64>>,
    by_code: HashMap<String, i64>,
}

impl ClassifierTree {
    pub fn new(rows: Vec<ClassifierNode>) -> Self {
        let mut nodes = HashMap::with_capacity(rows.len());
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut by_code = HashMap::with_capacity(rows.len());

        for node in rows {
            children.entry(node.parent_id).or_default().push(node.id);
            by_code.insert(node.code.clone(), node.id);
            nodes.insert(node.id, node);
        }
        for ids in children.values_mut() {
            ids.sort_unstable();
        }

        Self {
            nodes,
            children,
            by_code,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&ClassifierNode> {
        self.nodes.get(&id)
    }

    /// Node carrying a given code string. Leaf classifier codes are matched
    /// to their tree node through this lookup.
    pub fn get_by_code(&self, code: &str) -> Option<&ClassifierNode> {
        self.by_code.get(code).and_then(|id| self.nodes.get(id))
    }

    /// Top level of the tree (`parent_id == 0`).
    pub fn roots(&self) -> Vec<&ClassifierNode> {
        self.children_of(ROOT_PARENT_ID)
    }

    /// Direct children of a node, ordered by id.
    pub fn children_of(&self, parent_id: i64) -> Vec<&ClassifierNode> {
        self.children
            .get(&parent_id)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Ordered path of node ids from a root down to `id` inclusive.
    ///
    /// Walks `parent_id` links up to the root sentinel, then reverses the
    /// accumulated chain. The accumulator is local to each call; valid
    /// reference data is acyclic, so a revisited node or a dangling parent
    /// link means the table is corrupt and resolves to an error rather than
    /// a hang.
    pub fn ancestor_path(&self, id: i64) -> Result<Vec<i64>> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(&id).ok_or_else(|| StatsError::NotFound {
            what: "classifier node",
            id: id.to_string(),
        })?;

        loop {
            if path.len() > self.nodes.len() {
                return Err(StatsError::CorruptReferenceData {
                    reason: format!("cycle detected while resolving node {id}"),
                });
            }
            path.push(current.id);
            if current.is_root() {
                break;
            }
            current = self.nodes.get(&current.parent_id).ok_or_else(|| {
                StatsError::CorruptReferenceData {
                    reason: format!(
                        "node {} references missing parent {}",
                        current.id, current.parent_id
                    ),
                }
            })?;
        }

        path.reverse();
        Ok(path)
    }

    /// Ancestor paths for several nodes at once. Each path gets its own
    /// accumulator; one bad node fails the whole resolution.
    pub fn ancestor_paths(&self, ids: &[i64]) -> Result<Vec<Vec<i64>>> {
        ids.iter().map(|&id| self.ancestor_path(id)).collect()
    }

    /// Human-readable `code` chain for a resolved path, used to label report
    /// rows.
    pub fn path_codes(&self, path: &[i64]) -> Vec<String> {
        path.iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| node.code.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, code: &str, parent_id: i64) -> ClassifierNode {
        ClassifierNode {
            id,
            code: code.to_string(),
            description: format!("node {code}"),
            parent_id,
            active: true,
        }
    }

    fn sample_tree() -> ClassifierTree {
        // 1 (root) -> 2 -> 4
        //          -> 3
        // 5 (root)
        ClassifierTree::new(vec![
            node(1, "43", 0),
            node(2, "43.2", 1),
            node(3, "43.3", 1),
            node(4, "43.21", 2),
            node(5, "62", 0),
        ])
    }

    #[test]
    fn path_runs_root_to_leaf() {
        let tree = sample_tree();
        assert_eq!(tree.ancestor_path(4).unwrap(), vec![1, 2, 4]);
        assert_eq!(tree.ancestor_path(1).unwrap(), vec![1]);
    }

    #[test]
    fn independent_calls_do_not_share_accumulators() {
        let tree = sample_tree();
        let first = tree.ancestor_path(4).unwrap();
        let second = tree.ancestor_path(3).unwrap();
        assert_eq!(first, vec![1, 2, 4]);
        assert_eq!(second, vec![1, 3]);

        let batch = tree.ancestor_paths(&[4, 3, 5]).unwrap();
        assert_eq!(batch, vec![vec![1, 2, 4], vec![1, 3], vec![5]]);
    }

    #[test]
    fn unknown_node_is_not_found() {
        let tree = sample_tree();
        assert!(matches!(
            tree.ancestor_path(99),
            Err(StatsError::NotFound { .. })
        ));
    }

    #[test]
    fn dangling_parent_is_corrupt_data() {
        let tree = ClassifierTree::new(vec![node(7, "10.1", 6)]);
        assert!(matches!(
            tree.ancestor_path(7),
            Err(StatsError::CorruptReferenceData { .. })
        ));
    }

    #[test]
    fn cycle_is_corrupt_data_not_a_hang() {
        let tree = ClassifierTree::new(vec![node(1, "a", 2), node(2, "b", 1)]);
        assert!(matches!(
            tree.ancestor_path(1),
            Err(StatsError::CorruptReferenceData { .. })
        ));
    }

    #[test]
    fn children_and_roots_lookups() {
        let tree = sample_tree();
        let roots: Vec<i64> = tree.roots().iter().map(|n| n.id).collect();
        assert_eq!(roots, vec![1, 5]);

        let children: Vec<i64> = tree.children_of(1).iter().map(|n| n.id).collect();
        assert_eq!(children, vec![2, 3]);
        assert!(tree.children_of(4).is_empty());
    }

    #[test]
    fn code_lookup_finds_the_node() {
        let tree = sample_tree();
        assert_eq!(tree.get_by_code("43.21").map(|n| n.id), Some(4));
        assert!(tree.get_by_code("99.99").is_none());
    }

    #[test]
    fn path_codes_follow_the_path() {
        let tree = sample_tree();
        let path = tree.ancestor_path(4).unwrap();
        assert_eq!(tree.path_codes(&path), vec!["43", "43.2", "43.21"]);
    }
}
