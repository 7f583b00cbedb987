//! Property tests for classifier ancestor-path resolution.

use proptest::prelude::*;

use statpipe::stats::codifier::ClassifierTree;
use statpipe::stats::models::ClassifierNode;

fn node(id: i64, parent_id: i64) -> ClassifierNode {
    ClassifierNode {
        id,
        code: format!("{id}"),
        description: format!("node {id}"),
        parent_id,
        active: true,
    }
}

/// Random acyclic forest: node i+1 is either a root or a child of some
/// earlier node, so parent links always point backwards.
fn acyclic_forest() -> impl Strategy<Value = Vec<ClassifierNode>> {
    prop::collection::vec(prop::option::of(any::<prop::sample::Index>()), 1..60).prop_map(
        |choices| {
            choices
                .into_iter()
                .enumerate()
                .map(|(i, choice)| {
                    let id = (i + 1) as i64;
                    let parent_id = match choice {
                        Some(index) if i > 0 => (index.index(i) + 1) as i64,
                        _ => 0,
                    };
                    node(id, parent_id)
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn paths_start_at_a_root_and_end_at_the_leaf(nodes in acyclic_forest()) {
        let count = nodes.len() as i64;
        let tree = ClassifierTree::new(nodes);

        for id in 1..=count {
            let path = tree.ancestor_path(id).unwrap();

            prop_assert_eq!(*path.last().unwrap(), id);
            let first = tree.get(path[0]).unwrap();
            prop_assert_eq!(first.parent_id, 0);

            // Each step follows a parent link
            for pair in path.windows(2) {
                let child = tree.get(pair[1]).unwrap();
                prop_assert_eq!(child.parent_id, pair[0]);
            }
        }
    }

    #[test]
    fn batch_resolution_matches_individual_calls(nodes in acyclic_forest()) {
        let count = nodes.len() as i64;
        let tree = ClassifierTree::new(nodes);
        let ids: Vec<i64> = (1..=count).collect();

        let batch = tree.ancestor_paths(&ids).unwrap();
        for (i, id) in ids.iter().enumerate() {
            prop_assert_eq!(&batch[i], &tree.ancestor_path(*id).unwrap());
        }
    }

    #[test]
    fn every_node_is_reachable_from_its_root_children_lists(nodes in acyclic_forest()) {
        let count = nodes.len() as i64;
        let tree = ClassifierTree::new(nodes);

        for id in 1..=count {
            let path = tree.ancestor_path(id).unwrap();
            for pair in path.windows(2) {
                let children: Vec<i64> =
                    tree.children_of(pair[0]).iter().map(|n| n.id).collect();
                prop_assert!(children.contains(&pair[1]));
            }
        }
    }
}
