//! Property tests for parent/child links of randomly shaped trees.

use proptest::prelude::*;

use diagmenu::menu::{shared, MenuOption, MenuTree, NodeId};

/// Tree where node `i` hangs under one of the nodes created before it.
fn random_tree(parents: &[usize]) -> (MenuTree, Vec<NodeId>) {
    let ctx = shared(());
    let mut tree = MenuTree::new(MenuOption::new("").title("Main"), &ctx);
    let mut ids = vec![tree.root()];
    for (i, pick) in parents.iter().enumerate() {
        let id = tree.create_node(MenuOption::new(format!("node {}", i + 1)), &ctx);
        tree.add_child(ids[pick % ids.len()], id).unwrap();
        ids.push(id);
    }
    (tree, ids)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: every child names its parent, and every non-root node is
    /// listed exactly once by that parent.
    #[test]
    fn property_links_round_trip(
        parents in proptest::collection::vec(any::<usize>(), 0..60)
    ) {
        let (tree, ids) = random_tree(&parents);
        let root = tree.root();
        prop_assert_eq!(tree[root].parent(), None);

        for &id in &ids {
            for &child in tree[id].children() {
                prop_assert_eq!(tree[child].parent(), Some(id));
            }
            if let Some(parent) = tree[id].parent() {
                let listed = tree[parent].children().iter().filter(|c| **c == id).count();
                prop_assert_eq!(listed, 1);
                prop_assert_eq!(tree.depth(id), tree.depth(parent) + 1);
            }
            prop_assert_eq!(tree.ancestors(id).last(), Some(root));
        }
    }

    /// PROPERTY: a second link for an attached node is refused and leaves
    /// the tree unchanged.
    #[test]
    fn property_relinking_is_rejected(
        parents in proptest::collection::vec(any::<usize>(), 1..60),
        node in any::<usize>(),
        target in any::<usize>()
    ) {
        let (mut tree, ids) = random_tree(&parents);
        let child = ids[1 + node % (ids.len() - 1)];
        let parent = ids[target % ids.len()];
        let before = tree[child].parent();

        prop_assert!(tree.add_child(parent, child).is_err());
        prop_assert_eq!(tree[child].parent(), before);
        let total: usize = ids.iter().map(|id| tree[*id].children().len()).sum();
        prop_assert_eq!(total, ids.len() - 1);
    }
}
