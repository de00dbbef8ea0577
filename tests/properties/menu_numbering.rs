//! Property tests for option numbering under visibility changes.

use proptest::prelude::*;

use diagmenu::menu::render::menu_lines;
use diagmenu::menu::{resolve_selection, shared, MenuOption, MenuTree, Selection};

fn tree_with_mask(mask: &[bool]) -> MenuTree {
    let ctx = shared(mask.to_vec());
    let mut tree = MenuTree::new(MenuOption::new("").title("Main"), &ctx);
    let root = tree.root();
    for i in 0..mask.len() {
        tree.add_option(
            root,
            MenuOption::new(format!("option {}", i + 1))
                .hidden_when(move |mask: &Vec<bool>| mask[i]),
            &ctx,
        )
        .unwrap();
    }
    tree.refresh_visibility(root);
    tree
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: visible options keep their position as their number.
    #[test]
    fn property_numbers_follow_position(
        mask in proptest::collection::vec(any::<bool>(), 0..=40)
    ) {
        let tree = tree_with_mask(&mask);
        let lines = menu_lines(&tree, tree.root());

        let expected: Vec<String> = mask
            .iter()
            .enumerate()
            .filter(|(_, hidden)| !**hidden)
            .map(|(i, _)| format!("{n}. option {n}", n = i + 1))
            .collect();
        prop_assert_eq!(&lines[3..lines.len() - 2], expected.as_slice());
        prop_assert_eq!(lines[lines.len() - 2].as_str(), "99. Exit Menu");
    }

    /// PROPERTY: only visible option numbers select a child.
    #[test]
    fn property_hidden_options_cannot_be_selected(
        mask in proptest::collection::vec(any::<bool>(), 1..=40),
        pick in 0usize..40
    ) {
        let tree = tree_with_mask(&mask);
        let root = tree.root();
        let index = pick % mask.len();

        let selection = resolve_selection(&(index + 1).to_string(), &tree, root);
        if mask[index] {
            prop_assert_eq!(selection, Selection::Invalid);
        } else {
            prop_assert_eq!(selection, Selection::Child(tree[root].children()[index]));
        }
    }

    /// PROPERTY: arbitrary text never panics the selection parser.
    #[test]
    fn property_selection_never_panics(token in "(?s).{0,32}") {
        let tree = tree_with_mask(&[false, true, false]);
        let _ = resolve_selection(&token, &tree, tree.root());
    }
}
