//! Run loop that walks the menu tree.
//!
//! Starting at the root, each step runs the current node's entry callback,
//! then either pops back to the parent (leaf node or failed entry) or
//! shows the menu and waits for a selection. Leaving the root ends the loop.

use log::debug;

use super::node::NodeId;
use super::render::{menu_lines, write_lines};
use super::tree::MenuTree;
use super::{option_index, EXIT_MENU_OPTION};
use crate::console::{parse_option, Console};
use crate::error::DiagResult;
use crate::status::Status;

/// Meaning of one line typed at a menu prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Descend into this visible child
    Child(NodeId),
    /// Leave the current menu
    Exit,
    /// Not a number, out of range, or a hidden child
    Invalid,
}

/// Map a typed token to a [`Selection`] of `current`'s children.
///
/// Only the leading digits count, so "2abc" selects option 2.
pub fn resolve_selection(token: &str, tree: &MenuTree, current: NodeId) -> Selection {
    let Some(choice) = parse_option(token) else {
        return Selection::Invalid;
    };
    if choice == EXIT_MENU_OPTION {
        return Selection::Exit;
    }

    let children = tree[current].children();
    match option_index(choice).and_then(|i| children.get(i)) {
        Some(&child) if !tree[child].is_hidden() => Selection::Child(child),
        _ => Selection::Invalid,
    }
}

/// Depth-first, backtracking walk over a [`MenuTree`].
pub struct Navigator<'a> {
    tree: &'a mut MenuTree,
    current: Option<NodeId>,
    status: Status,
}

impl<'a> Navigator<'a> {
    pub fn new(tree: &'a mut MenuTree) -> Self {
        let root = tree.root();
        Self {
            tree,
            current: Some(root),
            status: Status::SUCCESS,
        }
    }

    /// Drive the session until the operator exits the root menu.
    ///
    /// Returns the status of the most recent entry or exit callback, or
    /// success if none ran. Console failures end the loop with an error.
    pub fn run(mut self, console: &mut dyn Console) -> DiagResult<Status> {
        while let Some(id) = self.current {
            self.current = self.visit(id, console)?;
        }
        debug!("menu session finished with status {}", self.status);
        Ok(self.status)
    }

    /// Handle one arrival at `id` and return the next node.
    fn visit(&mut self, id: NodeId, console: &mut dyn Console) -> DiagResult<Option<NodeId>> {
        let parent = self.tree[id].parent();
        debug!("entering menu node {} '{}'", id, self.tree[id].label());

        if let Some(result) = self.tree.node_mut(id).hooks.enter(console) {
            self.status = result?;
            if !self.status.is_success() {
                debug!("entry of node {} failed with {}, backtracking", id, self.status);
                return Ok(parent);
            }
        }

        if self.tree[id].is_leaf() {
            return Ok(parent);
        }

        loop {
            self.tree.refresh_visibility(id);
            write_lines(console, &menu_lines(self.tree, id))?;
            write!(console, "Enter option: ")?;
            let line = console.read_line()?;

            match resolve_selection(&line, self.tree, id) {
                Selection::Child(child) => return Ok(Some(child)),
                Selection::Exit => {
                    if let Some(result) = self.tree.node_mut(id).hooks.exit(console) {
                        self.status = result?;
                    }
                    debug!("leaving menu node {}", id);
                    return Ok(parent);
                }
                Selection::Invalid => {
                    debug!("rejected selection {:?} at node {}", line, id);
                    writeln!(console, "Invalid option")?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;
    use crate::error::DiagError;
    use crate::menu::{shared, MenuOption};

    fn tree_with_leaves(statuses: &[u32]) -> MenuTree {
        let ctx = shared(());
        let mut tree = MenuTree::new(MenuOption::new("").title("Main"), &ctx);
        let root = tree.root();
        for (i, code) in statuses.iter().copied().enumerate() {
            tree.add_option(
                root,
                MenuOption::new(format!("leaf {}", i + 1))
                    .on_entry(move |_: &mut (), _| Ok(Status(code))),
                &ctx,
            )
            .unwrap();
        }
        tree
    }

    #[test]
    fn resolve_rejects_zero_and_out_of_range() {
        let tree = tree_with_leaves(&[0, 0]);
        let root = tree.root();
        assert_eq!(resolve_selection("0", &tree, root), Selection::Invalid);
        assert_eq!(resolve_selection("3", &tree, root), Selection::Invalid);
        assert_eq!(resolve_selection("x", &tree, root), Selection::Invalid);
        assert_eq!(resolve_selection(" 99 ", &tree, root), Selection::Exit);
        assert_eq!(
            resolve_selection("2", &tree, root),
            Selection::Child(tree[root].children()[1])
        );
    }

    #[test]
    fn resolve_reads_leading_digits() {
        let tree = tree_with_leaves(&[0, 0]);
        let root = tree.root();
        let second = Selection::Child(tree[root].children()[1]);
        assert_eq!(resolve_selection("2abc", &tree, root), second);
        assert_eq!(resolve_selection(" 2 3\n", &tree, root), second);
        assert_eq!(resolve_selection("99x", &tree, root), Selection::Exit);
        assert_eq!(resolve_selection("abc2", &tree, root), Selection::Invalid);
        assert_eq!(resolve_selection("-1", &tree, root), Selection::Invalid);
    }

    #[test]
    fn ninety_ninth_child_is_numbered_past_exit() {
        let tree = tree_with_leaves(&[0; 100]);
        let root = tree.root();
        let children = tree[root].children();
        let lines = menu_lines(&tree, root);
        assert!(lines.contains(&"98. leaf 98".to_string()));
        assert!(lines.contains(&"100. leaf 99".to_string()));
        assert!(lines.contains(&"101. leaf 100".to_string()));
        assert_eq!(lines.iter().filter(|l| l.starts_with("99. ")).count(), 1);
        assert_eq!(resolve_selection("99", &tree, root), Selection::Exit);
        assert_eq!(
            resolve_selection("100", &tree, root),
            Selection::Child(children[98])
        );
    }

    #[test]
    fn exit_at_root_terminates_with_success() {
        let mut tree = tree_with_leaves(&[0]);
        let mut console = ScriptedConsole::scripted("99\n");
        let status = Navigator::new(&mut tree).run(&mut console).unwrap();
        assert_eq!(status, Status::SUCCESS);
        assert_eq!(
            console.output(),
            "\nMain\n----\n1. leaf 1\n99. Exit Menu\n\nEnter option: "
        );
    }

    #[test]
    fn childless_root_terminates_without_prompting() {
        let mut tree = tree_with_leaves(&[]);
        let mut console = ScriptedConsole::scripted("");
        let status = Navigator::new(&mut tree).run(&mut console).unwrap();
        assert_eq!(status, Status::SUCCESS);
        assert!(console.output().is_empty());
    }

    #[test]
    fn invalid_input_rerenders_same_menu() {
        let mut tree = tree_with_leaves(&[0]);
        let mut console = ScriptedConsole::scripted("7\n99\n");
        Navigator::new(&mut tree).run(&mut console).unwrap();
        let out = console.output();
        assert_eq!(out.matches("1. leaf 1").count(), 2);
        assert!(out.contains("Invalid option\n"));
    }

    #[test]
    fn closed_input_aborts_the_loop() {
        let mut tree = tree_with_leaves(&[0]);
        let mut console = ScriptedConsole::scripted("1\n");
        let err = Navigator::new(&mut tree).run(&mut console).unwrap_err();
        assert!(matches!(err, DiagError::InputClosed));
    }

    #[test]
    fn callback_error_propagates() {
        let ctx = shared(());
        let mut tree = MenuTree::new(
            MenuOption::new("").on_entry(|_: &mut (), _| Err(DiagError::InputClosed)),
            &ctx,
        );
        let mut console = ScriptedConsole::scripted("");
        assert!(Navigator::new(&mut tree).run(&mut console).is_err());
    }
}
