//! Visibility resolution for menu listings.

use super::node::NodeId;
use super::option_number;
use super::tree::MenuTree;

impl MenuTree {
    /// Re-evaluate the hidden predicate of each direct child of `id`.
    ///
    /// Children without a predicate keep their current (visible) state.
    pub fn refresh_visibility(&mut self, id: NodeId) {
        for index in 0..self[id].children.len() {
            let child = self[id].children[index];
            let node = self.node_mut(child);
            if let Some(hidden) = node.hooks.is_hidden() {
                node.hidden = hidden;
            }
        }
    }

    /// Visible children of `id` with their 1-based option numbers.
    ///
    /// Numbers follow the position in the full child list, so hiding a
    /// child leaves a gap instead of renumbering its later siblings. The
    /// exit number 99 is never given to a child.
    pub fn visible_children(&self, id: NodeId) -> impl Iterator<Item = (u32, NodeId)> + '_ {
        self[id]
            .children
            .iter()
            .enumerate()
            .filter(|(_, child)| !self[**child].hidden)
            .map(|(index, child)| (option_number(index), *child))
    }
}
