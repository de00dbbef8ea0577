//! Arena-backed menu tree and its construction API.

use std::ops::Index;

use log::warn;

use super::node::{MenuNode, MenuOption, NodeId, Shared};
use super::EXIT_MENU_OPTION;
use crate::error::{DiagError, DiagResult};

/// Rooted tree of menu nodes.
///
/// Nodes are owned by the arena and addressed by [`NodeId`]. Parent links
/// are plain ids, so back-edges never own anything.
#[derive(Debug)]
pub struct MenuTree {
    nodes: Vec<MenuNode>,
    root: NodeId,
}

impl MenuTree {
    /// Create a tree holding only `root`, bound to `context`.
    pub fn new<T: 'static>(root: MenuOption<T>, context: &Shared<T>) -> Self {
        Self {
            nodes: vec![root.bind(context)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&MenuNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut MenuNode {
        &mut self.nodes[id.0]
    }

    /// All node ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Place `option` in the arena, detached, bound to `context`.
    pub fn create_node<T: 'static>(&mut self, option: MenuOption<T>, context: &Shared<T>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(option.bind(context));
        id
    }

    /// Append `child` to `parent`'s children.
    ///
    /// There is no fan-out limit. Links that would break the rooted, acyclic
    /// shape are rejected: unknown ids, attaching the root, re-parenting an
    /// attached node, or attaching an ancestor of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> DiagResult<()> {
        let reject = |reason| DiagError::InvalidTreeLink {
            parent,
            child,
            reason,
        };

        if parent.0 >= self.nodes.len() || child.0 >= self.nodes.len() {
            return Err(reject("unknown node"));
        }
        if child == self.root {
            return Err(reject("the root cannot have a parent"));
        }
        if self.nodes[child.0].parent.is_some() {
            return Err(reject("node already has a parent"));
        }
        if self.ancestors(parent).any(|id| id == child) {
            return Err(reject("link would create a cycle"));
        }

        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        if self.nodes[parent.0].children.len() == EXIT_MENU_OPTION as usize {
            warn!(
                "menu node {} has {} options; numbering skips {}",
                parent, EXIT_MENU_OPTION, EXIT_MENU_OPTION
            );
        }
        Ok(())
    }

    /// Create and attach one child in a single step.
    pub fn add_option<T: 'static>(
        &mut self,
        parent: NodeId,
        option: MenuOption<T>,
        context: &Shared<T>,
    ) -> DiagResult<NodeId> {
        let id = self.create_node(option, context);
        self.add_child(parent, id)?;
        Ok(id)
    }

    /// Attach a group of siblings under `parent`, all sharing `context`.
    ///
    /// Returns the new ids in display order.
    pub fn attach_siblings<T: 'static>(
        &mut self,
        parent: NodeId,
        options: impl IntoIterator<Item = MenuOption<T>>,
        context: &Shared<T>,
    ) -> DiagResult<Vec<NodeId>> {
        options
            .into_iter()
            .map(|option| self.add_option(parent, option, context))
            .collect()
    }

    /// `id` itself followed by each ancestor up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| {
            self.nodes.get(current.0).and_then(|node| node.parent)
        })
    }

    /// Number of edges between `id` and the root.
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count() - 1
    }
}

impl Index<NodeId> for MenuTree {
    type Output = MenuNode;

    fn index(&self, id: NodeId) -> &MenuNode {
        &self.nodes[id.0]
    }
}
