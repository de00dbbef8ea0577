//! Menu node data model.
//!
//! A [`MenuOption`] describes a node before it is placed in a tree: its
//! label, title and typed callbacks. Placing it binds a shared context and
//! erases the context type, producing a [`MenuNode`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::console::Console;
use crate::error::DiagResult;
use crate::status::Status;

/// Context shared by sibling nodes of one feature.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a value into a [`Shared`] context.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Entry or exit action. `Err` aborts the session; a non-success status
/// makes the navigator backtrack.
pub type Callback<T> = Box<dyn FnMut(&mut T, &mut dyn Console) -> DiagResult<Status>>;

/// Returns true when the node should not be offered.
pub type HiddenPredicate<T> = Box<dyn Fn(&T) -> bool>;

/// Index of a node inside its [`MenuTree`](super::MenuTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unplaced menu node with callbacks typed over its context `T`.
pub struct MenuOption<T> {
    label: String,
    title: String,
    on_entry: Option<Callback<T>>,
    on_exit: Option<Callback<T>>,
    hidden: Option<HiddenPredicate<T>>,
}

impl<T: 'static> MenuOption<T> {
    /// Option shown as `label` in its parent's listing.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            title: String::new(),
            on_entry: None,
            on_exit: None,
            hidden: None,
        }
    }

    /// Heading printed when this node becomes the current menu.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn on_entry(
        mut self,
        callback: impl FnMut(&mut T, &mut dyn Console) -> DiagResult<Status> + 'static,
    ) -> Self {
        self.on_entry = Some(Box::new(callback));
        self
    }

    pub fn on_exit(
        mut self,
        callback: impl FnMut(&mut T, &mut dyn Console) -> DiagResult<Status> + 'static,
    ) -> Self {
        self.on_exit = Some(Box::new(callback));
        self
    }

    /// Hide this node while `predicate` returns true for its context.
    pub fn hidden_when(mut self, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        self.hidden = Some(Box::new(predicate));
        self
    }

    pub(crate) fn bind(self, context: &Shared<T>) -> MenuNode {
        MenuNode {
            label: self.label,
            title: self.title,
            parent: None,
            children: Vec::new(),
            hidden: false,
            hooks: Box::new(Bound {
                on_entry: self.on_entry,
                on_exit: self.on_exit,
                hidden: self.hidden,
                context: Rc::clone(context),
            }),
        }
    }
}

/// Context-erased callbacks of a placed node.
pub(crate) trait NodeHooks {
    fn enter(&mut self, console: &mut dyn Console) -> Option<DiagResult<Status>>;
    fn exit(&mut self, console: &mut dyn Console) -> Option<DiagResult<Status>>;
    fn is_hidden(&self) -> Option<bool>;
    fn has_entry(&self) -> bool;
    fn has_exit(&self) -> bool;
    fn context_id(&self) -> usize;
}

struct Bound<T> {
    on_entry: Option<Callback<T>>,
    on_exit: Option<Callback<T>>,
    hidden: Option<HiddenPredicate<T>>,
    context: Shared<T>,
}

impl<T> NodeHooks for Bound<T> {
    fn enter(&mut self, console: &mut dyn Console) -> Option<DiagResult<Status>> {
        let callback = self.on_entry.as_mut()?;
        let mut context = self.context.borrow_mut();
        Some(callback(&mut context, console))
    }

    fn exit(&mut self, console: &mut dyn Console) -> Option<DiagResult<Status>> {
        let callback = self.on_exit.as_mut()?;
        let mut context = self.context.borrow_mut();
        Some(callback(&mut context, console))
    }

    fn is_hidden(&self) -> Option<bool> {
        let predicate = self.hidden.as_ref()?;
        Some(predicate(&self.context.borrow()))
    }

    fn has_entry(&self) -> bool {
        self.on_entry.is_some()
    }

    fn has_exit(&self) -> bool {
        self.on_exit.is_some()
    }

    fn context_id(&self) -> usize {
        Rc::as_ptr(&self.context) as *const () as usize
    }
}

/// One entry of the menu tree.
pub struct MenuNode {
    pub(crate) label: String,
    pub(crate) title: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) hidden: bool,
    pub(crate) hooks: Box<dyn NodeHooks>,
}

impl MenuNode {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in display order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Visibility computed by the last refresh of the parent menu.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn has_entry(&self) -> bool {
        self.hooks.has_entry()
    }

    pub fn has_exit(&self) -> bool {
        self.hooks.has_exit()
    }

    /// Identity of the bound context; equal for nodes sharing one context.
    pub fn context_id(&self) -> usize {
        self.hooks.context_id()
    }
}

impl fmt::Debug for MenuNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuNode")
            .field("label", &self.label)
            .field("title", &self.title)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;

    #[test]
    fn bound_callbacks_see_the_shared_context() {
        let ctx = shared(0u32);
        let mut node = MenuOption::new("bump")
            .on_entry(|count: &mut u32, _| {
                *count += 1;
                Ok(Status::SUCCESS)
            })
            .hidden_when(|count| *count > 1)
            .bind(&ctx);

        let mut console = ScriptedConsole::scripted("");
        assert_eq!(node.hooks.is_hidden(), Some(false));
        node.hooks.enter(&mut console).unwrap().unwrap();
        node.hooks.enter(&mut console).unwrap().unwrap();
        assert_eq!(*ctx.borrow(), 2);
        assert_eq!(node.hooks.is_hidden(), Some(true));
        assert!(node.hooks.exit(&mut console).is_none());
    }

    #[test]
    fn context_identity_is_shared() {
        let ctx = shared(());
        let other = shared(());
        let a = MenuOption::<()>::new("a").bind(&ctx);
        let b = MenuOption::<()>::new("b").bind(&ctx);
        let c = MenuOption::<()>::new("c").bind(&other);
        assert_eq!(a.context_id(), b.context_id());
        assert_ne!(a.context_id(), c.context_id());
    }

    #[test]
    fn node_without_predicate_reports_none() {
        let node = MenuOption::<()>::new("plain").bind(&shared(()));
        assert_eq!(node.hooks.is_hidden(), None);
        assert!(!node.has_entry());
        assert!(node.is_leaf());
    }
}
