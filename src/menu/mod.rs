//! Hierarchical menu engine
//!
//! A static tree of menu nodes, each with optional entry/exit callbacks, a
//! visibility predicate and a context shared with its siblings. The
//! [`Navigator`] walks the tree from the root, driven by operator input.
//!
//! # Module Structure
//!
//! - `node` - MenuOption builder, MenuNode and shared contexts
//! - `tree` - MenuTree arena and construction API
//! - `visibility` - hidden predicate re-evaluation before each listing
//! - `render` - pure rendering of menu listings
//! - `navigator` - the run loop state machine

mod navigator;
mod node;
pub mod render;
mod tree;
mod visibility;

pub use navigator::{resolve_selection, Navigator, Selection};
pub use node::{shared, Callback, HiddenPredicate, MenuNode, MenuOption, NodeId, Shared};
pub use tree::MenuTree;

/// Option number that leaves the current menu.
pub const EXIT_MENU_OPTION: u32 = 99;

/// Option number of the child at `index`. Numbering skips
/// [`EXIT_MENU_OPTION`], so a 99th child is listed as 100.
pub fn option_number(index: usize) -> u32 {
    let number = index as u32 + 1;
    if number >= EXIT_MENU_OPTION {
        number + 1
    } else {
        number
    }
}

/// Child index selected by option `number`; the inverse of [`option_number`].
pub fn option_index(number: u32) -> Option<usize> {
    match number {
        0 | EXIT_MENU_OPTION => None,
        n if n > EXIT_MENU_OPTION => Some(n as usize - 2),
        n => Some(n as usize - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_skips_the_exit_option() {
        assert_eq!(option_number(0), 1);
        assert_eq!(option_number(97), 98);
        assert_eq!(option_number(98), 100);
        assert_eq!(option_index(98), Some(97));
        assert_eq!(option_index(99), None);
        assert_eq!(option_index(100), Some(98));
        assert_eq!(option_index(0), None);
        for index in 0..200 {
            assert_eq!(option_index(option_number(index)), Some(index));
        }
    }
}
