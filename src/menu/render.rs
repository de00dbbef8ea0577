//! Menu listing rendering.
//!
//! Rendering is a pure function of the tree so listings can be asserted on
//! without a console.

use unicode_width::UnicodeWidthStr;

use super::node::NodeId;
use super::tree::MenuTree;
use super::EXIT_MENU_OPTION;
use crate::console::Console;
use crate::error::DiagResult;

/// Lines printed when `id` becomes the current menu.
///
/// Uses the visibility computed by the last
/// [`refresh_visibility`](MenuTree::refresh_visibility).
pub fn menu_lines(tree: &MenuTree, id: NodeId) -> Vec<String> {
    let node = &tree[id];
    let mut lines = Vec::with_capacity(node.children().len() + 5);

    if !node.title().is_empty() {
        lines.push(String::new());
        lines.push(node.title().to_string());
        lines.push(title_separator(node.title()));
    }

    for (number, child) in tree.visible_children(id) {
        lines.push(format!("{}. {}", number, tree[child].label()));
    }
    lines.push(format!("{}. Exit Menu", EXIT_MENU_OPTION));
    lines.push(String::new());
    lines
}

/// Dashes matching the display width of `title`.
pub fn title_separator(title: &str) -> String {
    "-".repeat(UnicodeWidthStr::width(title))
}

pub fn write_lines(console: &mut dyn Console, lines: &[String]) -> DiagResult<()> {
    for line in lines {
        writeln!(console, "{}", line)?;
    }
    Ok(())
}
