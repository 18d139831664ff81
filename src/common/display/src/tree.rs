//! Tree display for workflow graphs.

use std::fmt;

/// A node in a display tree.
pub trait TreeNode {
    /// Display name of this node.
    fn name(&self) -> &str;

    /// Child nodes.
    fn children(&self) -> Vec<&dyn TreeNode>;

    /// Additional details shown after the name.
    fn details(&self) -> Option<String> {
        None
    }
}

/// Renders a [`TreeNode`] hierarchy with box-drawing connectors.
pub struct DisplayTree<'a> {
    roots: Vec<&'a dyn TreeNode>,
}

impl<'a> DisplayTree<'a> {
    /// Create a display tree with a single root.
    pub fn new(root: &'a dyn TreeNode) -> Self {
        Self { roots: vec![root] }
    }

    /// Create a display tree with several roots (a forest).
    pub fn forest(roots: Vec<&'a dyn TreeNode>) -> Self {
        Self { roots }
    }

    fn write_label(f: &mut fmt::Formatter<'_>, node: &dyn TreeNode) -> fmt::Result {
        write!(f, "{}", node.name())?;
        if let Some(details) = node.details() {
            write!(f, " ({details})")?;
        }
        writeln!(f)
    }

    fn fmt_node(
        f: &mut fmt::Formatter<'_>,
        node: &dyn TreeNode,
        prefix: &str,
        is_last: bool,
    ) -> fmt::Result {
        let connector = if is_last { "└─ " } else { "├─ " };
        write!(f, "{prefix}{connector}")?;
        Self::write_label(f, node)?;

        let children = node.children();
        let child_prefix = format!("{prefix}{}", if is_last { "   " } else { "│  " });
        for (i, child) in children.iter().enumerate() {
            Self::fmt_node(f, *child, &child_prefix, i == children.len() - 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for DisplayTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in &self.roots {
            Self::write_label(f, *root)?;
            let children = root.children();
            for (i, child) in children.iter().enumerate() {
                Self::fmt_node(f, *child, "", i == children.len() - 1)?;
            }
        }
        Ok(())
    }
}
