//! Grouping of a node's children into renderable units.
//!
//! Consecutive inline children are collected into one group so they flow and wrap together.
//! Block children stand alone. A group that contains `math_inline` cannot live inside a text
//! flow, so unless the parent already is one it becomes a [`GroupKind::Row`] instead.
use crate::ast::MarkdownNode;
use crate::ast::NodeType;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderContext {
    pub depth: usize,
    /// Inside a list item: paragraphs drop their trailing gap.
    pub in_list_item: bool,
    /// The nearest container already flows text; nested groups must not open another.
    pub parent_is_text: bool,
}

impl RenderContext {
    pub fn root() -> Self {
        Self::default()
    }

    /// Context for the children of a node rendered in `self`.
    pub fn child(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }

    pub fn with_parent_is_text(self, parent_is_text: bool) -> Self {
        Self {
            parent_is_text,
            ..self
        }
    }

    pub fn with_in_list_item(self, in_list_item: bool) -> Self {
        Self {
            in_list_item,
            ..self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Members flow and word-wrap together.
    TextFlow,
    /// Members sit side by side as unbreakable boxes.
    Row,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Unit<'a> {
    Inline {
        kind: GroupKind,
        nodes: &'a [MarkdownNode],
        /// `parent_is_text` for each member's own render.
        child_parent_is_text: bool,
    },
    Block(&'a MarkdownNode),
}

/// Splits `children` into inline runs and standalone blocks, preserving order.
pub fn plan(children: &[MarkdownNode], parent_is_text: bool) -> Vec<Unit<'_>> {
    let mut units = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, child) in children.iter().enumerate() {
        if child.node_type.is_inline() {
            run_start.get_or_insert(idx);
            continue;
        }
        if let Some(start) = run_start.take() {
            units.push(inline_unit(&children[start..idx], parent_is_text));
        }
        units.push(Unit::Block(child));
    }
    if let Some(start) = run_start {
        units.push(inline_unit(&children[start..], parent_is_text));
    }
    units
}

fn inline_unit(nodes: &[MarkdownNode], parent_is_text: bool) -> Unit<'_> {
    let has_math = nodes.iter().any(|n| n.node_type == NodeType::MathInline);
    if has_math && !parent_is_text {
        Unit::Inline {
            kind: GroupKind::Row,
            nodes,
            child_parent_is_text: false,
        }
    } else {
        Unit::Inline {
            kind: GroupKind::TextFlow,
            nodes,
            child_parent_is_text: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(t: NodeType) -> MarkdownNode {
        MarkdownNode::new(t)
    }

    fn bold(text: &str) -> MarkdownNode {
        MarkdownNode::with_children(NodeType::Bold, vec![MarkdownNode::text(text)])
    }

    fn shape(units: &[Unit<'_>]) -> Vec<String> {
        units
            .iter()
            .map(|u| match u {
                Unit::Inline { kind, nodes, .. } => format!("{kind:?}x{}", nodes.len()),
                Unit::Block(n) => n.node_type.to_string(),
            })
            .collect()
    }

    #[test]
    fn inline_run_merges_into_one_text_flow() {
        let children = vec![MarkdownNode::text("a "), bold("b"), MarkdownNode::text(" c")];
        let units = plan(&children, false);
        assert_eq!(units.len(), 1);
        assert_eq!(
            units[0],
            Unit::Inline {
                kind: GroupKind::TextFlow,
                nodes: &children[..],
                child_parent_is_text: true,
            }
        );
    }

    #[test]
    fn math_switches_the_group_to_a_row() {
        let children = vec![
            MarkdownNode::text("a "),
            node(NodeType::MathInline).with_content("x^2"),
            MarkdownNode::text(" b"),
        ];
        let units = plan(&children, false);
        assert_eq!(
            units,
            vec![Unit::Inline {
                kind: GroupKind::Row,
                nodes: &children[..],
                child_parent_is_text: false,
            }]
        );
    }

    #[test]
    fn math_inside_text_parent_stays_text_flow() {
        let children = vec![node(NodeType::MathInline).with_content("x")];
        let units = plan(&children, true);
        assert!(matches!(
            units[0],
            Unit::Inline {
                kind: GroupKind::TextFlow,
                child_parent_is_text: true,
                ..
            }
        ));
    }

    #[test]
    fn blocks_split_runs_and_keep_order() {
        let children = vec![
            MarkdownNode::text("a"),
            node(NodeType::Image),
            MarkdownNode::text("b"),
            node(NodeType::MathInline),
            node(NodeType::CodeBlock),
            node(NodeType::Paragraph),
        ];
        let units = plan(&children, false);
        assert_eq!(
            shape(&units),
            vec![
                "TextFlowx1",
                "image",
                "Rowx2",
                "code_block",
                "paragraph"
            ]
        );
    }

    #[test]
    fn empty_children_plan_nothing() {
        assert!(plan(&[], false).is_empty());
    }

    #[test]
    fn only_the_math_run_loses_text_flow() {
        let children = vec![
            node(NodeType::MathInline),
            node(NodeType::MathBlock),
            MarkdownNode::text("plain"),
        ];
        let units = plan(&children, false);
        assert_eq!(shape(&units), vec!["Rowx1", "math_block", "TextFlowx1"]);
    }

    #[test]
    fn context_derivations() {
        let ctx = RenderContext::root().child().with_in_list_item(true);
        assert_eq!(ctx.depth, 1);
        assert!(ctx.in_list_item);
        assert!(!ctx.parent_is_text);
        assert!(ctx.with_parent_is_text(true).parent_is_text);
    }
}
