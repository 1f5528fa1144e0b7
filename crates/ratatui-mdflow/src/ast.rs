//! The Markdown AST exchanged between a [`crate::parser::Parser`] and the renderer.
//!
//! The JSON form of [`MarkdownNode`] (`{"type": "paragraph", "children": [...]}`) is the wire
//! contract between parser and renderer: node kind names, field names (`isHeader`), and the
//! omission of absent fields must stay stable.
//!
//! Trees are immutable once built. Every change to the source text produces a fresh tree.
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ParseError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Document,
    Heading,
    Paragraph,
    Text,
    Bold,
    Italic,
    Strikethrough,
    Link,
    Image,
    CodeInline,
    CodeBlock,
    Blockquote,
    HorizontalRule,
    LineBreak,
    SoftBreak,
    Table,
    TableHead,
    TableBody,
    TableRow,
    TableCell,
    List,
    ListItem,
    TaskListItem,
    MathInline,
    MathBlock,
    HtmlBlock,
    HtmlInline,
}

impl NodeType {
    pub const ALL: [NodeType; 27] = [
        NodeType::Document,
        NodeType::Heading,
        NodeType::Paragraph,
        NodeType::Text,
        NodeType::Bold,
        NodeType::Italic,
        NodeType::Strikethrough,
        NodeType::Link,
        NodeType::Image,
        NodeType::CodeInline,
        NodeType::CodeBlock,
        NodeType::Blockquote,
        NodeType::HorizontalRule,
        NodeType::LineBreak,
        NodeType::SoftBreak,
        NodeType::Table,
        NodeType::TableHead,
        NodeType::TableBody,
        NodeType::TableRow,
        NodeType::TableCell,
        NodeType::List,
        NodeType::ListItem,
        NodeType::TaskListItem,
        NodeType::MathInline,
        NodeType::MathBlock,
        NodeType::HtmlBlock,
        NodeType::HtmlInline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Document => "document",
            NodeType::Heading => "heading",
            NodeType::Paragraph => "paragraph",
            NodeType::Text => "text",
            NodeType::Bold => "bold",
            NodeType::Italic => "italic",
            NodeType::Strikethrough => "strikethrough",
            NodeType::Link => "link",
            NodeType::Image => "image",
            NodeType::CodeInline => "code_inline",
            NodeType::CodeBlock => "code_block",
            NodeType::Blockquote => "blockquote",
            NodeType::HorizontalRule => "horizontal_rule",
            NodeType::LineBreak => "line_break",
            NodeType::SoftBreak => "soft_break",
            NodeType::Table => "table",
            NodeType::TableHead => "table_head",
            NodeType::TableBody => "table_body",
            NodeType::TableRow => "table_row",
            NodeType::TableCell => "table_cell",
            NodeType::List => "list",
            NodeType::ListItem => "list_item",
            NodeType::TaskListItem => "task_list_item",
            NodeType::MathInline => "math_inline",
            NodeType::MathBlock => "math_block",
            NodeType::HtmlBlock => "html_block",
            NodeType::HtmlInline => "html_inline",
        }
    }

    /// Inline kinds flow and wrap together with their siblings; everything else is a block.
    pub fn is_inline(self) -> bool {
        matches!(
            self,
            NodeType::Text
                | NodeType::Bold
                | NodeType::Italic
                | NodeType::Strikethrough
                | NodeType::Link
                | NodeType::CodeInline
                | NodeType::MathInline
                | NodeType::SoftBreak
                | NodeType::LineBreak
                | NodeType::HtmlInline
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownNodeType(pub String);

impl fmt::Display for UnknownNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown markdown node type `{}`", self.0)
    }
}

impl std::error::Error for UnknownNodeType {}

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownNodeType(s.to_string()))
    }
}

/// Horizontal alignment of a table column. An absent alignment renders as left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownNode {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<CellAlign>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MarkdownNode>,
}

impl MarkdownNode {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            content: None,
            level: None,
            href: None,
            title: None,
            alt: None,
            language: None,
            ordered: None,
            start: None,
            checked: None,
            is_header: None,
            align: None,
            children: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeType::Text).with_content(content)
    }

    pub fn with_children(node_type: NodeType, children: Vec<MarkdownNode>) -> Self {
        Self {
            children,
            ..Self::new(node_type)
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn with_align(mut self, align: CellAlign) -> Self {
        self.align = Some(align);
        self
    }

    pub fn with_header(mut self, is_header: bool) -> Self {
        self.is_header = Some(is_header);
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    /// Leaf `content` when present and non-empty, otherwise the concatenated text of the
    /// children in order.
    pub fn text_content(&self) -> String {
        if let Some(content) = self.content.as_deref()
            && !content.is_empty()
        {
            return content.to_string();
        }
        let mut out = String::new();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }

    pub fn find_child(&self, node_type: NodeType) -> Option<&MarkdownNode> {
        self.children.iter().find(|c| c.node_type == node_type)
    }

    pub fn to_json(&self) -> String {
        // Only string keys and plain values: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(json)?)
    }
}
