//! The visual tree produced by [`crate::renderer::MarkdownRenderer`] and laid out by
//! [`crate::layout`].
use ratatui::text::Line;

use crate::ast::CellAlign;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Bold,
    Italic,
    Strikethrough,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakKind {
    /// Renders as a space inside a text flow.
    Soft,
    Hard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListMarker {
    Bullet,
    Ordered(u64),
    Task { checked: bool },
}

impl ListMarker {
    pub fn symbol(self) -> String {
        match self {
            ListMarker::Bullet => "•".to_string(),
            ListMarker::Ordered(n) => format!("{n}."),
            ListMarker::Task { checked: true } => "☑".to_string(),
            ListMarker::Task { checked: false } => "☐".to_string(),
        }
    }
}

/// Header and body cells of a table, already rendered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableElement {
    /// One entry per column, taken from the header cells.
    pub alignments: Vec<CellAlign>,
    pub header: Vec<Element>,
    pub rows: Vec<Vec<Element>>,
}

impl TableElement {
    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    pub fn align(&self, col: usize) -> CellAlign {
        self.alignments.get(col).copied().unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Empty,
    /// Visible placeholder for content that could not be produced.
    Error(String),
    Document(Vec<Element>),
    TextFlow(Vec<Element>),
    Row(Vec<Element>),
    Fragment(Vec<Element>),
    Text {
        content: String,
        /// Rendered outside any text flow.
        plain_context: bool,
    },
    Span {
        kind: SpanKind,
        children: Vec<Element>,
    },
    Link {
        href: Option<String>,
        title: Option<String>,
        children: Vec<Element>,
    },
    InlineCode(String),
    Break(BreakKind),
    Heading {
        level: u8,
        children: Vec<Element>,
    },
    Paragraph {
        in_list_item: bool,
        children: Vec<Element>,
    },
    Blockquote(Vec<Element>),
    List {
        ordered: bool,
        start: u64,
        depth: usize,
        items: Vec<Element>,
    },
    ListItem {
        marker: ListMarker,
        children: Vec<Element>,
    },
    CodeBlock {
        language: Option<String>,
        content: String,
    },
    Rule,
    MathInline(String),
    MathBlock(String),
    Image {
        url: Option<String>,
        title: Option<String>,
        alt: Option<String>,
        /// Alt text rendered as Markdown when it contains markup.
        alt_children: Vec<Element>,
    },
    Html {
        content: String,
        block: bool,
    },
    Table(TableElement),
    /// Pre-drawn output, typically from an override.
    Lines(Vec<Line<'static>>),
}

impl Element {
    pub fn text(content: impl Into<String>) -> Self {
        Element::Text {
            content: content.into(),
            plain_context: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Element::Empty)
    }

    pub fn children(&self) -> &[Element] {
        match self {
            Element::Document(c)
            | Element::TextFlow(c)
            | Element::Row(c)
            | Element::Fragment(c)
            | Element::Blockquote(c)
            | Element::Span { children: c, .. }
            | Element::Link { children: c, .. }
            | Element::Heading { children: c, .. }
            | Element::Paragraph { children: c, .. }
            | Element::ListItem { children: c, .. } => c,
            Element::List { items, .. } => items,
            Element::Image { alt_children, .. } => alt_children,
            _ => &[],
        }
    }

    /// Reading-order text, with breaks as spaces.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.push_plain_text(&mut out);
        out
    }

    fn push_plain_text(&self, out: &mut String) {
        match self {
            Element::Text { content, .. }
            | Element::InlineCode(content)
            | Element::MathInline(content)
            | Element::MathBlock(content)
            | Element::CodeBlock { content, .. }
            | Element::Html { content, .. }
            | Element::Error(content) => out.push_str(content),
            Element::Break(_) => out.push(' '),
            Element::Image {
                alt, alt_children, ..
            } => {
                if alt_children.is_empty() {
                    out.push_str(alt.as_deref().unwrap_or_default());
                } else {
                    for c in alt_children {
                        c.push_plain_text(out);
                    }
                }
            }
            Element::Table(table) => {
                for cell in table.header.iter().chain(table.rows.iter().flatten()) {
                    cell.push_plain_text(out);
                }
            }
            Element::Lines(lines) => {
                for line in lines {
                    for span in &line.spans {
                        out.push_str(&span.content);
                    }
                }
            }
            _ => {
                for c in self.children() {
                    c.push_plain_text(out);
                }
            }
        }
    }
}
