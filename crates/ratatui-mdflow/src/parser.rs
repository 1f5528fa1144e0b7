//! Source text → [`MarkdownNode`] tree.
//!
//! [`Parser`] is the seam: renderers and views receive one as an `Arc<dyn Parser>` and never
//! reach for a global instance. [`PulldownParser`] is the default implementation.
use pulldown_cmark::Alignment;
use pulldown_cmark::CodeBlockKind;
use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::HeadingLevel;
use pulldown_cmark::Options;
use pulldown_cmark::Tag;
use serde::Deserialize;
use serde::Serialize;

use crate::ast::CellAlign;
use crate::ast::MarkdownNode;
use crate::ast::NodeType;
use crate::error::ParseError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Tables, strikethrough and task lists.
    pub gfm: bool,
    /// `$inline$` and `$$display$$` math.
    pub math: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            gfm: true,
            math: true,
        }
    }
}

pub trait Parser: Send + Sync {
    fn parse_with_options(
        &self,
        text: &str,
        options: &ParserOptions,
    ) -> Result<MarkdownNode, ParseError>;

    fn parse(&self, text: &str) -> Result<MarkdownNode, ParseError> {
        self.parse_with_options(text, &ParserOptions::default())
    }
}

/// CommonMark parser backed by `pulldown-cmark`.
#[derive(Clone, Debug, Default)]
pub struct PulldownParser {
    max_input_bytes: Option<usize>,
}

impl PulldownParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects inputs larger than `limit` bytes with [`ParseError::InputTooLarge`].
    pub fn with_max_input_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_input_bytes = limit;
        self
    }
}

impl Parser for PulldownParser {
    fn parse_with_options(
        &self,
        text: &str,
        options: &ParserOptions,
    ) -> Result<MarkdownNode, ParseError> {
        if let Some(limit) = self.max_input_bytes
            && text.len() > limit
        {
            return Err(ParseError::InputTooLarge {
                len: text.len(),
                limit,
            });
        }

        let mut flags = Options::empty();
        if options.gfm {
            flags.insert(Options::ENABLE_TABLES);
            flags.insert(Options::ENABLE_STRIKETHROUGH);
            flags.insert(Options::ENABLE_TASKLISTS);
        }
        if options.math {
            flags.insert(Options::ENABLE_MATH);
        }

        let mut builder = TreeBuilder::new();
        for event in pulldown_cmark::Parser::new_ext(text, flags) {
            builder.event(event);
        }
        builder.finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    /// Maps to a node in the output tree.
    Node,
    /// Structure the event stream leaves implicit (table head row, table body).
    Implicit,
    /// A container with no node kind; children are adopted by the parent.
    Transparent,
}

struct Frame {
    node: MarkdownNode,
    kind: FrameKind,
}

#[derive(Default)]
struct TableCursor {
    aligns: Vec<Alignment>,
    in_head: bool,
    col: usize,
}

struct TreeBuilder {
    stack: Vec<Frame>,
    text: String,
    tables: Vec<TableCursor>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![Frame {
                node: MarkdownNode::new(NodeType::Document),
                kind: FrameKind::Node,
            }],
            text: String::new(),
            tables: Vec::new(),
        }
    }

    fn top(&mut self) -> &mut MarkdownNode {
        // The document frame is never popped by `end`.
        let last = self.stack.len() - 1;
        &mut self.stack[last].node
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let top = self.top();
        if matches!(top.node_type, NodeType::CodeBlock | NodeType::HtmlBlock) {
            top.content.get_or_insert_with(String::new).push_str(&text);
        } else {
            top.children.push(MarkdownNode::text(text));
        }
    }

    fn add_leaf(&mut self, node: MarkdownNode) {
        self.flush_text();
        self.top().children.push(node);
    }

    fn push(&mut self, node: MarkdownNode, kind: FrameKind) {
        self.flush_text();
        self.stack.push(Frame { node, kind });
    }

    fn pop_one(&mut self) {
        self.flush_text();
        if self.stack.len() <= 1 {
            return;
        }
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let mut node = frame.node;
        match frame.kind {
            FrameKind::Transparent => {
                self.top().children.extend(node.children);
            }
            FrameKind::Node | FrameKind::Implicit => {
                if node.node_type == NodeType::Image {
                    let alt = node.text_content();
                    node.children.clear();
                    if !alt.is_empty() {
                        node.alt = Some(alt);
                    }
                }
                if node.node_type == NodeType::Table {
                    self.tables.pop();
                }
                self.top().children.push(node);
            }
        }
    }

    fn end(&mut self) {
        while self
            .stack
            .last()
            .is_some_and(|f| f.kind == FrameKind::Implicit)
        {
            self.pop_one();
        }
        self.pop_one();
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.push(MarkdownNode::new(NodeType::Paragraph), FrameKind::Node),
            Tag::Heading { level, .. } => self.push(
                MarkdownNode::new(NodeType::Heading).with_level(heading_level(level)),
                FrameKind::Node,
            ),
            Tag::BlockQuote(_) => {
                self.push(MarkdownNode::new(NodeType::Blockquote), FrameKind::Node)
            }
            Tag::CodeBlock(kind) => {
                let mut node = MarkdownNode::new(NodeType::CodeBlock);
                if let CodeBlockKind::Fenced(info) = kind {
                    node.language = fence_language(&info);
                }
                self.push(node, FrameKind::Node);
            }
            Tag::HtmlBlock => self.push(MarkdownNode::new(NodeType::HtmlBlock), FrameKind::Node),
            Tag::List(start) => {
                let mut node = MarkdownNode::new(NodeType::List);
                node.ordered = Some(start.is_some());
                node.start = start;
                self.push(node, FrameKind::Node);
            }
            Tag::Item => self.push(MarkdownNode::new(NodeType::ListItem), FrameKind::Node),
            Tag::Table(aligns) => {
                self.tables.push(TableCursor {
                    aligns,
                    ..TableCursor::default()
                });
                self.push(MarkdownNode::new(NodeType::Table), FrameKind::Node);
            }
            Tag::TableHead => {
                if let Some(t) = self.tables.last_mut() {
                    t.in_head = true;
                    t.col = 0;
                }
                self.push(MarkdownNode::new(NodeType::TableHead), FrameKind::Node);
                self.push(MarkdownNode::new(NodeType::TableRow), FrameKind::Implicit);
            }
            Tag::TableRow => {
                if let Some(t) = self.tables.last_mut() {
                    t.in_head = false;
                    t.col = 0;
                }
                if self
                    .stack
                    .last()
                    .is_some_and(|f| f.node.node_type == NodeType::Table)
                {
                    self.push(MarkdownNode::new(NodeType::TableBody), FrameKind::Implicit);
                }
                self.push(MarkdownNode::new(NodeType::TableRow), FrameKind::Node);
            }
            Tag::TableCell => {
                let mut node = MarkdownNode::new(NodeType::TableCell);
                if let Some(t) = self.tables.last_mut() {
                    node.is_header = Some(t.in_head);
                    node.align = t.aligns.get(t.col).copied().and_then(cell_align);
                    t.col += 1;
                }
                self.push(node, FrameKind::Node);
            }
            Tag::Emphasis => self.push(MarkdownNode::new(NodeType::Italic), FrameKind::Node),
            Tag::Strong => self.push(MarkdownNode::new(NodeType::Bold), FrameKind::Node),
            Tag::Strikethrough => {
                self.push(MarkdownNode::new(NodeType::Strikethrough), FrameKind::Node)
            }
            Tag::Link {
                dest_url, title, ..
            } => {
                let mut node = MarkdownNode::new(NodeType::Link);
                node.href = non_empty(dest_url);
                node.title = non_empty(title);
                self.push(node, FrameKind::Node);
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                let mut node = MarkdownNode::new(NodeType::Image);
                node.href = non_empty(dest_url);
                node.title = non_empty(title);
                self.push(node, FrameKind::Node);
            }
            _ => self.push(MarkdownNode::new(NodeType::Document), FrameKind::Transparent),
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text.push_str(&text),
            Event::Code(code) => {
                self.add_leaf(MarkdownNode::new(NodeType::CodeInline).with_content(code.as_ref()))
            }
            Event::InlineMath(math) => {
                self.add_leaf(MarkdownNode::new(NodeType::MathInline).with_content(math.as_ref()))
            }
            Event::DisplayMath(math) => {
                self.add_leaf(MarkdownNode::new(NodeType::MathBlock).with_content(math.as_ref()))
            }
            Event::Html(html) => {
                if self
                    .stack
                    .last()
                    .is_some_and(|f| f.node.node_type == NodeType::HtmlBlock)
                {
                    self.text.push_str(&html);
                } else {
                    self.add_leaf(
                        MarkdownNode::new(NodeType::HtmlInline).with_content(html.as_ref()),
                    );
                }
            }
            Event::InlineHtml(html) => {
                self.add_leaf(MarkdownNode::new(NodeType::HtmlInline).with_content(html.as_ref()))
            }
            Event::FootnoteReference(label) => self.text.push_str(&format!("[^{label}]")),
            Event::SoftBreak => self.add_leaf(MarkdownNode::new(NodeType::SoftBreak)),
            Event::HardBreak => self.add_leaf(MarkdownNode::new(NodeType::LineBreak)),
            Event::Rule => self.add_leaf(MarkdownNode::new(NodeType::HorizontalRule)),
            Event::TaskListMarker(checked) => self.mark_task(checked),
        }
    }

    fn mark_task(&mut self, checked: bool) {
        self.flush_text();
        let item = self
            .stack
            .iter_mut()
            .rev()
            .find(|f| f.node.node_type == NodeType::ListItem);
        if let Some(frame) = item {
            frame.node.node_type = NodeType::TaskListItem;
            frame.node.checked = Some(checked);
        }
    }

    fn finish(mut self) -> Result<MarkdownNode, ParseError> {
        self.flush_text();
        if self.stack.len() != 1 {
            return Err(ParseError::Unbalanced {
                open: self.stack.len() - 1,
            });
        }
        match self.stack.pop() {
            Some(frame) => Ok(frame.node),
            None => Err(ParseError::Unbalanced { open: 0 }),
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn cell_align(align: Alignment) -> Option<CellAlign> {
    match align {
        Alignment::None => None,
        Alignment::Left => Some(CellAlign::Left),
        Alignment::Center => Some(CellAlign::Center),
        Alignment::Right => Some(CellAlign::Right),
    }
}

fn fence_language(info: &CowStr<'_>) -> Option<String> {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_empty(s: CowStr<'_>) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(md: &str) -> MarkdownNode {
        PulldownParser::new().parse(md).unwrap()
    }

    fn types(nodes: &[MarkdownNode]) -> Vec<NodeType> {
        nodes.iter().map(|n| n.node_type).collect()
    }

    #[test]
    fn empty_input_is_an_empty_document() {
        let doc = parse("");
        assert_eq!(doc.node_type, NodeType::Document);
        assert!(doc.children.is_empty());
    }

    #[test]
    fn bold_and_italic_wrap_single_text_children() {
        let doc = parse("**bold** and *italic*");
        let para = &doc.children[0];
        assert_eq!(para.node_type, NodeType::Paragraph);
        assert_eq!(
            types(&para.children),
            vec![NodeType::Bold, NodeType::Text, NodeType::Italic]
        );
        assert_eq!(para.children[0].children, vec![MarkdownNode::text("bold")]);
        assert_eq!(para.children[1].content.as_deref(), Some(" and "));
        assert_eq!(para.children[2].children, vec![MarkdownNode::text("italic")]);
    }

    #[test]
    fn adjacent_text_events_merge() {
        let doc = parse("a [b c");
        let para = &doc.children[0];
        assert_eq!(para.children, vec![MarkdownNode::text("a [b c")]);
    }

    #[test]
    fn tables_are_strictly_nested_with_alignment() {
        let doc = parse("| a | b |\n|:-|-:|\n| 1 | 2 |\n| 3 | 4 |\n");
        let table = &doc.children[0];
        assert_eq!(table.node_type, NodeType::Table);
        assert_eq!(
            types(&table.children),
            vec![NodeType::TableHead, NodeType::TableBody]
        );

        let head_row = &table.children[0].children[0];
        assert_eq!(head_row.node_type, NodeType::TableRow);
        assert_eq!(head_row.children.len(), 2);
        assert_eq!(head_row.children[0].is_header, Some(true));
        assert_eq!(head_row.children[0].align, Some(CellAlign::Left));
        assert_eq!(head_row.children[1].align, Some(CellAlign::Right));

        let body = &table.children[1];
        assert_eq!(body.children.len(), 2);
        let cell = &body.children[1].children[1];
        assert_eq!(cell.is_header, Some(false));
        assert_eq!(cell.align, Some(CellAlign::Right));
        assert_eq!(cell.text_content(), "4");
    }

    #[test]
    fn unaligned_columns_have_no_align() {
        let doc = parse("| a |\n|---|\n| 1 |\n");
        let cell = &doc.children[0].children[0].children[0].children[0];
        assert_eq!(cell.align, None);
    }

    #[test]
    fn gfm_off_leaves_tables_as_text() {
        let doc = PulldownParser::new()
            .parse_with_options(
                "| a |\n|---|\n| 1 |\n",
                &ParserOptions {
                    gfm: false,
                    math: true,
                },
            )
            .unwrap();
        assert_eq!(doc.children[0].node_type, NodeType::Paragraph);
    }

    #[test]
    fn inline_and_display_math() {
        let doc = parse("$E = mc^2$");
        let math = &doc.children[0].children[0];
        assert_eq!(math.node_type, NodeType::MathInline);
        assert_eq!(math.content.as_deref(), Some("E = mc^2"));

        let doc = parse("$$x = 1$$");
        let para = &doc.children[0];
        assert_eq!(para.children[0].node_type, NodeType::MathBlock);
        assert_eq!(para.children[0].content.as_deref(), Some("x = 1"));
    }

    #[test]
    fn math_off_keeps_dollars_as_text() {
        let doc = PulldownParser::new()
            .parse_with_options(
                "Price is $100 and $x$",
                &ParserOptions {
                    gfm: true,
                    math: false,
                },
            )
            .unwrap();
        let para = &doc.children[0];
        assert_eq!(types(&para.children), vec![NodeType::Text]);
        assert!(para.children[0].text_content().contains('$'));
    }

    #[test]
    fn task_items_carry_checked_state() {
        let doc = parse("- [x] done\n- [ ] todo\n- plain\n");
        let list = &doc.children[0];
        assert_eq!(list.ordered, Some(false));
        assert_eq!(
            types(&list.children),
            vec![
                NodeType::TaskListItem,
                NodeType::TaskListItem,
                NodeType::ListItem
            ]
        );
        assert_eq!(list.children[0].checked, Some(true));
        assert_eq!(list.children[1].checked, Some(false));
        assert_eq!(list.children[0].text_content(), "done");
    }

    #[test]
    fn ordered_list_keeps_start() {
        let doc = parse("3. a\n4. b\n");
        let list = &doc.children[0];
        assert_eq!(list.ordered, Some(true));
        assert_eq!(list.start, Some(3));
    }

    #[test]
    fn code_blocks_store_language_and_content() {
        let doc = parse("```rust ignore\nfn main() {}\n```\n");
        let code = &doc.children[0];
        assert_eq!(code.node_type, NodeType::CodeBlock);
        assert_eq!(code.language.as_deref(), Some("rust"));
        assert_eq!(code.content.as_deref(), Some("fn main() {}\n"));
        assert!(code.children.is_empty());
    }

    #[test]
    fn images_keep_alt_text_instead_of_children() {
        let doc = parse("![a *cat*](cat.png \"Cat\")");
        let image = &doc.children[0].children[0];
        assert_eq!(image.node_type, NodeType::Image);
        assert_eq!(image.href.as_deref(), Some("cat.png"));
        assert_eq!(image.title.as_deref(), Some("Cat"));
        assert_eq!(image.alt.as_deref(), Some("a cat"));
        assert!(image.children.is_empty());
    }

    #[test]
    fn links_keep_href_and_title() {
        let doc = parse("[site](https://example.com \"Home\")");
        let link = &doc.children[0].children[0];
        assert_eq!(link.node_type, NodeType::Link);
        assert_eq!(link.href.as_deref(), Some("https://example.com"));
        assert_eq!(link.title.as_deref(), Some("Home"));
        assert_eq!(link.children, vec![MarkdownNode::text("site")]);
    }

    #[test]
    fn breaks_become_nodes() {
        let doc = parse("a\nb  \nc");
        let para = &doc.children[0];
        assert_eq!(
            types(&para.children),
            vec![
                NodeType::Text,
                NodeType::SoftBreak,
                NodeType::Text,
                NodeType::LineBreak,
                NodeType::Text
            ]
        );
    }

    #[test]
    fn horizontal_rule_and_blockquote() {
        let doc = parse("> quoted\n\n---\n");
        assert_eq!(
            types(&doc.children),
            vec![NodeType::Blockquote, NodeType::HorizontalRule]
        );
        assert_eq!(doc.children[0].children[0].node_type, NodeType::Paragraph);
    }

    #[test]
    fn input_limit_is_enforced() {
        let parser = PulldownParser::new().with_max_input_bytes(Some(4));
        assert!(matches!(
            parser.parse("hello"),
            Err(ParseError::InputTooLarge { len: 5, limit: 4 })
        ));
        assert!(parser.parse("hey").is_ok());
    }

    #[test]
    fn malformed_input_still_parses() {
        for md in [
            "[unclosed link",
            "**bold *italic**",
            "`code [link](url **bold",
            "text\0null",
            "| a |\n|---|\n| 1 | 2 | 3 |\n",
        ] {
            assert_eq!(parse(md).node_type, NodeType::Document);
        }
    }
}
