//! Render dispatch: [`MarkdownNode`] → [`Element`].
//!
//! Every node first goes through the [`Overrides`] table. An override receives the node, its
//! children already reconciled and rendered, and the renderer itself; returning `None` falls back
//! to the default rendering for that node kind.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;
use url::Url;

use crate::ast::MarkdownNode;
use crate::ast::NodeType;
use crate::element::BreakKind;
use crate::element::Element;
use crate::element::ListMarker;
use crate::element::SpanKind;
use crate::element::TableElement;
use crate::parser::Parser;
use crate::parser::ParserOptions;
use crate::parser::PulldownParser;
use crate::reconcile::GroupKind;
use crate::reconcile::RenderContext;
use crate::reconcile::Unit;
use crate::reconcile::plan;
use crate::table::TableData;

pub const PARSE_ERROR_MESSAGE: &str = "Error parsing markdown";

/// Alt text containing any of these is rendered as Markdown.
const ALT_MARKUP_CHARS: &[char] = &['$', '*', '_', '`', '['];

pub struct OverrideProps<'a> {
    pub node: &'a MarkdownNode,
    pub children: &'a [Element],
    pub renderer: &'a MarkdownRenderer,
    pub context: RenderContext,
}

pub type NodeOverride = Arc<dyn Fn(OverrideProps<'_>) -> Option<Element> + Send + Sync>;

/// Per-kind replacements for the default rendering.
#[derive(Clone, Default)]
pub struct Overrides {
    map: HashMap<NodeType, NodeOverride>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, node_type: NodeType, f: F) -> Self
    where
        F: Fn(OverrideProps<'_>) -> Option<Element> + Send + Sync + 'static,
    {
        self.insert(node_type, f);
        self
    }

    pub fn insert<F>(&mut self, node_type: NodeType, f: F)
    where
        F: Fn(OverrideProps<'_>) -> Option<Element> + Send + Sync + 'static,
    {
        self.map.insert(node_type, Arc::new(f));
    }

    pub fn remove(&mut self, node_type: NodeType) -> Option<NodeOverride> {
        self.map.remove(&node_type)
    }

    pub fn get(&self, node_type: NodeType) -> Option<&NodeOverride> {
        self.map.get(&node_type)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

#[derive(Clone)]
pub struct MarkdownRenderer {
    parser: Arc<dyn Parser>,
    options: ParserOptions,
    overrides: Overrides,
    base_url: Option<Url>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(Arc::new(PulldownParser::new()))
    }
}

impl fmt::Debug for MarkdownRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkdownRenderer")
            .field("options", &self.options)
            .field("overrides", &self.overrides)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

impl MarkdownRenderer {
    pub fn new(parser: Arc<dyn Parser>) -> Self {
        Self {
            parser,
            options: ParserOptions::default(),
            overrides: Overrides::default(),
            base_url: None,
        }
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Base for relative link and image destinations. An unparsable base is ignored.
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        self.base_url = base_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| match Url::parse(s) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!(base_url = s, %err, "ignoring invalid base url");
                    None
                }
            });
        self
    }

    pub fn parser(&self) -> &Arc<dyn Parser> {
        &self.parser
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// Parses and renders `text`. A parse failure renders as an error placeholder.
    pub fn render_source(&self, text: &str) -> Element {
        match self.parser.parse_with_options(text, &self.options) {
            Ok(root) => self.render_document(&root),
            Err(err) => {
                warn!(%err, len = text.len(), "markdown parse failed");
                Element::Error(PARSE_ERROR_MESSAGE.to_string())
            }
        }
    }

    pub fn render_document(&self, root: &MarkdownNode) -> Element {
        self.render_node(root, RenderContext::root())
    }

    pub fn render_node(&self, node: &MarkdownNode, ctx: RenderContext) -> Element {
        self.dispatch(node, ctx, |rendered| self.render_default(node, ctx, rendered))
    }

    /// Runs the override for `node`, if any, and otherwise `fallback`. Children are rendered at
    /// most once: the ones shown to a declining override are handed on to `fallback`.
    fn dispatch(
        &self,
        node: &MarkdownNode,
        ctx: RenderContext,
        fallback: impl FnOnce(Option<Vec<Element>>) -> Element,
    ) -> Element {
        let Some(f) = self.overrides.get(node.node_type) else {
            return fallback(None);
        };
        let children = self.render_child_elements(node, ctx);
        let overridden = f(OverrideProps {
            node,
            children: &children,
            renderer: self,
            context: ctx,
        });
        match overridden {
            Some(el) => el,
            None => fallback(Some(children)),
        }
    }

    fn render_child_elements(&self, node: &MarkdownNode, ctx: RenderContext) -> Vec<Element> {
        match node.node_type {
            NodeType::List => self.render_list_items(node, ctx),
            _ => self.render_children(&node.children, child_context(node, ctx)),
        }
    }

    /// Reconciles `children` into inline groups and blocks and renders each in `ctx`.
    pub fn render_children(&self, children: &[MarkdownNode], ctx: RenderContext) -> Vec<Element> {
        let mut out = Vec::new();
        for unit in plan(children, ctx.parent_is_text) {
            let el = match unit {
                Unit::Inline {
                    kind,
                    nodes,
                    child_parent_is_text,
                } => {
                    let member_ctx = ctx.with_parent_is_text(child_parent_is_text);
                    let members: Vec<Element> = nodes
                        .iter()
                        .map(|n| self.render_node(n, member_ctx))
                        .filter(|el| !el.is_empty())
                        .collect();
                    if members.is_empty() {
                        continue;
                    }
                    match kind {
                        GroupKind::TextFlow => Element::TextFlow(members),
                        GroupKind::Row => Element::Row(members),
                    }
                }
                Unit::Block(node) => self.render_node(node, ctx),
            };
            if !el.is_empty() {
                out.push(el);
            }
        }
        out
    }

    fn render_default(
        &self,
        node: &MarkdownNode,
        ctx: RenderContext,
        rendered: Option<Vec<Element>>,
    ) -> Element {
        let children = move || match rendered {
            Some(children) => children,
            None => self.render_child_elements(node, ctx),
        };
        match node.node_type {
            NodeType::Document => Element::Document(children()),
            NodeType::Heading => Element::Heading {
                level: node.level.unwrap_or(1).clamp(1, 6),
                children: children(),
            },
            NodeType::Paragraph => Element::Paragraph {
                in_list_item: ctx.in_list_item,
                children: children(),
            },
            NodeType::Text => match node.content.as_deref() {
                Some(content) if !content.is_empty() => Element::Text {
                    content: content.to_string(),
                    plain_context: !ctx.parent_is_text,
                },
                _ => Element::Empty,
            },
            NodeType::Bold => span(SpanKind::Bold, children()),
            NodeType::Italic => span(SpanKind::Italic, children()),
            NodeType::Strikethrough => span(SpanKind::Strikethrough, children()),
            NodeType::Link => Element::Link {
                href: node.href.as_deref().map(|h| self.resolve_url(h)),
                title: node.title.clone(),
                children: children(),
            },
            NodeType::Image => self.render_image(node, ctx),
            NodeType::CodeInline => match node.content.as_deref() {
                Some(code) if !code.is_empty() => Element::InlineCode(code.to_string()),
                _ => Element::Empty,
            },
            NodeType::CodeBlock => Element::CodeBlock {
                language: node.language.clone().filter(|l| !l.is_empty()),
                content: node.text_content(),
            },
            NodeType::Blockquote => Element::Blockquote(children()),
            NodeType::HorizontalRule => Element::Rule,
            NodeType::LineBreak => Element::Break(BreakKind::Hard),
            NodeType::SoftBreak => Element::Break(BreakKind::Soft),
            NodeType::Table => self.render_table(node),
            NodeType::TableHead
            | NodeType::TableBody
            | NodeType::TableRow
            | NodeType::TableCell => Element::Empty,
            NodeType::List => Element::List {
                ordered: node.ordered.unwrap_or(false),
                start: node.start.unwrap_or(1),
                depth: ctx.depth,
                items: children(),
            },
            NodeType::ListItem => Element::ListItem {
                marker: ListMarker::Bullet,
                children: children(),
            },
            NodeType::TaskListItem => Element::ListItem {
                marker: ListMarker::Task {
                    checked: node.checked.unwrap_or(false),
                },
                children: children(),
            },
            NodeType::MathInline => {
                let tex = strip_math_delimiters(&node.text_content());
                if tex.is_empty() {
                    Element::Empty
                } else {
                    Element::MathInline(tex)
                }
            }
            NodeType::MathBlock => {
                let tex = node.text_content();
                if tex.trim().is_empty() {
                    Element::Empty
                } else {
                    Element::MathBlock(tex)
                }
            }
            NodeType::HtmlBlock => html(node, true),
            NodeType::HtmlInline => html(node, false),
        }
    }

    /// Items of a list, each with its position-dependent marker.
    fn render_list_items(&self, node: &MarkdownNode, ctx: RenderContext) -> Vec<Element> {
        let ordered = node.ordered.unwrap_or(false);
        let start = node.start.unwrap_or(1);
        let item_ctx = ctx.child();
        let mut items = Vec::with_capacity(node.children.len());
        for (idx, item) in node.children.iter().enumerate() {
            let marker = if item.node_type == NodeType::TaskListItem {
                ListMarker::Task {
                    checked: item.checked.unwrap_or(false),
                }
            } else if ordered {
                ListMarker::Ordered(start.saturating_add(idx as u64))
            } else {
                ListMarker::Bullet
            };
            let el = match item.node_type {
                NodeType::ListItem | NodeType::TaskListItem => {
                    self.dispatch(item, item_ctx, |rendered| Element::ListItem {
                        marker,
                        children: rendered.unwrap_or_else(|| {
                            self.render_children(&item.children, child_context(item, item_ctx))
                        }),
                    })
                }
                _ => self.render_node(item, item_ctx),
            };
            if !el.is_empty() {
                items.push(el);
            }
        }
        items
    }

    fn render_image(&self, node: &MarkdownNode, ctx: RenderContext) -> Element {
        let alt = node.alt.clone().filter(|a| !a.is_empty());
        let alt_children = match alt.as_deref() {
            Some(text) if text.contains(ALT_MARKUP_CHARS) => self.render_alt_markup(text, ctx),
            _ => Vec::new(),
        };
        Element::Image {
            url: node.href.as_deref().map(|h| self.resolve_url(h)),
            title: node.title.clone(),
            alt,
            alt_children,
        }
    }

    fn render_alt_markup(&self, alt: &str, ctx: RenderContext) -> Vec<Element> {
        let options = ParserOptions {
            gfm: true,
            math: true,
        };
        let root = match self.parser.parse_with_options(alt, &options) {
            Ok(root) => root,
            Err(err) => {
                warn!(%err, "image alt text parse failed");
                return Vec::new();
            }
        };
        match root.find_child(NodeType::Paragraph) {
            Some(para) => self.render_children(
                &para.children,
                ctx.child().with_parent_is_text(false),
            ),
            None => Vec::new(),
        }
    }

    fn render_table(&self, node: &MarkdownNode) -> Element {
        let data = TableData::extract(node);
        if data.column_count() == 0 {
            return Element::Empty;
        }
        Element::Table(TableElement {
            header: data.headers.iter().map(|c| self.render_cell(c)).collect(),
            rows: data
                .rows
                .iter()
                .map(|row| row.iter().map(|c| self.render_cell(c)).collect())
                .collect(),
            alignments: data.alignments,
        })
    }

    /// Cell content renderer shared by the measurement pass and the final table.
    pub fn render_cell(&self, cell: &MarkdownNode) -> Element {
        if cell.children.is_empty() {
            return Element::Text {
                content: cell.content.clone().unwrap_or_default(),
                plain_context: true,
            };
        }
        let ctx = RenderContext::root();
        let members: Vec<Element> = cell
            .children
            .iter()
            .map(|c| self.render_node(c, ctx))
            .filter(|el| !el.is_empty())
            .collect();
        Element::Row(members)
    }

    pub fn resolve_url(&self, dest: &str) -> String {
        let dest = dest.trim();
        if dest.is_empty() || is_absolute_url(dest) {
            return dest.to_string();
        }
        match &self.base_url {
            Some(base) => base
                .join(dest)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| dest.to_string()),
            None => dest.to_string(),
        }
    }
}

/// Context the children of `node` are rendered in.
fn child_context(node: &MarkdownNode, ctx: RenderContext) -> RenderContext {
    let child = ctx.child();
    match node.node_type {
        NodeType::Heading
        | NodeType::Bold
        | NodeType::Italic
        | NodeType::Strikethrough
        | NodeType::Link => child.with_parent_is_text(true),
        NodeType::ListItem | NodeType::TaskListItem => child
            .with_in_list_item(true)
            .with_parent_is_text(false),
        NodeType::List => child.with_in_list_item(true),
        NodeType::Document
        | NodeType::Paragraph
        | NodeType::Blockquote
        | NodeType::Table
        | NodeType::TableCell => child.with_parent_is_text(false),
        _ => child,
    }
}

fn span(kind: SpanKind, children: Vec<Element>) -> Element {
    if children.is_empty() {
        return Element::Empty;
    }
    Element::Span { kind, children }
}

fn html(node: &MarkdownNode, block: bool) -> Element {
    let content = node.text_content();
    let content = if block {
        content.trim_end_matches('\n').to_string()
    } else {
        content
    };
    if content.is_empty() {
        return Element::Empty;
    }
    Element::Html { content, block }
}

fn strip_math_delimiters(tex: &str) -> String {
    tex.trim_matches('$').trim().to_string()
}

fn is_absolute_url(dest: &str) -> bool {
    dest.starts_with('#') || dest.starts_with('/') || Url::parse(dest).is_ok()
}
