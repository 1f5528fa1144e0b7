//! A scrollable ratatui widget over one Markdown document.
use std::sync::Arc;
use std::time::Instant;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui::text::Text;
use ratatui_mdflow_core::render;
use ratatui_mdflow_core::text::CodeHighlighter;
use ratatui_mdflow_core::theme::Theme;
use ratatui_mdflow_core::viewport::ViewportState;
use tracing::trace;

use crate::config::MarkdownConfig;
use crate::element::Element;
use crate::layout::LayoutContext;
use crate::layout::LayoutOptions;
use crate::layout::layout_document;
use crate::math::MathRenderer;
use crate::math::PlainMath;
use crate::parser::ParserOptions;
use crate::renderer::MarkdownRenderer;
use crate::renderer::Overrides;
use crate::table::TableRegistry;
use crate::table::TableSizing;

#[derive(Clone, Debug, PartialEq)]
pub struct MarkdownViewOptions {
    pub show_scrollbar: bool,
    pub padding_left: u16,
    pub padding_right: u16,
    pub layout: LayoutOptions,
    pub base_url: Option<String>,
    pub parser: ParserOptions,
    pub table: TableSizing,
}

impl Default for MarkdownViewOptions {
    fn default() -> Self {
        Self {
            show_scrollbar: true,
            padding_left: 0,
            padding_right: 0,
            layout: LayoutOptions::default(),
            base_url: None,
            parser: ParserOptions::default(),
            table: TableSizing::default(),
        }
    }
}

impl From<&MarkdownConfig> for MarkdownViewOptions {
    fn from(config: &MarkdownConfig) -> Self {
        let view = &config.view;
        Self {
            show_scrollbar: view.show_scrollbar,
            padding_left: view.padding_left,
            padding_right: view.padding_right,
            layout: LayoutOptions {
                wrap: view.wrap,
                show_link_destinations: view.show_link_destinations,
                code_block_indent: view.code_block_indent,
                ..LayoutOptions::default()
            },
            base_url: view.base_url.clone(),
            parser: config.parser.options(),
            table: config.table.sizing(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct LayoutKey {
    width: u16,
    highlight_position: usize,
    theme: Theme,
}

/// Renders Markdown into a scrollable viewport.
///
/// Layout is cached per width, theme and highlight position. Tables whose widths are not yet
/// committed stay hidden; [`MarkdownView::next_redraw_deadline`] tells the host when to draw
/// again so the fallback commit becomes visible.
pub struct MarkdownView {
    source: String,
    options: MarkdownViewOptions,
    renderer: MarkdownRenderer,
    element: Element,
    highlighter: Option<Arc<dyn CodeHighlighter + Send + Sync>>,
    math: Arc<dyn MathRenderer>,
    tables: TableRegistry,
    highlight_position: usize,
    rendered: Vec<Line<'static>>,
    cached: Option<LayoutKey>,
    pub state: ViewportState,
}

impl Default for MarkdownView {
    fn default() -> Self {
        Self::with_options(MarkdownViewOptions::default())
    }
}

impl std::fmt::Debug for MarkdownView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownView")
            .field("source_len", &self.source.len())
            .field("options", &self.options)
            .field("tables", &self.tables.len())
            .field("highlight_position", &self.highlight_position)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MarkdownView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MarkdownViewOptions) -> Self {
        let renderer = MarkdownRenderer::default()
            .with_options(options.parser)
            .with_base_url(options.base_url.as_deref());
        Self::with_renderer(renderer, options)
    }

    /// Builds a view from loaded configuration, including the parser's input limit.
    pub fn from_config(config: &MarkdownConfig) -> Self {
        let options = MarkdownViewOptions::from(config);
        let renderer = MarkdownRenderer::new(Arc::new(config.parser.build()))
            .with_options(options.parser)
            .with_base_url(options.base_url.as_deref());
        Self::with_renderer(renderer, options)
    }

    /// Uses `renderer` as is; its parser, options and overrides take effect on the next
    /// [`MarkdownView::set_markdown`].
    pub fn with_renderer(renderer: MarkdownRenderer, options: MarkdownViewOptions) -> Self {
        Self {
            source: String::new(),
            tables: TableRegistry::new(options.table),
            options,
            renderer,
            element: Element::Empty,
            highlighter: None,
            math: Arc::new(PlainMath),
            highlight_position: 0,
            rendered: Vec::new(),
            cached: None,
            state: ViewportState::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.renderer = self.renderer.with_overrides(overrides);
        self.rerender();
        self
    }

    pub fn options(&self) -> &MarkdownViewOptions {
        &self.options
    }

    pub fn renderer(&self) -> &MarkdownRenderer {
        &self.renderer
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Sets markdown source and re-renders it.
    ///
    /// Table layouts are kept: the n-th table of the new text inherits the committed widths of
    /// the n-th table of the old one.
    pub fn set_markdown(&mut self, input: &str) {
        self.source = input.to_string();
        self.rerender();
    }

    fn rerender(&mut self) {
        self.element = self.renderer.render_source(&self.source);
        self.cached = None;
    }

    pub fn highlight_position(&self) -> usize {
        self.highlight_position
    }

    /// Number of leading prose words drawn with [`Theme::highlight`].
    pub fn set_highlight_position(&mut self, words: usize) {
        if self.highlight_position != words {
            self.highlight_position = words;
            self.cached = None;
        }
    }

    /// Sets an optional highlighter used for code blocks.
    pub fn set_highlighter(&mut self, highlighter: Option<Arc<dyn CodeHighlighter + Send + Sync>>) {
        self.highlighter = highlighter;
        self.cached = None;
    }

    pub fn set_math_renderer(&mut self, math: Arc<dyn MathRenderer>) {
        self.math = math;
        self.cached = None;
    }

    /// Updates viewport size for `area` (and accounts for optional scrollbar/padding).
    pub fn set_viewport(&mut self, area: Rect) {
        let content_area = inset_h(
            self.scrollbar_split(area).0,
            self.options.padding_left,
            self.options.padding_right,
        );
        self.state
            .set_viewport(content_area.width, content_area.height);
    }

    /// Scrolls vertically (y axis).
    pub fn scroll_y_by(&mut self, delta: i32) {
        self.state.scroll_y_by(delta);
    }

    /// Scrolls horizontally (x axis). Tables wider than the viewport are reached this way.
    pub fn scroll_x_by(&mut self, delta: i32) {
        self.state.scroll_x_by(delta);
    }

    /// Earliest instant at which a pending table will commit by fallback.
    pub fn next_redraw_deadline(&self) -> Option<Instant> {
        self.tables.next_deadline()
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn render_ref(&mut self, area: Rect, buf: &mut Buffer, theme: &Theme) {
        self.render_ref_at(area, buf, theme, Instant::now());
    }

    pub fn render_ref_at(&mut self, area: Rect, buf: &mut Buffer, theme: &Theme, now: Instant) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let (content_area, scrollbar_x) = self.scrollbar_split(area);
        self.set_viewport(area);
        let inner = inset_h(
            content_area,
            self.options.padding_left,
            self.options.padding_right,
        );
        self.ensure_layout(inner.width, theme, now);

        for row in 0..content_area.height {
            let y = content_area.y + row;
            let idx = (self.state.y as usize).saturating_add(row as usize);
            buf.set_style(
                Rect::new(content_area.x, y, content_area.width, 1),
                theme.text_primary,
            );
            if let Some(line) = self.rendered.get(idx) {
                render::render_spans_clipped(
                    inner.x,
                    y,
                    self.state.x,
                    inner.width,
                    buf,
                    &line.spans,
                    theme.text_primary,
                );
            }
        }

        if let Some(sb_x) = scrollbar_x {
            render::render_scrollbar(
                Rect::new(sb_x, area.y, 1, area.height),
                buf,
                &self.state,
                theme.text_muted,
            );
        }
    }

    pub fn lines_for_width(&mut self, width: u16, theme: &Theme) -> Vec<Line<'static>> {
        self.lines_for_width_at(width, theme, Instant::now())
    }

    pub fn lines_for_width_at(
        &mut self,
        width: u16,
        theme: &Theme,
        now: Instant,
    ) -> Vec<Line<'static>> {
        let width = width
            .saturating_sub(self.options.padding_left)
            .saturating_sub(self.options.padding_right);
        self.ensure_layout(width, theme, now);
        self.rendered.clone()
    }

    pub fn as_text(&mut self) -> Text<'static> {
        let theme = Theme::default();
        let width = self.cached.as_ref().map_or(80, |k| k.width);
        self.ensure_layout(width, &theme, Instant::now());
        Text::from(self.rendered.clone())
    }

    /// Content height and width of the last layout.
    pub fn content_size(&self) -> (u32, u32) {
        (self.state.content_h, self.state.content_w)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.state.is_at_bottom()
    }

    pub fn scroll_to_bottom(&mut self) {
        self.state.to_bottom();
    }

    fn scrollbar_split(&self, area: Rect) -> (Rect, Option<u16>) {
        if self.options.show_scrollbar && area.width >= 2 {
            (
                Rect::new(area.x, area.y, area.width - 1, area.height),
                Some(area.x + area.width - 1),
            )
        } else {
            (area, None)
        }
    }

    fn ensure_layout(&mut self, width: u16, theme: &Theme, now: Instant) {
        let fallback_due = self.tables.next_deadline().is_some_and(|d| now >= d);
        if !fallback_due
            && let Some(key) = &self.cached
            && key.width == width
            && key.highlight_position == self.highlight_position
            && key.theme == *theme
        {
            return;
        }

        let highlighter = self
            .highlighter
            .as_deref()
            .map(|h| h as &dyn CodeHighlighter);
        let mut cx = LayoutContext::new(
            theme,
            &self.options.layout,
            self.math.as_ref(),
            &mut self.tables,
            now,
        )
        .with_highlighter(highlighter)
        .with_highlight_position(self.highlight_position);
        self.rendered = layout_document(&self.element, width, &mut cx);
        trace!(
            width,
            lines = self.rendered.len(),
            fallback_due,
            "markdown layout"
        );

        self.cached = Some(LayoutKey {
            width,
            highlight_position: self.highlight_position,
            theme: theme.clone(),
        });
        let content_w = render::max_line_width(&self.rendered) as u32;
        self.state.set_content(content_w, self.rendered.len() as u32);
    }
}

fn inset_h(area: Rect, left: u16, right: u16) -> Rect {
    let left = left.min(area.width);
    let right = right.min(area.width.saturating_sub(left));
    Rect::new(
        area.x + left,
        area.y,
        area.width.saturating_sub(left + right),
        area.height,
    )
}
