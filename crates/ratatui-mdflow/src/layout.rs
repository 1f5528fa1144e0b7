//! Element tree → terminal lines.
//!
//! Text-flow groups are word-wrapped as one run. Row groups place each member as an unbreakable
//! box and only break between members. Tables go through the [`TableRegistry`]: a table stays
//! hidden until its column widths are committed.
use std::time::Instant;

use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui_mdflow_core::render::max_line_width;
use ratatui_mdflow_core::render::patch_spans_style;
use ratatui_mdflow_core::render::spans_width;
use ratatui_mdflow_core::text::CodeHighlighter;
use ratatui_mdflow_core::theme::Theme;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

use crate::ast::CellAlign;
use crate::element::BreakKind;
use crate::element::Element;
use crate::element::SpanKind;
use crate::element::TableElement;
use crate::math::MathRenderer;
use crate::table::CellKey;
use crate::table::TableRegistry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutOptions {
    pub wrap: bool,
    /// Appends ` (url)` after link text.
    pub show_link_destinations: bool,
    pub code_block_indent: u16,
    pub blockquote_prefix: String,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            wrap: true,
            show_link_destinations: false,
            code_block_indent: 4,
            blockquote_prefix: "│ ".to_string(),
        }
    }
}

pub struct LayoutContext<'a> {
    pub theme: &'a Theme,
    pub options: &'a LayoutOptions,
    pub highlighter: Option<&'a dyn CodeHighlighter>,
    pub math: &'a dyn MathRenderer,
    pub tables: &'a mut TableRegistry,
    pub now: Instant,
    /// Words still to be highlighted in this pass.
    karaoke_left: usize,
}

impl<'a> LayoutContext<'a> {
    pub fn new(
        theme: &'a Theme,
        options: &'a LayoutOptions,
        math: &'a dyn MathRenderer,
        tables: &'a mut TableRegistry,
        now: Instant,
    ) -> Self {
        Self {
            theme,
            options,
            highlighter: None,
            math,
            tables,
            now,
            karaoke_left: 0,
        }
    }

    pub fn with_highlighter(mut self, highlighter: Option<&'a dyn CodeHighlighter>) -> Self {
        self.highlighter = highlighter;
        self
    }

    /// Highlights the first `words` words of prose in reading order.
    pub fn with_highlight_position(mut self, words: usize) -> Self {
        self.karaoke_left = words;
        self
    }
}

/// Lays out a whole document. Tables seen in this pass are registered in order; tables from a
/// previous pass that no longer exist are torn down.
pub fn layout_document(
    element: &Element,
    width: u16,
    cx: &mut LayoutContext<'_>,
) -> Vec<Line<'static>> {
    cx.tables.begin_pass();
    let base = cx.theme.text_primary;
    let lines = layout_block(element, width, base, cx);
    cx.tables.end_pass();
    lines
}

fn layout_block(
    el: &Element,
    width: u16,
    base: Style,
    cx: &mut LayoutContext<'_>,
) -> Vec<Line<'static>> {
    if width == 0 {
        return Vec::new();
    }
    let theme = cx.theme;
    match el {
        Element::Empty => Vec::new(),
        Element::Error(message) => vec![Line::from(Span::styled(
            message.clone(),
            base.patch(theme.danger),
        ))],
        Element::Document(children) | Element::Fragment(children) => {
            layout_blocks(children, width, base, true, cx)
        }
        Element::Paragraph { children, .. } => layout_blocks(children, width, base, false, cx),
        Element::Heading { level, children } => {
            let style = base.patch(theme.heading_style(*level));
            layout_blocks(children, width, style, false, cx)
        }
        Element::Row(members) => layout_row(members, width, base, cx),
        Element::TextFlow(_)
        | Element::Text { .. }
        | Element::Span { .. }
        | Element::Link { .. }
        | Element::InlineCode(_)
        | Element::Break(_)
        | Element::MathInline(_)
        | Element::Image { .. }
        | Element::Html { block: false, .. } => {
            let mut segs = Vec::new();
            collect_inline(el, base, cx, &mut segs);
            let segs = mark_karaoke(segs, &mut cx.karaoke_left, theme.highlight);
            wrap_segments(&segs, width, cx.options.wrap)
        }
        Element::Blockquote(children) => {
            let prefix = cx.options.blockquote_prefix.clone();
            let prefix_w = UnicodeWidthStr::width(prefix.as_str()) as u16;
            let inner = width.saturating_sub(prefix_w).max(1);
            let lines = layout_blocks(children, inner, base.patch(theme.blockquote), true, cx);
            let bar = vec![Span::styled(prefix, theme.blockquote)];
            prefix_lines(lines, &bar, &bar)
        }
        Element::List { items, .. } => {
            let mut out = Vec::new();
            for item in items {
                out.extend(layout_block(item, width, base, cx));
            }
            out
        }
        Element::ListItem { marker, children } => {
            let symbol = format!("{} ", marker.symbol());
            let marker_w = UnicodeWidthStr::width(symbol.as_str()) as u16;
            let inner = width.saturating_sub(marker_w).max(1);
            let mut lines = layout_blocks(children, inner, base, false, cx);
            if lines.is_empty() {
                lines.push(Line::default());
            }
            let first = vec![Span::styled(symbol, base.patch(theme.text_muted))];
            let rest = vec![Span::raw(" ".repeat(usize::from(marker_w)))];
            prefix_lines(lines, &first, &rest)
        }
        Element::CodeBlock { language, content } => layout_code(language.as_deref(), content, cx),
        Element::Rule => vec![Line::from(Span::styled(
            "─".repeat(usize::from(width)),
            theme.text_muted,
        ))],
        Element::MathBlock(tex) => match cx.math.render_block(tex) {
            Some(lines) => lines,
            None => tex
                .trim()
                .lines()
                .map(|l| {
                    Line::from(vec![
                        Span::raw("  "),
                        Span::styled(l.to_string(), base.patch(theme.math)),
                    ])
                })
                .collect(),
        },
        Element::Html {
            content,
            block: true,
        } => content
            .lines()
            .map(|l| Line::from(Span::styled(l.to_string(), base.patch(theme.text_muted))))
            .collect(),
        Element::Table(table) => layout_table(table, base, cx),
        Element::Lines(lines) => lines.clone(),
    }
}

/// Stacks block children; `gap` puts a blank line between non-empty blocks.
fn layout_blocks(
    children: &[Element],
    width: u16,
    base: Style,
    gap: bool,
    cx: &mut LayoutContext<'_>,
) -> Vec<Line<'static>> {
    let mut out: Vec<Line<'static>> = Vec::new();
    for child in children {
        let lines = layout_block(child, width, base, cx);
        if lines.is_empty() {
            continue;
        }
        if gap && !out.is_empty() {
            out.push(Line::default());
        }
        out.extend(lines);
    }
    out
}

fn layout_code(
    language: Option<&str>,
    content: &str,
    cx: &LayoutContext<'_>,
) -> Vec<Line<'static>> {
    let theme = cx.theme;
    let content = content.strip_suffix('\n').unwrap_or(content);
    let lines: Vec<&str> = content.split('\n').collect();
    let highlighted = match cx.highlighter {
        Some(h) => h.highlight_lines(language, &lines),
        None => lines
            .iter()
            .map(|l| vec![Span::styled((*l).to_string(), theme.code_block)])
            .collect(),
    };
    let indent = " ".repeat(usize::from(cx.options.code_block_indent));
    highlighted
        .into_iter()
        .map(|spans| {
            let mut out = vec![Span::styled(indent.clone(), theme.code_block)];
            out.extend(patch_spans_style(spans, theme.code_block));
            Line::from(out)
        })
        .collect()
}

fn layout_row(
    members: &[Element],
    width: u16,
    base: Style,
    cx: &mut LayoutContext<'_>,
) -> Vec<Line<'static>> {
    let width_cols = usize::from(width);
    let mut out: Vec<Line<'static>> = Vec::new();
    let mut cur: Vec<Span<'static>> = Vec::new();
    let mut cur_w = 0usize;

    for member in members {
        let mut segs = Vec::new();
        collect_inline(member, base, cx, &mut segs);
        let segs = mark_karaoke(segs, &mut cx.karaoke_left, cx.theme.highlight);
        let multiline = segs.iter().any(|s| s.text.contains('\n'));
        let w = segments_width(&segs);

        if !multiline && (!cx.options.wrap || cur_w + w <= width_cols) {
            cur.extend(segments_to_spans(&segs));
            cur_w += w;
            continue;
        }
        if !cur.is_empty() {
            out.push(Line::from(std::mem::take(&mut cur)));
            cur_w = 0;
        }
        if !multiline && w <= width_cols {
            let segs = trim_leading_ws(segs);
            cur_w = segments_width(&segs);
            cur = segments_to_spans(&segs);
        } else {
            out.extend(wrap_segments(&segs, width, cx.options.wrap));
        }
    }
    if !cur.is_empty() {
        out.push(Line::from(cur));
    }
    out
}

fn layout_table(
    table: &TableElement,
    base: Style,
    cx: &mut LayoutContext<'_>,
) -> Vec<Line<'static>> {
    let cols = table.column_count();
    if cols == 0 {
        return Vec::new();
    }

    let needs_measure = cx.tables.upcoming().is_none_or(|l| !l.is_committed());
    let measured = if needs_measure {
        measure_cells(table, base, cx)
    } else {
        Vec::new()
    };

    let now = cx.now;
    let Some(layout) = cx.tables.next_table(cols, table.rows.len(), now) else {
        return Vec::new();
    };
    for (key, w) in measured {
        layout.on_layout(key, w);
    }
    layout.poll(now);
    if !layout.is_committed() {
        return Vec::new();
    }
    let widths: Vec<u16> = (0..cols).map(|c| layout.width_for(c)).collect();
    draw_table(table, &widths, base, cx)
}

/// Phase 1: each cell laid out unconstrained reports its widest line.
fn measure_cells(
    table: &TableElement,
    base: Style,
    cx: &mut LayoutContext<'_>,
) -> Vec<(CellKey, u16)> {
    let karaoke = std::mem::take(&mut cx.karaoke_left);
    let mut out = Vec::new();
    for (col, cell) in table.header.iter().enumerate() {
        if let Some(w) = measure_cell(cell, base, cx) {
            out.push((CellKey::Header { col }, w));
        }
    }
    for (row, cells) in table.rows.iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            if let Some(w) = measure_cell(cell, base, cx) {
                out.push((CellKey::Body { row, col }, w));
            }
        }
    }
    cx.karaoke_left = karaoke;
    out
}

fn measure_cell(cell: &Element, base: Style, cx: &mut LayoutContext<'_>) -> Option<u16> {
    if cell.is_empty() {
        return None;
    }
    let lines = layout_block(cell, u16::MAX, base, cx);
    Some(max_line_width(&lines).min(usize::from(u16::MAX)) as u16)
}

#[derive(Clone, Copy, Debug)]
enum BorderLine {
    Top,
    HeaderSep,
    Bottom,
}

fn table_border_line(col_w: &[u16], kind: BorderLine) -> String {
    let mut s = String::new();
    for (i, w) in col_w.iter().copied().enumerate() {
        s.push(match (kind, i) {
            (BorderLine::Top, 0) => '┌',
            (BorderLine::HeaderSep, 0) => '├',
            (BorderLine::Bottom, 0) => '└',
            (BorderLine::Top, _) => '┬',
            (BorderLine::HeaderSep, _) => '┼',
            (BorderLine::Bottom, _) => '┴',
        });
        s.push_str(&"─".repeat(usize::from(w)));
    }
    s.push(match kind {
        BorderLine::Top => '┐',
        BorderLine::HeaderSep => '┤',
        BorderLine::Bottom => '┘',
    });
    s
}

/// Phase 2: box-drawn table with the committed widths.
fn draw_table(
    table: &TableElement,
    widths: &[u16],
    base: Style,
    cx: &mut LayoutContext<'_>,
) -> Vec<Line<'static>> {
    let theme = cx.theme;
    let border =
        |kind| Line::from(Span::styled(table_border_line(widths, kind), theme.table_border));

    let mut out = vec![border(BorderLine::Top)];
    out.extend(draw_table_row(
        &table.header,
        table,
        widths,
        base.patch(theme.table_header),
        cx,
    ));
    out.push(border(BorderLine::HeaderSep));
    for (idx, row) in table.rows.iter().enumerate() {
        let style = if idx % 2 == 1 {
            base.patch(theme.table_row_odd)
        } else {
            base
        };
        out.extend(draw_table_row(row, table, widths, style, cx));
    }
    out.push(border(BorderLine::Bottom));
    out
}

fn draw_table_row(
    cells: &[Element],
    table: &TableElement,
    widths: &[u16],
    style: Style,
    cx: &mut LayoutContext<'_>,
) -> Vec<Line<'static>> {
    let border_style = cx.theme.table_border;
    let mut columns: Vec<Vec<Vec<Span<'static>>>> = Vec::with_capacity(widths.len());
    let mut row_h = 1usize;
    for (col, w) in widths.iter().copied().enumerate() {
        let (_, inner, _) = cell_box(w);
        let lines = match cells.get(col) {
            Some(cell) if inner > 0 => layout_block(cell, inner, style, cx),
            _ => Vec::new(),
        };
        let spans: Vec<Vec<Span<'static>>> = lines.into_iter().map(|l| l.spans).collect();
        row_h = row_h.max(spans.len());
        columns.push(spans);
    }

    let mut out = Vec::with_capacity(row_h);
    for li in 0..row_h {
        let mut spans = vec![Span::styled("│", border_style)];
        for (col, w) in widths.iter().copied().enumerate() {
            let (left, inner, right) = cell_box(w);
            let content = columns[col].get(li).cloned().unwrap_or_default();
            let content = truncate_spans(content, inner);
            if left > 0 {
                spans.push(Span::styled(" ".repeat(usize::from(left)), style));
            }
            spans.extend(pad_spans(content, inner, table.align(col), style));
            if right > 0 {
                spans.push(Span::styled(" ".repeat(usize::from(right)), style));
            }
            spans.push(Span::styled("│", border_style));
        }
        out.push(Line::from(spans));
    }
    out
}

/// Left margin, content width and right margin of a cell `w` columns wide.
fn cell_box(w: u16) -> (u16, u16, u16) {
    if w >= 3 { (1, w - 2, 1) } else { (0, w, 0) }
}

fn pad_spans(
    mut spans: Vec<Span<'static>>,
    width: u16,
    align: CellAlign,
    pad_style: Style,
) -> Vec<Span<'static>> {
    let w = spans_width(&spans);
    let pad = usize::from(width).saturating_sub(w);
    let (left, right) = match align {
        CellAlign::Left => (0, pad),
        CellAlign::Right => (pad, 0),
        CellAlign::Center => (pad / 2, pad - pad / 2),
    };
    if left > 0 {
        spans.insert(0, Span::styled(" ".repeat(left), pad_style));
    }
    if right > 0 {
        spans.push(Span::styled(" ".repeat(right), pad_style));
    }
    spans
}

fn truncate_spans(spans: Vec<Span<'static>>, width: u16) -> Vec<Span<'static>> {
    let max = usize::from(width);
    if spans_width(&spans) <= max {
        return spans;
    }
    let mut out = Vec::new();
    let mut used = 0usize;
    for span in spans {
        let w = UnicodeWidthStr::width(span.content.as_ref());
        if used + w <= max {
            used += w;
            out.push(span);
            continue;
        }
        let (head, _) = split_to_width(span.content.as_ref(), max - used);
        if !head.is_empty() {
            out.push(Span::styled(head.to_string(), span.style));
        }
        break;
    }
    out
}

fn prefix_lines(
    lines: Vec<Line<'static>>,
    first: &[Span<'static>],
    rest: &[Span<'static>],
) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let mut spans = if i == 0 { first.to_vec() } else { rest.to_vec() };
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
struct Segment {
    text: String,
    style: Style,
    /// Never split by wrapping (e.g. typeset math).
    atomic: bool,
}

impl Segment {
    fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
            atomic: false,
        }
    }

    fn atomic(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
            atomic: true,
        }
    }
}

fn collect_inline(el: &Element, style: Style, cx: &LayoutContext<'_>, out: &mut Vec<Segment>) {
    let theme = cx.theme;
    match el {
        Element::Empty => {}
        Element::Text {
            content,
            plain_context,
        } => {
            let style = if *plain_context {
                style.patch(theme.text_plain)
            } else {
                style
            };
            out.push(Segment::new(content.clone(), style));
        }
        Element::Span { kind, children } => {
            let style = style.add_modifier(match kind {
                SpanKind::Bold => Modifier::BOLD,
                SpanKind::Italic => Modifier::ITALIC,
                SpanKind::Strikethrough => Modifier::CROSSED_OUT,
            });
            for c in children {
                collect_inline(c, style, cx, out);
            }
        }
        Element::Link { href, children, .. } => {
            let link_style = style.patch(theme.link);
            for c in children {
                collect_inline(c, link_style, cx, out);
            }
            if cx.options.show_link_destinations
                && let Some(href) = href.as_deref().filter(|h| !h.is_empty())
            {
                let text: String = children.iter().map(Element::plain_text).collect();
                if text != href {
                    out.push(Segment::new(format!(" ({href})"), style.patch(theme.text_muted)));
                }
            }
        }
        Element::InlineCode(code) => {
            out.push(Segment::new(code.clone(), style.patch(theme.code_inline)))
        }
        Element::Break(BreakKind::Soft) => out.push(Segment::new(" ", style)),
        Element::Break(BreakKind::Hard) => out.push(Segment::new("\n", style)),
        Element::MathInline(tex) => match cx.math.render_inline(tex) {
            Some(spans) => out.extend(
                spans
                    .into_iter()
                    .map(|s| Segment::atomic(s.content.into_owned(), style.patch(s.style))),
            ),
            None => out.push(Segment::atomic(tex.clone(), style.patch(theme.math))),
        },
        Element::Html { content, .. } => {
            out.push(Segment::new(content.clone(), style.patch(theme.text_muted)))
        }
        Element::Image {
            url,
            title,
            alt,
            alt_children,
        } => {
            let image_style = style.patch(theme.link);
            out.push(Segment::atomic("🖼 ", image_style));
            if alt_children.is_empty() {
                let label = alt
                    .as_deref()
                    .or(title.as_deref())
                    .or(url.as_deref())
                    .unwrap_or("image");
                out.push(Segment::new(label, image_style));
            } else {
                for c in alt_children {
                    collect_inline(c, image_style, cx, out);
                }
            }
            if cx.options.show_link_destinations
                && let Some(url) = url.as_deref().filter(|u| !u.is_empty())
            {
                out.push(Segment::new(format!(" ({url})"), style.patch(theme.text_muted)));
            }
        }
        Element::Error(message) => {
            out.push(Segment::new(message.clone(), style.patch(theme.danger)))
        }
        Element::Document(children)
        | Element::TextFlow(children)
        | Element::Row(children)
        | Element::Fragment(children)
        | Element::Paragraph { children, .. }
        | Element::Heading { children, .. }
        | Element::Blockquote(children)
        | Element::ListItem { children, .. } => {
            for c in children {
                collect_inline(c, style, cx, out);
            }
        }
        other => out.push(Segment::new(other.plain_text(), style)),
    }
}

fn take_word(left: &mut usize) -> bool {
    if *left == 0 {
        return false;
    }
    *left -= 1;
    true
}

/// Applies `highlight` to the first `left` words of `segs`, consuming them from `left`.
fn mark_karaoke(segs: Vec<Segment>, left: &mut usize, highlight: Style) -> Vec<Segment> {
    if *left == 0 {
        return segs;
    }
    let mut out = Vec::with_capacity(segs.len());
    let mut in_word = false;
    let mut lit = false;
    for seg in segs {
        if seg.atomic {
            lit = take_word(left);
            in_word = false;
            let style = if lit { seg.style.patch(highlight) } else { seg.style };
            out.push(Segment { style, ..seg });
            continue;
        }
        let mut buf = String::new();
        let mut buf_lit = false;
        for ch in seg.text.chars() {
            let ch_lit = if ch.is_whitespace() {
                in_word = false;
                false
            } else {
                if !in_word {
                    in_word = true;
                    lit = take_word(left);
                }
                lit
            };
            if ch_lit != buf_lit && !buf.is_empty() {
                let style = if buf_lit { seg.style.patch(highlight) } else { seg.style };
                out.push(Segment::new(std::mem::take(&mut buf), style));
            }
            buf_lit = ch_lit;
            buf.push(ch);
        }
        if !buf.is_empty() {
            let style = if buf_lit { seg.style.patch(highlight) } else { seg.style };
            out.push(Segment::new(buf, style));
        }
    }
    out
}

fn segments_width(segs: &[Segment]) -> usize {
    segs.iter().map(|s| UnicodeWidthStr::width(s.text.as_str())).sum()
}

fn segments_to_spans(segs: &[Segment]) -> Vec<Span<'static>> {
    segs.iter()
        .filter(|s| !s.text.is_empty())
        .map(|s| Span::styled(s.text.clone(), s.style))
        .collect()
}

fn trim_leading_ws(mut segs: Vec<Segment>) -> Vec<Segment> {
    while let Some(first) = segs.first_mut() {
        if first.atomic {
            break;
        }
        let trimmed = first.text.trim_start();
        if trimmed.is_empty() {
            segs.remove(0);
            continue;
        }
        first.text = trimmed.to_string();
        break;
    }
    segs
}

fn is_all_ws(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

/// Splits non-atomic segments into whitespace and non-whitespace runs, with `\n` as its own
/// token.
fn tokenize(segs: &[Segment]) -> Vec<Segment> {
    let mut out = Vec::new();
    for seg in segs {
        if seg.atomic {
            out.push(seg.clone());
            continue;
        }
        for (i, part) in seg.text.split('\n').enumerate() {
            if i > 0 {
                out.push(Segment::new("\n", seg.style));
            }
            split_segment_ws(part, seg.style, &mut out);
        }
    }
    out
}

fn split_segment_ws(text: &str, style: Style, out: &mut Vec<Segment>) {
    let mut buf = String::new();
    let mut last_was_ws: Option<bool> = None;
    for ch in text.chars() {
        let is_ws = ch.is_whitespace();
        match last_was_ws {
            Some(prev) if prev != is_ws => {
                out.push(Segment::new(std::mem::take(&mut buf), style));
            }
            _ => {}
        }
        buf.push(ch);
        last_was_ws = Some(is_ws);
    }
    if !buf.is_empty() {
        out.push(Segment::new(buf, style));
    }
}

fn split_to_width(s: &str, max_cols: usize) -> (&str, &str) {
    let mut cols = 0usize;
    let mut idx = 0usize;
    for (byte_idx, ch) in s.char_indices() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if cols + w > max_cols {
            break;
        }
        cols += w;
        idx = byte_idx + ch.len_utf8();
    }
    s.split_at(idx)
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}

fn split_prefer_url_breaks(s: &str, max_cols: usize) -> (&str, &str) {
    if looks_like_url(s) {
        let mut cols = 0usize;
        let mut best: Option<usize> = None;
        for (byte_idx, ch) in s.char_indices() {
            let w = UnicodeWidthChar::width(ch).unwrap_or(0);
            if cols + w > max_cols {
                break;
            }
            cols += w;
            if matches!(ch, '.' | '-' | '_' | '~' | '?' | '&' | '#' | '=' | '/') {
                best = Some(byte_idx + ch.len_utf8());
            }
        }
        if let Some(idx) = best {
            return s.split_at(idx);
        }
    }
    split_to_width(s, max_cols)
}

fn wrap_segments(segs: &[Segment], width: u16, wrap: bool) -> Vec<Line<'static>> {
    if width == 0 {
        return Vec::new();
    }
    let width = if wrap { usize::from(width) } else { usize::MAX };

    let mut out: Vec<Line<'static>> = Vec::new();
    let mut cur: Vec<Span<'static>> = Vec::new();
    let mut cur_cols = 0usize;
    let mut pending_ws: Option<Segment> = None;

    fn flush(out: &mut Vec<Line<'static>>, cur: &mut Vec<Span<'static>>, cur_cols: &mut usize) {
        out.push(Line::from(std::mem::take(cur)));
        *cur_cols = 0;
    }

    for tok in tokenize(segs) {
        if !tok.atomic && tok.text == "\n" {
            flush(&mut out, &mut cur, &mut cur_cols);
            pending_ws = None;
            continue;
        }
        if !tok.atomic && is_all_ws(&tok.text) {
            if cur_cols > 0 {
                pending_ws = Some(tok);
            }
            continue;
        }

        let tok_cols = UnicodeWidthStr::width(tok.text.as_str());
        let ws_cols = pending_ws
            .as_ref()
            .map_or(0, |w| UnicodeWidthStr::width(w.text.as_str()));
        if cur_cols > 0 && cur_cols.saturating_add(ws_cols).saturating_add(tok_cols) > width {
            flush(&mut out, &mut cur, &mut cur_cols);
            pending_ws = None;
        }
        if let Some(ws) = pending_ws.take() {
            cur_cols += ws_cols;
            cur.push(Span::styled(ws.text, ws.style));
        }

        if cur_cols.saturating_add(tok_cols) <= width {
            cur_cols += tok_cols;
            cur.push(Span::styled(tok.text, tok.style));
            continue;
        }

        // A single token wider than the line.
        let mut remaining = tok.text.as_str();
        while !remaining.is_empty() {
            let room = width.saturating_sub(cur_cols).max(1);
            if UnicodeWidthStr::width(remaining) <= room {
                cur_cols += UnicodeWidthStr::width(remaining);
                cur.push(Span::styled(remaining.to_string(), tok.style));
                break;
            }
            let (head, tail) = split_prefer_url_breaks(remaining, room);
            let (head, tail) = if head.is_empty() {
                // Wider than the whole line by itself (e.g. a wide char in one column).
                let split = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
                remaining.split_at(split)
            } else {
                (head, tail)
            };
            cur.push(Span::styled(head.to_string(), tok.style));
            flush(&mut out, &mut cur, &mut cur_cols);
            remaining = tail;
        }
    }
    if !cur.is_empty() {
        flush(&mut out, &mut cur, &mut cur_cols);
    }
    out
}
