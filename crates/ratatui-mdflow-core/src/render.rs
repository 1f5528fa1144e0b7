use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

use crate::viewport::ViewportState;

const TAB_COLS: usize = 4;

/// Draws a one-column scrollbar. The track stays blank when everything fits.
pub fn render_scrollbar(area: Rect, buf: &mut Buffer, state: &ViewportState, style: Style) {
    buf.set_style(area, style);
    let thumb = scrollbar_thumb(area.height, state);
    for dy in 0..area.height {
        let ch = match thumb {
            Some((top, len)) if dy >= top && dy < top + len => "█",
            _ => " ",
        };
        buf.set_stringn(area.x, area.y + dy, ch, 1, style);
    }
}

/// Thumb `(top, len)` within a track of `track_h` rows, or `None` when nothing scrolls.
fn scrollbar_thumb(track_h: u16, state: &ViewportState) -> Option<(u16, u16)> {
    let view_h = u64::from(state.viewport_h);
    let content_h = u64::from(state.content_h);
    if track_h == 0 || content_h <= view_h {
        return None;
    }
    let track = u64::from(track_h);
    let len = (view_h * track).div_ceil(content_h).clamp(1, track);
    let free = track - len;
    let max_y = content_h - view_h;
    let top = (u64::from(state.y).min(max_y) * free + max_y / 2) / max_y;
    Some((top as u16, len as u16))
}

/// Cursor over one screen row that skips `start_col` columns and stops after `max_cols`.
struct RowWriter<'a> {
    buf: &'a mut Buffer,
    x: u16,
    y: u16,
    start_col: usize,
    max_cols: usize,
    col: usize,
    out_cols: usize,
}

impl RowWriter<'_> {
    /// Returns `false` once the row is full.
    fn put(&mut self, ch: char, style: Style) -> bool {
        if ch == '\t' {
            for _ in 0..TAB_COLS {
                if !self.put(' ', style) {
                    return false;
                }
            }
            return true;
        }

        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if w == 0 {
            return true;
        }
        if self.col + w <= self.start_col {
            self.col += w;
            return true;
        }
        // A wide char straddling the left edge is dropped entirely.
        if self.col < self.start_col {
            self.col += w;
            return true;
        }
        if self.out_cols + w > self.max_cols {
            return false;
        }

        let mut tmp = [0u8; 4];
        let dx = self.out_cols as u16;
        if let Some(cell) = self.buf.cell_mut((self.x + dx, self.y)) {
            cell.set_style(style);
            cell.set_symbol(ch.encode_utf8(&mut tmp));
        }
        self.out_cols += 1;
        self.col += w;

        if w == 2 {
            if self.out_cols >= self.max_cols {
                return false;
            }
            let dx = self.out_cols as u16;
            if let Some(cell) = self.buf.cell_mut((self.x + dx, self.y)) {
                cell.set_style(style);
                cell.set_symbol("");
            }
            self.out_cols += 1;
        }
        true
    }
}

pub fn render_spans_clipped(
    x: u16,
    y: u16,
    start_col: u32,
    max_cols: u16,
    buf: &mut Buffer,
    spans: &[Span<'static>],
    fallback_style: Style,
) {
    if max_cols == 0 {
        return;
    }

    let mut row = RowWriter {
        buf,
        x,
        y,
        start_col: start_col as usize,
        max_cols: max_cols as usize,
        col: 0,
        out_cols: 0,
    };

    for span in spans {
        let style = if span.style == Style::default() {
            fallback_style
        } else {
            span.style
        };
        for ch in span.content.chars() {
            if !row.put(ch, style) {
                return;
            }
        }
    }
}

pub fn spans_width(spans: &[Span<'_>]) -> usize {
    spans
        .iter()
        .map(|s| UnicodeWidthStr::width(s.content.as_ref()))
        .sum()
}

pub fn line_width(line: &Line<'_>) -> usize {
    spans_width(&line.spans)
}

pub fn max_line_width(lines: &[Line<'_>]) -> usize {
    lines.iter().map(line_width).max().unwrap_or(0)
}

pub fn join_spans_plain(spans: &[Span<'_>]) -> String {
    let mut out = String::new();
    for s in spans {
        out.push_str(s.content.as_ref());
    }
    out
}

/// Layers each span's own style over `base`.
pub fn patch_spans_style(mut spans: Vec<Span<'static>>, base: Style) -> Vec<Span<'static>> {
    for s in &mut spans {
        s.style = base.patch(s.style);
    }
    spans
}
