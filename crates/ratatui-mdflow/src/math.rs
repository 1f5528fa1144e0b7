use ratatui::text::Line;
use ratatui::text::Span;

/// Typesetting backend for `$inline$` and `$$display$$` math.
///
/// Returning `None` makes the layout fall back to the raw TeX source in the theme's math style.
pub trait MathRenderer: Send + Sync {
    fn render_inline(&self, tex: &str) -> Option<Vec<Span<'static>>>;

    fn render_block(&self, tex: &str) -> Option<Vec<Line<'static>>>;
}

/// Always falls back to raw TeX.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainMath;

impl MathRenderer for PlainMath {
    fn render_inline(&self, _tex: &str) -> Option<Vec<Span<'static>>> {
        None
    }

    fn render_block(&self, _tex: &str) -> Option<Vec<Line<'static>>> {
        None
    }
}
