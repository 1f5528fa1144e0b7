use ratatui::style::Color;
use ratatui::style::Style;
use ratatui::text::Span;

/// Syntax highlighting capability for fenced code blocks.
///
/// Implementations return one span vector per input line.
pub trait CodeHighlighter {
    fn highlight_lines(&self, language: Option<&str>, lines: &[&str]) -> Vec<Vec<Span<'static>>>;

    fn highlight_text(&self, language: Option<&str>, text: &str) -> Vec<Vec<Span<'static>>> {
        let mut lines: Vec<&str> = text.split('\n').collect();
        if lines.is_empty() {
            lines.push("");
        }
        self.highlight_lines(language, &lines)
    }

    fn background_color(&self) -> Option<Color> {
        None
    }
}

/// Passes code through unstyled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHighlight;

impl CodeHighlighter for NoHighlight {
    fn highlight_lines(&self, _language: Option<&str>, lines: &[&str]) -> Vec<Vec<Span<'static>>> {
        lines
            .iter()
            .map(|l| vec![Span::styled((*l).to_string(), Style::default())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_text_splits_on_newlines() {
        let out = NoHighlight.highlight_text(Some("rs"), "fn a() {}\nfn b() {}");
        assert_eq!(out.len(), 2);
        assert_eq!(out[1][0].content, "fn b() {}");
    }
}
