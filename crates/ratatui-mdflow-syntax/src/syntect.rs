use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Span;
use ratatui_mdflow_core::text::CodeHighlighter;
use syntect::easy::HighlightLines;
use syntect::highlighting::FontStyle;
use syntect::highlighting::Style as SynStyle;
use syntect::highlighting::Theme;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxReference;
use syntect::parsing::SyntaxSet;
use tracing::debug;

use crate::normalize_language;

const DEFAULT_THEME: &str = "base16-ocean.dark";

/// `syntect` backend with the bundled syntax definitions and themes.
pub struct SyntectHighlighter {
    syntax_set: SyntaxSet,
    themes: ThemeSet,
    theme: Theme,
}

impl SyntectHighlighter {
    pub fn new() -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let themes = ThemeSet::load_defaults();
        let theme = pick_theme(&themes, DEFAULT_THEME);
        Self {
            syntax_set,
            themes,
            theme,
        }
    }

    /// Switches to a bundled theme by name; unknown names keep the current theme.
    pub fn with_theme(mut self, name: &str) -> Self {
        match self.themes.themes.get(name) {
            Some(theme) => self.theme = theme.clone(),
            None => debug!(name, "unknown syntect theme"),
        }
        self
    }

    pub fn theme_names(&self) -> impl Iterator<Item = &str> {
        self.themes.themes.keys().map(String::as_str)
    }

    fn syntax_for(&self, language: Option<&str>) -> &SyntaxReference {
        let Some(lang) = language.map(normalize_language).filter(|l| !l.is_empty()) else {
            return self.syntax_set.find_syntax_plain_text();
        };
        self.syntax_set
            .find_syntax_by_extension(lang)
            .or_else(|| self.syntax_set.find_syntax_by_token(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeHighlighter for SyntectHighlighter {
    fn highlight_lines(&self, language: Option<&str>, lines: &[&str]) -> Vec<Vec<Span<'static>>> {
        let syntax = self.syntax_for(language);
        let mut highlighter = HighlightLines::new(syntax, &self.theme);

        let mut out: Vec<Vec<Span<'static>>> = Vec::with_capacity(lines.len());
        let mut with_newline = String::new();
        for line in lines {
            // The newline-aware syntaxes need the terminator to close line comments and strings.
            with_newline.clear();
            with_newline.push_str(line);
            with_newline.push('\n');
            let regions = highlighter
                .highlight_line(&with_newline, &self.syntax_set)
                .unwrap_or_default();
            let mut spans: Vec<Span<'static>> = Vec::new();
            for (style, s) in regions {
                let s = s.trim_end_matches('\n');
                if s.is_empty() {
                    continue;
                }
                spans.push(Span::styled(s.to_string(), syn_style_to_ratatui(style)));
            }
            if spans.is_empty() {
                spans.push(Span::raw((*line).to_string()));
            }
            out.push(spans);
        }
        out
    }

    fn background_color(&self) -> Option<Color> {
        self.theme
            .settings
            .background
            .map(|c| Color::Rgb(c.r, c.g, c.b))
    }
}

fn pick_theme(themes: &ThemeSet, name: &str) -> Theme {
    themes
        .themes
        .get(name)
        .cloned()
        .or_else(|| themes.themes.values().next().cloned())
        .unwrap_or_default()
}

fn syn_style_to_ratatui(s: SynStyle) -> Style {
    let mut out = Style::default().fg(Color::Rgb(s.foreground.r, s.foreground.g, s.foreground.b));

    if s.font_style.contains(FontStyle::BOLD) {
        out = out.add_modifier(Modifier::BOLD);
    }
    if s.font_style.contains(FontStyle::ITALIC) {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if s.font_style.contains(FontStyle::UNDERLINE) {
        out = out.add_modifier(Modifier::UNDERLINED);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_span_vector_per_line() {
        let h = SyntectHighlighter::new();
        let many = h.highlight_lines(Some("rust"), &["fn main() {", "}", ""]);
        assert_eq!(many.len(), 3);
        let text: String = many[0].iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "fn main() {");
        assert_eq!(many[2][0].content, "");
    }

    #[test]
    fn unknown_language_falls_back_to_plain_text() {
        let h = SyntectHighlighter::new();
        let out = h.highlight_lines(Some("no-such-language"), &["plain"]);
        let text: String = out[0].iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "plain");
    }

    #[test]
    fn unknown_theme_keeps_current() {
        let h = SyntectHighlighter::new().with_theme("missing");
        assert!(h.background_color().is_some());
        assert!(h.theme_names().any(|n| n == DEFAULT_THEME));
    }
}
