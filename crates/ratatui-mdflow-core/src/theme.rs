use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;

/// Style table shared by the Markdown renderers.
///
/// Colors follow a dark palette; override individual fields to re-theme.
#[derive(Clone, Debug, PartialEq)]
pub struct Theme {
    pub text_primary: Style,
    pub text_muted: Style,
    /// Text that sits directly in a block, outside any emphasis, link or heading.
    pub text_plain: Style,
    pub accent: Style,
    pub danger: Style,
    pub link: Style,
    pub code_inline: Style,
    pub code_block: Style,
    pub heading: [Style; 6],
    pub blockquote: Style,
    pub table_border: Style,
    pub table_header: Style,
    pub table_row_odd: Style,
    pub math: Style,
    /// Applied on top of text that the karaoke position has already passed.
    pub highlight: Style,
}

impl Theme {
    pub fn heading_style(&self, level: u8) -> Style {
        let idx = usize::from(level.clamp(1, 6)) - 1;
        self.heading[idx]
    }
}

impl Default for Theme {
    fn default() -> Self {
        use ratatui::style::Stylize;

        let heading = Style::default().bold();
        Self {
            text_primary: Style::default(),
            text_muted: Style::default().dark_gray(),
            text_plain: Style::default(),
            accent: Style::default().cyan(),
            danger: Style::default().fg(Color::Rgb(0xf8, 0x71, 0x71)),
            link: Style::default()
                .fg(Color::Rgb(0x60, 0xa5, 0xfa))
                .add_modifier(Modifier::UNDERLINED),
            code_inline: Style::default().fg(Color::Rgb(0xf4, 0x72, 0xb6)),
            code_block: Style::default().fg(Color::Rgb(0xe5, 0xe7, 0xeb)),
            heading: [
                heading.add_modifier(Modifier::UNDERLINED),
                heading,
                heading,
                heading,
                heading,
                heading.dark_gray(),
            ],
            blockquote: Style::default().dark_gray(),
            table_border: Style::default().fg(Color::Rgb(0x37, 0x41, 0x51)),
            table_header: Style::default()
                .fg(Color::Rgb(0x9c, 0xa3, 0xaf))
                .add_modifier(Modifier::BOLD),
            table_row_odd: Style::default(),
            math: Style::default().fg(Color::Rgb(0xf4, 0x72, 0xb6)),
            highlight: Style::default().fg(Color::Rgb(0xfb, 0xbf, 0x24)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_style_clamps_level() {
        let theme = Theme::default();
        assert_eq!(theme.heading_style(0), theme.heading[0]);
        assert_eq!(theme.heading_style(9), theme.heading[5]);
        assert!(theme.heading_style(1).add_modifier.contains(Modifier::UNDERLINED));
    }
}
