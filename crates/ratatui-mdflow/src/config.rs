//! TOML configuration for parser, table sizing and view options.
//!
//! ```toml
//! [parser]
//! gfm = true
//! math = true
//!
//! [table]
//! padding = 2
//! min_column_width = 3
//! fallback_delay_ms = 400
//!
//! [view]
//! show_scrollbar = true
//! base_url = "https://example.com/docs/"
//! ```
//!
//! Every key is optional; missing keys take their defaults.
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::error::ConfigError;
use crate::parser::ParserOptions;
use crate::parser::PulldownParser;
use crate::table::TableSizing;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    pub parser: ParserConfig,
    pub table: TableConfig,
    pub view: ViewConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub gfm: bool,
    pub math: bool,
    pub max_input_bytes: Option<usize>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let options = ParserOptions::default();
        Self {
            gfm: options.gfm,
            math: options.math,
            max_input_bytes: None,
        }
    }
}

impl ParserConfig {
    pub fn options(&self) -> ParserOptions {
        ParserOptions {
            gfm: self.gfm,
            math: self.math,
        }
    }

    pub fn build(&self) -> PulldownParser {
        PulldownParser::new().with_max_input_bytes(self.max_input_bytes)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub padding: u16,
    pub min_column_width: u16,
    pub fallback_delay_ms: u64,
    pub fallback_column_width: u16,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::from(TableSizing::default())
    }
}

impl From<TableSizing> for TableConfig {
    fn from(sizing: TableSizing) -> Self {
        Self {
            padding: sizing.padding,
            min_column_width: sizing.min_column_width,
            fallback_delay_ms: u64::try_from(sizing.fallback_delay.as_millis()).unwrap_or(u64::MAX),
            fallback_column_width: sizing.fallback_column_width,
        }
    }
}

impl TableConfig {
    pub fn sizing(&self) -> TableSizing {
        TableSizing {
            padding: self.padding,
            min_column_width: self.min_column_width,
            fallback_delay: Duration::from_millis(self.fallback_delay_ms),
            fallback_column_width: self.fallback_column_width,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub show_scrollbar: bool,
    pub padding_left: u16,
    pub padding_right: u16,
    pub wrap: bool,
    pub base_url: Option<String>,
    pub show_link_destinations: bool,
    pub code_block_indent: u16,
    /// Keep a streaming view pinned to the bottom while text arrives.
    pub follow_tail: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            show_scrollbar: true,
            padding_left: 0,
            padding_right: 0,
            wrap: true,
            base_url: None,
            show_link_destinations: false,
            code_block_indent: 4,
            follow_tail: true,
        }
    }
}

impl MarkdownConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: MarkdownConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.padding == 0 && self.table.min_column_width == 0 {
            return Err(ConfigError::Invalid(
                "table.padding and table.min_column_width are both 0; columns may collapse"
                    .to_string(),
            ));
        }
        if self.table.fallback_column_width == 0 {
            return Err(ConfigError::Invalid(
                "table.fallback_column_width must be at least 1".to_string(),
            ));
        }
        if let Some(base) = self.view.base_url.as_deref()
            && let Err(err) = Url::parse(base)
        {
            return Err(ConfigError::Invalid(format!(
                "view.base_url `{base}` is not a valid url: {err}"
            )));
        }
        if self.parser.max_input_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "parser.max_input_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_config_is_default() {
        let config = MarkdownConfig::from_toml_str("").unwrap();
        assert_eq!(config, MarkdownConfig::default());
        assert_eq!(config.table.sizing(), TableSizing::default());
        assert_eq!(config.parser.options(), ParserOptions::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = MarkdownConfig::from_toml_str(
            r#"
            [parser]
            math = false
            max_input_bytes = 1024

            [table]
            padding = 32
            min_column_width = 100
            fallback_delay_ms = 250

            [view]
            base_url = "https://example.com/docs/"
            follow_tail = false
            "#,
        )
        .unwrap();
        assert!(config.parser.gfm);
        assert!(!config.parser.math);
        assert_eq!(config.parser.max_input_bytes, Some(1024));
        assert_eq!(
            config.table.sizing(),
            TableSizing {
                padding: 32,
                min_column_width: 100,
                fallback_delay: Duration::from_millis(250),
                fallback_column_width: 12,
            }
        );
        assert!(config.view.show_scrollbar);
        assert!(!config.view.follow_tail);
    }

    #[test]
    fn reference_sizing_round_trips_through_config() {
        let config = TableConfig::from(TableSizing::reference());
        assert_eq!(config.fallback_delay_ms, 400);
        assert_eq!(config.sizing(), TableSizing::reference());
    }

    #[test]
    fn rejects_collapsing_columns() {
        let err = MarkdownConfig::from_toml_str("[table]\npadding = 0\nmin_column_width = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_base_url() {
        let err = MarkdownConfig::from_toml_str("[view]\nbase_url = \"not a url\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reports_toml_errors() {
        let err = MarkdownConfig::from_toml_str("[table]\npadding = \"wide\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = MarkdownConfig::from_path("/definitely/not/here.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, Path::new("/definitely/not/here.toml"))
            }
            other => panic!("expected an io error, got {other:?}"),
        }
    }
}
