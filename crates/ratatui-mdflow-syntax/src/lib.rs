//! Code block highlighting backends for `ratatui-mdflow`.
//!
//! Backends implement [`ratatui_mdflow_core::text::CodeHighlighter`] and are handed to a view with
//! `MarkdownView::set_highlighter`.
//!
//! - `syntect` (feature: `syntect`)
//!
//! [`default_highlighter`] picks the best backend compiled in and falls back to
//! [`NoHighlight`].
use std::sync::Arc;

pub use ratatui_mdflow_core::text::CodeHighlighter;
pub use ratatui_mdflow_core::text::NoHighlight;

#[cfg(feature = "syntect")]
pub mod syntect;

/// Highlighter shared by every view of an application.
pub fn default_highlighter() -> Arc<dyn CodeHighlighter + Send + Sync> {
    #[cfg(feature = "syntect")]
    {
        Arc::new(syntect::SyntectHighlighter::new())
    }
    #[cfg(not(feature = "syntect"))]
    {
        Arc::new(NoHighlight)
    }
}

/// Fence info strings people write versus the names syntax definitions use.
pub fn normalize_language(language: &str) -> &str {
    match language.trim().to_ascii_lowercase().as_str() {
        "rust" => "rs",
        "python" | "python3" => "py",
        "javascript" | "node" => "js",
        "typescript" => "ts",
        "shell" | "bash" | "zsh" | "console" => "sh",
        "yml" => "yaml",
        "c++" => "cpp",
        "markdown" => "md",
        _ => language.trim(),
    }
}
