//! `ratatui-mdflow-core` holds the drawing primitives that the Markdown renderer targets.
//!
//! The Markdown crate produces a tree of elements and lays it out into `ratatui` lines; this crate
//! owns the pieces that are independent of Markdown itself:
//!
//! - [`theme::Theme`]: the style table used by every renderer.
//! - [`text::CodeHighlighter`]: capability for syntax highlighting code blocks.
//! - [`render`]: clipped span drawing and a one-column scrollbar.
//! - [`viewport::ViewportState`]: scroll offsets clamped to content size.
//!
//! Nothing here spawns threads or owns an event loop: the caller drives rendering.
pub mod theme;

pub mod text;

pub mod render;
pub mod viewport;
