//! Streaming Markdown rendering for `ratatui`.
//!
//! Text flows through four stages:
//!
//! 1. [`parser::Parser`] turns source into a [`ast::MarkdownNode`] tree.
//! 2. [`renderer::MarkdownRenderer`] dispatches every node (per-type [`renderer::Overrides`]
//!    first) and uses [`reconcile::plan`] to group inline runs into text flows and rows.
//! 3. [`layout::layout_document`] turns the resulting [`element::Element`] tree into lines,
//!    sizing tables through a [`table::TableRegistry`].
//! 4. [`view::MarkdownView`] draws those lines into a scrollable viewport.
//!
//! For token-by-token output, share a [`session::MarkdownSession`] between the producer and a
//! [`stream::MarkdownStreamView`]: the producer appends, the view re-parses on the next draw.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ratatui_mdflow::session::MarkdownSession;
//! use ratatui_mdflow::stream::MarkdownStreamView;
//!
//! let session = MarkdownSession::new();
//! let mut view = MarkdownStreamView::new(Arc::clone(&session));
//! std::thread::spawn(move || session.append("# Hello\n\n| a | b |\n|---|---|\n| 1 | 2 |\n"));
//! # let _ = &mut view;
//! ```
pub mod ast;
pub mod config;
pub mod element;
pub mod error;
pub mod karaoke;
pub mod layout;
pub mod math;
pub mod parser;
pub mod reconcile;
pub mod renderer;
pub mod session;
pub mod stream;
pub mod table;
pub mod view;

pub use ast::MarkdownNode;
pub use ast::NodeType;
pub use config::MarkdownConfig;
pub use element::Element;
pub use error::ConfigError;
pub use error::ParseError;
pub use parser::Parser;
pub use parser::ParserOptions;
pub use parser::PulldownParser;
pub use renderer::MarkdownRenderer;
pub use renderer::Overrides;
pub use session::MarkdownSession;
pub use stream::MarkdownStreamView;
pub use view::MarkdownView;
pub use view::MarkdownViewOptions;
