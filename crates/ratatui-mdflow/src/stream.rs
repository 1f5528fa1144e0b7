//! A [`MarkdownView`] bound to a [`MarkdownSession`].
//!
//! The session listener only flips a flag, so producers never wait on layout. The next draw
//! re-parses the whole text if the session version moved, and reads the karaoke position every
//! frame since position updates do not notify.
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Instant;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui_mdflow_core::theme::Theme;
use tracing::trace;

use crate::session::MarkdownSession;
use crate::session::Subscription;
use crate::view::MarkdownView;

pub struct MarkdownStreamView {
    session: Arc<MarkdownSession>,
    subscription: Subscription,
    dirty: Arc<AtomicBool>,
    seen_version: Option<u64>,
    view: MarkdownView,
    follow_tail: bool,
}

impl std::fmt::Debug for MarkdownStreamView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownStreamView")
            .field("session", &self.session)
            .field("seen_version", &self.seen_version)
            .field("follow_tail", &self.follow_tail)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl MarkdownStreamView {
    pub fn new(session: Arc<MarkdownSession>) -> Self {
        Self::with_view(session, MarkdownView::new())
    }

    pub fn with_view(session: Arc<MarkdownSession>, view: MarkdownView) -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&dirty);
        let subscription = session.add_listener(move || flag.store(true, Ordering::Release));
        Self {
            session,
            subscription,
            dirty,
            seen_version: None,
            view,
            follow_tail: true,
        }
    }

    pub fn session(&self) -> &Arc<MarkdownSession> {
        &self.session
    }

    pub fn view(&self) -> &MarkdownView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut MarkdownView {
        &mut self.view
    }

    /// While enabled, a view scrolled to the bottom stays there as text arrives.
    pub fn set_follow_tail(&mut self, follow: bool) {
        self.follow_tail = follow;
    }

    pub fn follow_tail(&self) -> bool {
        self.follow_tail
    }

    /// Whether the next draw would differ from the last one.
    pub fn needs_redraw(&self, now: Instant) -> bool {
        self.dirty.load(Ordering::Acquire)
            || self.session.highlight_position() != self.view.highlight_position()
            || self.view.next_redraw_deadline().is_some_and(|d| now >= d)
    }

    /// Earliest instant a pending table fallback needs a redraw.
    pub fn next_redraw_deadline(&self) -> Option<Instant> {
        self.view.next_redraw_deadline()
    }

    /// Pulls session state into the view. Returns `true` if the text was re-parsed.
    pub fn sync(&mut self) -> bool {
        self.view
            .set_highlight_position(self.session.highlight_position());
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return false;
        }
        let (version, text) = self.session.snapshot();
        if self.seen_version == Some(version) {
            return false;
        }
        trace!(version, len = text.len(), "stream view reparse");
        self.seen_version = Some(version);
        self.view.set_markdown(&text);
        true
    }

    pub fn render_ref(&mut self, area: Rect, buf: &mut Buffer, theme: &Theme) {
        self.render_ref_at(area, buf, theme, Instant::now());
    }

    pub fn render_ref_at(&mut self, area: Rect, buf: &mut Buffer, theme: &Theme, now: Instant) {
        let was_at_bottom = self.view.is_at_bottom();
        self.sync();
        self.view.render_ref_at(area, buf, theme, now);
        if self.follow_tail && was_at_bottom && !self.view.is_at_bottom() {
            self.view.scroll_to_bottom();
            self.view.render_ref_at(area, buf, theme, now);
        }
    }

    pub fn lines_for_width(&mut self, width: u16, theme: &Theme) -> Vec<Line<'static>> {
        self.sync();
        self.view.lines_for_width(width, theme)
    }
}

impl Drop for MarkdownStreamView {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::MarkdownViewOptions;
    use pretty_assertions::assert_eq;
    use ratatui_mdflow_core::render::join_spans_plain;

    fn plain(lines: &[Line<'static>]) -> Vec<String> {
        lines.iter().map(|l| join_spans_plain(&l.spans)).collect()
    }

    #[test]
    fn reparses_only_when_the_session_changes() {
        let session = MarkdownSession::new();
        let mut stream = MarkdownStreamView::new(Arc::clone(&session));
        let theme = Theme::default();

        assert!(stream.sync());
        assert!(!stream.sync());

        session.append("Hello");
        assert!(stream.needs_redraw(Instant::now()));
        assert_eq!(plain(&stream.lines_for_width(20, &theme)), vec!["Hello"]);

        session.append(" **world**");
        assert_eq!(plain(&stream.lines_for_width(20, &theme)), vec!["Hello world"]);
        assert!(!stream.sync());
    }

    #[test]
    fn highlight_position_is_read_every_frame() {
        let session = MarkdownSession::new();
        session.append("one two three");
        let mut stream = MarkdownStreamView::new(Arc::clone(&session));
        let theme = Theme::default();
        stream.lines_for_width(20, &theme);
        assert!(!stream.needs_redraw(Instant::now()));

        session.set_highlight_position(2);
        assert!(stream.needs_redraw(Instant::now()));
        stream.lines_for_width(20, &theme);
        assert_eq!(stream.view().highlight_position(), 2);
        assert!(!stream.needs_redraw(Instant::now()));
    }

    #[test]
    fn follows_the_tail_while_at_bottom() {
        let session = MarkdownSession::new();
        let view = MarkdownView::with_options(MarkdownViewOptions {
            show_scrollbar: false,
            ..Default::default()
        });
        let mut stream = MarkdownStreamView::with_view(Arc::clone(&session), view);
        let theme = Theme::default();
        let area = Rect::new(0, 0, 10, 3);

        for i in 0..10 {
            session.append(&format!("line {i}\n\n"));
            let mut buf = Buffer::empty(area);
            stream.render_ref(area, &mut buf, &theme);
        }
        assert!(stream.view().is_at_bottom());
        assert!(stream.view().state.y > 0);

        stream.view_mut().scroll_y_by(-5);
        let y = stream.view().state.y;
        session.append("more\n\n");
        let mut buf = Buffer::empty(area);
        stream.render_ref(area, &mut buf, &theme);
        assert_eq!(stream.view().state.y, y);
    }

    #[test]
    fn drop_unsubscribes() {
        let session = MarkdownSession::new();
        let stream = MarkdownStreamView::new(Arc::clone(&session));
        assert_eq!(session.listener_count(), 1);
        drop(stream);
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn closed_session_renders_nothing() {
        let session = MarkdownSession::new();
        session.append("text");
        session.close();
        let mut stream = MarkdownStreamView::new(Arc::clone(&session));
        assert_eq!(session.listener_count(), 0);
        let lines = stream.lines_for_width(20, &Theme::default());
        assert!(lines.is_empty());
    }
}
