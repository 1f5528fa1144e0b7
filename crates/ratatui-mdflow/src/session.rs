//! A shared, thread-safe Markdown text buffer for token-by-token streaming.
//!
//! Producers call [`MarkdownSession::append`] from any thread; renderers subscribe with
//! [`MarkdownSession::add_listener`] and re-parse the whole text on notification.
//!
//! ## Threading contract
//!
//! Listeners run synchronously on the thread that performed the mutation, after the session lock
//! has been released, in registration order. They see a snapshot of the listener list taken under
//! the lock, so a listener may append, subscribe, or dispose (itself included) without
//! deadlocking. Listeners that touch UI state must hop to the UI thread themselves.
//!
//! [`MarkdownSession::set_highlight_position`] never notifies.
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct State {
    buffer: String,
    version: u64,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    closed: bool,
}

#[derive(Default)]
pub struct MarkdownSession {
    state: Mutex<State>,
    highlight_position: AtomicUsize,
}

impl std::fmt::Debug for MarkdownSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MarkdownSession")
            .field("len", &state.buffer.len())
            .field("version", &state.version)
            .field("listeners", &state.listeners.len())
            .field("closed", &state.closed)
            .field("highlight_position", &self.highlight_position())
            .finish()
    }
}

impl MarkdownSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends `chunk`, bumps the version and notifies listeners.
    ///
    /// No-op after [`close`](Self::close).
    pub fn append(&self, chunk: &str) {
        let listeners = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.buffer.push_str(chunk);
            state.version += 1;
            debug!(
                version = state.version,
                bytes = chunk.len(),
                total = state.buffer.len(),
                "session append"
            );
            snapshot_listeners(&state)
        };
        notify(&listeners);
    }

    /// Empties the buffer and resets the highlight position as one mutation, then notifies.
    pub fn clear(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.buffer.clear();
            state.version += 1;
            self.highlight_position.store(0, Ordering::Release);
            debug!(version = state.version, "session clear");
            snapshot_listeners(&state)
        };
        notify(&listeners);
    }

    pub fn get_all_text(&self) -> String {
        self.state.lock().buffer.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Version and text read under one lock.
    pub fn snapshot(&self) -> (u64, String) {
        let state = self.state.lock();
        (state.version, state.buffer.clone())
    }

    pub fn highlight_position(&self) -> usize {
        self.highlight_position.load(Ordering::Acquire)
    }

    pub fn set_highlight_position(&self, position: usize) {
        if self.is_closed() {
            return;
        }
        self.highlight_position.store(position, Ordering::Release);
    }

    pub fn add_listener<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Subscription {
                session: Weak::new(),
                id: 0,
                disposed: true,
            };
        }
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        trace!(id, count = state.listeners.len(), "session listener added");
        Subscription {
            session: Arc::downgrade(self),
            id,
            disposed: false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Tears the session down: drops listeners and text, and turns every later mutation into a
    /// no-op.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.listeners.clear();
        state.buffer = String::new();
        self.highlight_position.store(0, Ordering::Release);
        debug!(version = state.version, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn remove_listener(&self, id: u64) {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _)| *lid != id);
        if state.listeners.len() != before {
            trace!(id, count = state.listeners.len(), "session listener removed");
        }
    }
}

fn snapshot_listeners(state: &State) -> Vec<Listener> {
    state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
}

fn notify(listeners: &[Listener]) {
    for listener in listeners {
        listener();
    }
}

/// Handle returned by [`MarkdownSession::add_listener`].
///
/// Dropping it does not unsubscribe; call [`dispose`](Self::dispose).
#[must_use = "the listener stays registered until `dispose` is called"]
#[derive(Debug)]
pub struct Subscription {
    session: Weak<MarkdownSession>,
    id: u64,
    disposed: bool,
}

impl Subscription {
    /// Deregisters the listener. Later calls, or calls after the session is gone, do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(session) = self.session.upgrade() {
            session.remove_listener(self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicU32;

    fn counter() -> (Arc<AtomicU32>, impl Fn() + Send + Sync + 'static) {
        let n = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&n);
        (n, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn append_concatenates_in_order() {
        let session = MarkdownSession::new();
        session.append("Hello, ");
        session.append("**world**");
        assert_eq!(session.get_all_text(), "Hello, **world**");
        assert_eq!(session.version(), 2);
    }

    #[test]
    fn clear_resets_text_and_highlight() {
        let session = MarkdownSession::new();
        session.append("some words here");
        session.set_highlight_position(2);
        session.clear();
        assert_eq!(session.get_all_text(), "");
        assert_eq!(session.highlight_position(), 0);
        assert_eq!(session.version(), 2);
    }

    #[test]
    fn highlight_does_not_notify() {
        let session = MarkdownSession::new();
        let (hits, f) = counter();
        let _sub = session.add_listener(f);
        session.set_highlight_position(7);
        assert_eq!(session.highlight_position(), 7);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_fire_once_per_mutation() {
        let session = MarkdownSession::new();
        let (hits, f) = counter();
        let _sub = session.add_listener(f);
        session.append("a");
        session.append("b");
        session.clear();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let session = MarkdownSession::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            subs.push(session.add_listener(move || order.lock().push(i)));
        }
        session.append("x");
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn dispose_stops_notifications_and_is_idempotent() {
        let session = MarkdownSession::new();
        let (hits, f) = counter();
        let mut sub = session.add_listener(f);
        session.append("a");
        sub.dispose();
        sub.dispose();
        session.append("b");
        session.clear();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(sub.is_disposed());
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn listener_may_reenter_the_session() {
        let session = MarkdownSession::new();
        let seen = Arc::new(Mutex::new(String::new()));
        let (s, out) = (Arc::clone(&session), Arc::clone(&seen));
        let _sub = session.add_listener(move || {
            *out.lock() = s.get_all_text();
            let (_, inner) = counter();
            let mut nested = s.add_listener(inner);
            nested.dispose();
        });
        session.append("reentrant");
        assert_eq!(*seen.lock(), "reentrant");
    }

    #[test]
    fn listener_may_dispose_itself() {
        let session = MarkdownSession::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (hits, f) = counter();
        let inner = Arc::clone(&slot);
        let sub = session.add_listener(move || {
            f();
            if let Some(mut sub) = inner.lock().take() {
                sub.dispose();
            }
        });
        *slot.lock() = Some(sub);
        session.append("a");
        session.append("b");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_makes_mutations_noops() {
        let session = MarkdownSession::new();
        let (hits, f) = counter();
        let _sub = session.add_listener(f);
        session.append("before");
        session.close();
        session.append("after");
        session.clear();
        session.set_highlight_position(3);
        assert!(session.is_closed());
        assert_eq!(session.get_all_text(), "");
        assert_eq!(session.highlight_position(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let late = session.add_listener(|| {});
        assert!(late.is_disposed());
    }

    #[test]
    fn dispose_after_drop_is_harmless() {
        let session = MarkdownSession::new();
        let mut sub = session.add_listener(|| {});
        drop(session);
        sub.dispose();
        assert!(sub.is_disposed());
    }

    #[test]
    fn snapshot_pairs_version_with_text() {
        let session = MarkdownSession::new();
        session.append("a");
        assert_eq!(session.snapshot(), (1, "a".to_string()));
    }
}
