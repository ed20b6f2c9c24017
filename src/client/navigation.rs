//! Ties a modal's open state to the back-navigation stack.
//!
//! On the web an open modal owns one synthetic history entry; on native it
//! owns one hardware-back listener. Every open pushes a [`ModalToken`] and
//! every close pops exactly one, whichever path closed it, so history depth
//! and listener count return to where they were.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub type ListenerId = u64;

/// The browser history API.
pub trait HistoryStack: Send + Sync {
    fn push_state(&self, marker: &str);

    /// Equivalent of `history.back()`.
    fn back(&self);

    fn depth(&self) -> usize;
}

/// The native hardware back button.
pub trait HardwareBack: Send + Sync {
    fn add_listener(&self) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

#[derive(Clone)]
pub enum Shell {
    Web(Arc<dyn HistoryStack>),
    Native(Arc<dyn HardwareBack>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Browser back or hardware back. On the web the entry is already gone.
    Back,
    /// Close button or any other code path.
    Programmatic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalToken {
    pub session: u64,
    listener: Option<ListenerId>,
}

pub struct ModalBackGuard {
    shell: Shell,
    name: String,
    sessions: Vec<ModalToken>,
    next_session: u64,
    pushed: u64,
    popped: u64,
    on_back_close: Option<Box<dyn FnMut() + Send>>,
}

impl ModalBackGuard {
    pub fn new(shell: Shell, name: impl Into<String>) -> Self {
        Self {
            shell,
            name: name.into(),
            sessions: Vec::new(),
            next_session: 0,
            pushed: 0,
            popped: 0,
            on_back_close: None,
        }
    }

    /// Called when a back action closes the modal.
    #[must_use]
    pub fn on_back_close(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_back_close = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sessions.is_empty()
    }

    /// Opening an open modal does nothing.
    pub fn open(&mut self) -> Option<&ModalToken> {
        if self.is_open() {
            return None;
        }

        self.next_session += 1;
        let session = self.next_session;

        let listener = match &self.shell {
            Shell::Web(history) => {
                history.push_state(&format!("modal:{}:{session}", self.name));
                None
            }
            Shell::Native(back) => Some(back.add_listener()),
        };

        self.sessions.push(ModalToken { session, listener });
        self.pushed += 1;
        debug!(modal = %self.name, session, "Modal opened");
        self.sessions.last()
    }

    /// Closes the modal. Returns false when it was not open.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        let Some(token) = self.sessions.pop() else {
            return false;
        };
        self.popped += 1;

        match (&self.shell, reason) {
            (Shell::Web(history), CloseReason::Programmatic) => history.back(),
            (Shell::Web(_), CloseReason::Back) => {}
            (Shell::Native(back), _) => {
                if let Some(id) = token.listener {
                    back.remove_listener(id);
                }
            }
        }

        debug_assert!(self.is_balanced());
        debug!(modal = %self.name, session = token.session, ?reason, "Modal closed");
        true
    }

    /// Routes a `popstate` or hardware back press. Returns whether the modal
    /// consumed it.
    pub fn handle_back(&mut self) -> bool {
        if !self.close(CloseReason::Back) {
            return false;
        }
        if let Some(callback) = self.on_back_close.as_mut() {
            callback();
        }
        true
    }

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.pushed - self.popped == self.sessions.len() as u64
    }
}

impl Drop for ModalBackGuard {
    fn drop(&mut self) {
        self.close(CloseReason::Programmatic);
    }
}

/// History stack kept in memory, with the popping behaviour of a browser.
#[derive(Debug)]
pub struct MemoryHistory {
    entries: Mutex<Vec<String>>,
}

impl MemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(vec!["/".to_string()]),
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStack for MemoryHistory {
    fn push_state(&self, marker: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(marker.to_string());
    }

    fn back(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() > 1 {
            entries.pop();
        }
    }

    fn depth(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackButton {
    listeners: Mutex<HashSet<ListenerId>>,
    next: AtomicU64,
}

impl MemoryBackButton {
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl HardwareBack for MemoryBackButton {
    fn add_listener(&self) -> ListenerId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn programmatic_close_restores_history_depth() {
        let history = Arc::new(MemoryHistory::new());
        let mut guard = ModalBackGuard::new(Shell::Web(history.clone()), "chart");
        let before = history.depth();

        assert!(guard.open().is_some());
        assert_eq!(history.depth(), before + 1);

        assert!(guard.close(CloseReason::Programmatic));
        assert_eq!(history.depth(), before);
        assert!(guard.is_balanced());
    }

    #[test]
    fn back_close_does_not_pop_twice() {
        let history = Arc::new(MemoryHistory::new());
        history.push_state("/dashboard");
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let mut guard = ModalBackGuard::new(Shell::Web(history.clone()), "chart")
            .on_back_close(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let before = history.depth();

        guard.open();
        // The browser pops the synthetic entry before dispatching popstate.
        history.back();
        assert!(guard.handle_back());

        assert_eq!(history.depth(), before);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!guard.handle_back());
    }

    #[test]
    fn rapid_cycles_stay_nested() {
        let history = Arc::new(MemoryHistory::new());
        let mut guard = ModalBackGuard::new(Shell::Web(history.clone()), "settings");
        let before = history.depth();

        for _ in 0..5 {
            guard.open();
            assert!(guard.open().is_none());
            guard.close(CloseReason::Programmatic);
            assert!(!guard.close(CloseReason::Programmatic));
        }

        assert_eq!(history.depth(), before);
        assert!(guard.is_balanced());
    }

    #[test]
    fn native_listener_registered_once_per_open() {
        let back = Arc::new(MemoryBackButton::default());
        let mut guard = ModalBackGuard::new(Shell::Native(back.clone()), "chart");

        for _ in 0..3 {
            guard.open();
            guard.open();
            assert_eq!(back.listener_count(), 1);
            assert!(guard.handle_back());
            assert_eq!(back.listener_count(), 0);
        }
    }

    #[test]
    fn drop_while_open_releases_entry() {
        let history = Arc::new(MemoryHistory::new());
        let before = history.depth();
        {
            let mut guard = ModalBackGuard::new(Shell::Web(history.clone()), "chart");
            guard.open();
        }
        assert_eq!(history.depth(), before);
    }
}
