//! Toasts: short-lived messages shown over the UI.
//!
//! The queue holds at most [`MAX_TOASTS`] entries. Each toast expires after its duration; expiry is tracked as a
//! deadline per toast, and the host's event loop calls [`Toasts::expire_due`] when a deadline passes.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use mirror::{ListenerKey, Listeners, listeners::notify_all, new_id, now_millis};

pub const MAX_TOASTS: usize = 4;
pub const DEFAULT_DURATION_MS: u64 = 2600;
pub const WARNING_DURATION_MS: u64 = 3200;
pub const ERROR_DURATION_MS: u64 = 3600;

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Success,
    Error,
    Info,
    Warning,
}

impl ToastKind {
    pub fn default_duration_ms(self) -> u64 {
        match self {
            ToastKind::Success | ToastKind::Info => DEFAULT_DURATION_MS,
            ToastKind::Warning => WARNING_DURATION_MS,
            ToastKind::Error => ERROR_DURATION_MS,
        }
    }
}

#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: String,
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
    pub created_at: i64,
}

#[derive(Default)]
struct ToastState {
    items: Vec<Toast>,
    // expiry time per toast id, in epoch milliseconds
    deadlines: HashMap<String, i64>,
    listeners: Listeners,
}

#[derive(Clone, Default)]
pub struct Toasts {
    state: Rc<RefCell<ToastState>>,
}

impl Toasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<Toast> {
        self.state.borrow().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().items.is_empty()
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> ListenerKey {
        self.state.borrow_mut().listeners.insert(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.state.borrow_mut().listeners.remove(key);
    }

    /// Show `message`. Without a duration the kind's default is used. Returns the toast id.
    pub fn push(&self, message: impl Into<String>, kind: ToastKind, duration_ms: Option<u64>) -> String {
        self.push_at(now_millis(), message, kind, duration_ms)
    }

    /// [`Toasts::push`] with an explicit clock reading.
    pub fn push_at(
        &self,
        now: i64,
        message: impl Into<String>,
        kind: ToastKind,
        duration_ms: Option<u64>,
    ) -> String {
        let duration_ms = duration_ms.unwrap_or_else(|| kind.default_duration_ms());
        let toast = Toast {
            id: new_id(),
            message: message.into(),
            kind,
            duration_ms,
            created_at: now,
        };
        let id = toast.id.clone();

        {
            let mut state = self.state.borrow_mut();
            while state.items.len() >= MAX_TOASTS {
                let oldest = state.items.remove(0);
                state.deadlines.remove(&oldest.id);
            }
            let deadline = now.saturating_add(i64::try_from(duration_ms).unwrap_or(i64::MAX));
            state.deadlines.insert(id.clone(), deadline);
            state.items.push(toast);
        }
        self.notify();
        id
    }

    pub fn success(&self, message: impl Into<String>) -> String {
        self.push(message, ToastKind::Success, None)
    }

    pub fn info(&self, message: impl Into<String>) -> String {
        self.push(message, ToastKind::Info, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> String {
        self.push(message, ToastKind::Warning, None)
    }

    pub fn error(&self, message: impl Into<String>) -> String {
        self.push(message, ToastKind::Error, None)
    }

    /// Dismiss a toast. Unknown ids are ignored.
    pub fn remove(&self, id: &str) {
        let removed = {
            let mut state = self.state.borrow_mut();
            state.deadlines.remove(id);
            let before = state.items.len();
            state.items.retain(|toast| toast.id != id);
            state.items.len() != before
        };
        if removed {
            self.notify();
        }
    }

    pub fn clear(&self) {
        let had_items = {
            let mut state = self.state.borrow_mut();
            state.deadlines.clear();
            !std::mem::take(&mut state.items).is_empty()
        };
        if had_items {
            self.notify();
        }
    }

    /// Remove every toast whose deadline is at or before `now`. Returns the removed ids.
    pub fn expire_due(&self, now: i64) -> Vec<String> {
        let expired = {
            let mut state = self.state.borrow_mut();
            let expired = state
                .deadlines
                .iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(id, _)| id.clone())
                .collect::<Vec<_>>();
            for id in &expired {
                state.deadlines.remove(id);
            }
            state.items.retain(|toast| !expired.contains(&toast.id));
            expired
        };
        if !expired.is_empty() {
            self.notify();
        }
        expired
    }

    /// When the next toast is due to expire.
    pub fn next_deadline(&self) -> Option<i64> {
        self.state.borrow().deadlines.values().min().copied()
    }

    fn notify(&self) {
        let listeners = self.state.borrow().listeners.pending_calls();
        notify_all(listeners);
    }
}
