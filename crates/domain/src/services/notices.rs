//! Ephemeral site banner: one notice at a time, dismissed automatically.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticePosition {
    Top,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoticeState {
    pub message: String,
    pub kind: Option<NoticeKind>,
    pub is_visible: bool,
    pub position: NoticePosition,
}

#[derive(Debug, Default)]
struct Inner {
    state: NoticeState,
    generation: u64,
}

/// Shared notice holder. Each `show` supersedes the previous notice, and
/// only the timer armed by the latest `show` may hide it.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    inner: Arc<Mutex<Inner>>,
    dismiss_after: Duration,
}

impl NoticeBoard {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            dismiss_after,
        }
    }

    pub fn dismiss_after(&self) -> Duration {
        self.dismiss_after
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock still holds a consistent notice; keep serving it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Displays `message` and arms the auto-dismiss timer. Must run inside a
    /// tokio runtime.
    pub fn show(&self, message: impl Into<String>, kind: NoticeKind, position: Option<NoticePosition>) {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = NoticeState {
                message: message.into(),
                kind: Some(kind),
                is_visible: true,
                position: position.unwrap_or_default(),
            };
            inner.generation
        };
        debug!(generation, ?kind, "notice shown");

        let board = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(board.dismiss_after).await;
            board.hide_generation(generation);
        });
    }

    /// Hides the current notice and clears its message and kind.
    pub fn hide(&self) {
        let mut inner = self.lock();
        clear(&mut inner.state);
    }

    fn hide_generation(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            clear(&mut inner.state);
            debug!(generation, "notice dismissed");
        }
    }

    pub fn snapshot(&self) -> NoticeState {
        self.lock().state.clone()
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(Duration::from_millis(5_000))
    }
}

fn clear(state: &mut NoticeState) {
    state.is_visible = false;
    state.message.clear();
    state.kind = None;
}
