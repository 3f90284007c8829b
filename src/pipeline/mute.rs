//! Cooperative mute signal between Speak (writer) and Capture (reader).

use std::sync::Arc;
use tokio::sync::watch;

/// Shared "assistant is speaking" flag.
///
/// Backed by a `watch` cell so Capture can await the clear transition instead
/// of polling. Clones share the same cell.
#[derive(Debug, Clone)]
pub struct MuteFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl MuteFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Set the flag until the returned guard is dropped.
    pub fn hold(&self) -> MuteGuard {
        self.set();
        MuteGuard { flag: self.clone() }
    }

    /// Start watching the flag for one capture window.
    pub fn window(&self) -> MuteWindow {
        MuteWindow {
            rx: self.tx.subscribe(),
        }
    }

    /// Resolve once the flag is clear (immediately if it already is).
    pub async fn wait_clear(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|muted| !*muted).await;
    }
}

impl Default for MuteFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Remembers whether the flag moved since [`MuteFlag::window`] was called.
#[derive(Debug)]
pub struct MuteWindow {
    rx: watch::Receiver<bool>,
}

impl MuteWindow {
    /// True if the flag is set now or was set or cleared at any point since
    /// the window opened, even if playback has already finished.
    pub fn overlapped_playback(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().unwrap_or(true)
    }
}

/// Clears the mute flag on drop, including on early return or cancellation.
#[must_use = "the flag clears as soon as the guard is dropped"]
pub struct MuteGuard {
    flag: MuteFlag,
}

impl Drop for MuteGuard {
    fn drop(&mut self) {
        self.flag.clear();
    }
}
