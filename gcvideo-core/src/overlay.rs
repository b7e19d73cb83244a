//! On-screen messages and debug text.
//!
//! Messages are added from any thread through an [`OverlayHandle`] and drawn
//! by the renderer while it holds the overlay lock during a present.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long a message stays on screen.
pub mod duration {
    use std::time::Duration;

    pub const SHORT: Duration = Duration::from_millis(2000);
    pub const NORMAL: Duration = Duration::from_millis(5000);
    pub const VERY_LONG: Duration = Duration::from_millis(10000);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Message {
    text: String,
    expires: Instant,
}

/// Pending on-screen messages, oldest first.
#[derive(Debug, Default)]
pub struct Overlay {
    messages: Vec<Message>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, text: impl Into<String>, duration: Duration) {
        self.add_message_at(text, duration, Instant::now());
    }

    pub fn add_message_at(&mut self, text: impl Into<String>, duration: Duration, now: Instant) {
        let text = text.into();
        log::info!("OSD: {text}");
        self.messages.push(Message {
            text,
            expires: now + duration,
        });
    }

    /// Drops expired messages and returns the remaining ones.
    pub fn active_messages(&mut self, now: Instant) -> Vec<String> {
        self.messages.retain(|m| m.expires > now);
        self.messages.iter().map(|m| m.text.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Shared access to the overlay from the host and video threads.
#[derive(Debug, Clone, Default)]
pub struct OverlayHandle(Arc<Mutex<Overlay>>);

impl OverlayHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Overlay> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_message(&self, text: impl Into<String>, duration: Duration) {
        self.lock().add_message(text, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_expire() {
        let mut overlay = Overlay::new();
        let start = Instant::now();
        overlay.add_message_at("short", duration::SHORT, start);
        overlay.add_message_at("long", duration::VERY_LONG, start);

        assert_eq!(overlay.active_messages(start), vec!["short", "long"]);
        let later = start + Duration::from_secs(3);
        assert_eq!(overlay.active_messages(later), vec!["long"]);
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn handle_clones_share_messages() {
        let handle = OverlayHandle::new();
        let host_side = handle.clone();
        host_side.add_message("Screenshot saved", duration::NORMAL);
        assert_eq!(handle.lock().len(), 1);
    }
}
