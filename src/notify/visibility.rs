use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Tracks whether the display is hidden, and since when.
///
/// The display side calls `hide`/`restore`; the notification side reads `hidden_for` and
/// subscribes to learn when the display comes back.
#[derive(Debug, Clone)]
pub struct Visibility {
    hidden_since: Arc<watch::Sender<Option<Instant>>>,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new()
    }
}

impl Visibility {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            hidden_since: Arc::new(tx),
        }
    }

    /// Hiding an already hidden display keeps the original timestamp.
    pub fn hide(&self) {
        self.hidden_since.send_if_modified(|since| {
            if since.is_none() {
                *since = Some(Instant::now());
                true
            } else {
                false
            }
        });
    }

    pub fn restore(&self) {
        self.hidden_since.send_if_modified(|since| since.take().is_some());
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_since.borrow().is_some()
    }

    pub fn hidden_for(&self) -> Option<Duration> {
        self.hidden_since.borrow().map(|since| since.elapsed())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Instant>> {
        self.hidden_since.subscribe()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_hidden_for_tracks_first_hide() {
        let visibility = Visibility::new();
        assert_eq!(visibility.hidden_for(), None);

        visibility.hide();
        tokio::time::advance(Duration::from_secs(10)).await;
        visibility.hide();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(visibility.hidden_for(), Some(Duration::from_secs(15)));

        visibility.restore();
        assert!(!visibility.is_hidden());
        assert_eq!(visibility.hidden_for(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_restore() {
        let visibility = Visibility::new();
        visibility.hide();

        let mut rx = visibility.subscribe();
        assert!(rx.borrow_and_update().is_some());

        visibility.restore();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
