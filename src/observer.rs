//! UI observer channel — replaces the Python original's callback-based
//! `ScanCallback` with a bounded `mpsc` channel: the Scanner never blocks
//! on send, and observer channels drop events on full rather than block.

use tokio::sync::mpsc;

/// One completed append, reported to any live-count UI.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub entry_no: i32,
    pub formatted_barcode: String,
}

/// Sending half held by the Scanner task. `report` never blocks and never
/// panics on a full or closed channel; a dropped event is simply not
/// counted by the UI — these channels are advisory, not durable.
#[derive(Debug, Clone)]
pub struct ScanObserver {
    tx: mpsc::Sender<ScanEvent>,
}

impl ScanObserver {
    pub fn report(&self, entry_no: i32, formatted_barcode: &str) {
        let event = ScanEvent {
            entry_no,
            formatted_barcode: formatted_barcode.to_string(),
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            tracing::debug!(entry_no, "scan observer channel full, dropping event");
        }
    }
}

/// Creates a bounded observer channel. `capacity` bounds how many unread
/// events the UI side may lag by before new ones are dropped.
pub fn channel(capacity: usize) -> (ScanObserver, mpsc::Receiver<ScanEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ScanObserver { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn report_delivers_event_to_receiver() {
        let (observer, mut rx) = channel(4);
        observer.report(1, "abc123");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.entry_no, 1);
        assert_eq!(event.formatted_barcode, "abc123");
    }

    #[tokio::test]
    async fn report_drops_silently_when_channel_is_full() {
        let (observer, mut rx) = channel(1);
        observer.report(1, "a");
        observer.report(2, "b"); // dropped, buffer already holds one event
        let first = rx.recv().await.unwrap();
        assert_eq!(first.entry_no, 1);
    }
}
