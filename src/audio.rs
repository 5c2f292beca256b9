//! Audio collaborator port. Audio prompt playback is an external
//! collaborator; the core only needs the interface it consumes.

/// Non-blocking prompt queue. Event names the core emits:
/// `"device_ready"`, `"scan_ok"` (optional), `"network_lost"`.
pub trait AudioPort: Send + Sync {
    fn enqueue(&self, event_name: &str);
}

/// Selected at startup when no real audio backend is configured
/// (`speaker_enabled = false` or the platform has none).
#[derive(Debug, Default)]
pub struct NullAudioPort;

impl AudioPort for NullAudioPort {
    fn enqueue(&self, _event_name: &str) {}
}
