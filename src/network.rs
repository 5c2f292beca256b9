//! Network Monitor task. Probes TCP reachability on a
//! fixed cadence and fires the `"network_lost"` audio event once per
//! outage. Independent of the Flush Worker's own connect-failure signal —
//! the two may double-fire.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::AudioPort;

const PROBE_PORT: u16 = 53;
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Consecutive-failure counter and one-shot alert latch, factored out of
/// the task loop so the state-transition logic can be unit tested without
/// a real socket.
#[derive(Debug, Default)]
struct MonitorState {
    fail_count: u32,
    alerted: bool,
}

impl MonitorState {
    /// Folds in one probe result. Returns `true` exactly on the transition
    /// into the alerted state, i.e. the moment the audio event should fire.
    fn on_probe(&mut self, reachable: bool, fail_threshold: u32) -> bool {
        if reachable {
            self.fail_count = 0;
            self.alerted = false;
            return false;
        }
        self.fail_count = self.fail_count.saturating_add(1);
        if self.fail_count >= fail_threshold && !self.alerted {
            self.alerted = true;
            return true;
        }
        false
    }
}

async fn probe(host: &str) -> bool {
    let addr = match (host, PROBE_PORT).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => return false,
        },
        Err(_) => return false,
    };
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Runs until `token` is cancelled. `host`/`interval`/`fail_threshold` come
/// from config defaults (`8.8.8.8`, 5s, 2) unless overridden.
pub async fn run(
    token: CancellationToken,
    audio: Arc<dyn AudioPort>,
    host: String,
    interval: Duration,
    fail_threshold: u32,
) {
    let mut state = MonitorState::default();
    loop {
        let reachable = probe(&host).await;
        debug!(host = %host, reachable, "network probe");

        if state.on_probe(reachable, fail_threshold) {
            warn!(host = %host, "network unreachable, signalling network_lost");
            audio.enqueue("network_lost");
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
