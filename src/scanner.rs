//! Scanner task — owns one input device and one `Assembler`. Restarts with
//! empty state after a 2s backoff on open failure or disconnection; never
//! shares state with other tasks except through the spool file and the
//! entry-number state file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use evdev::{Device, InputEventKind, Key};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::assembler::Assembler;
use crate::audio::AudioPort;
use crate::decoder::{KeyState, KeySymbol};
use crate::observer::ScanObserver;
use crate::parser;
use crate::record::ScanRecord;
use crate::spool::SpoolWriter;
use crate::state::EntryNoState;

const OPEN_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Maps evdev's raw event value (0/1/2) to the Decoder's key-state set.
fn key_state(value: i32) -> KeyState {
    match value {
        0 => KeyState::Up,
        2 => KeyState::Hold,
        _ => KeyState::Down,
    }
}

/// Maps a Linux input keycode to the Decoder's symbol set. Keys outside
/// this set (function keys, modifiers other than shift, ...) decode to
/// `Other` and are dropped by the Assembler after clearing shift.
fn to_key_symbol(key: Key) -> KeySymbol {
    match key {
        Key::KEY_A => KeySymbol::Letter(0),
        Key::KEY_B => KeySymbol::Letter(1),
        Key::KEY_C => KeySymbol::Letter(2),
        Key::KEY_D => KeySymbol::Letter(3),
        Key::KEY_E => KeySymbol::Letter(4),
        Key::KEY_F => KeySymbol::Letter(5),
        Key::KEY_G => KeySymbol::Letter(6),
        Key::KEY_H => KeySymbol::Letter(7),
        Key::KEY_I => KeySymbol::Letter(8),
        Key::KEY_J => KeySymbol::Letter(9),
        Key::KEY_K => KeySymbol::Letter(10),
        Key::KEY_L => KeySymbol::Letter(11),
        Key::KEY_M => KeySymbol::Letter(12),
        Key::KEY_N => KeySymbol::Letter(13),
        Key::KEY_O => KeySymbol::Letter(14),
        Key::KEY_P => KeySymbol::Letter(15),
        Key::KEY_Q => KeySymbol::Letter(16),
        Key::KEY_R => KeySymbol::Letter(17),
        Key::KEY_S => KeySymbol::Letter(18),
        Key::KEY_T => KeySymbol::Letter(19),
        Key::KEY_U => KeySymbol::Letter(20),
        Key::KEY_V => KeySymbol::Letter(21),
        Key::KEY_W => KeySymbol::Letter(22),
        Key::KEY_X => KeySymbol::Letter(23),
        Key::KEY_Y => KeySymbol::Letter(24),
        Key::KEY_Z => KeySymbol::Letter(25),
        Key::KEY_0 => KeySymbol::Digit(0),
        Key::KEY_1 => KeySymbol::Digit(1),
        Key::KEY_2 => KeySymbol::Digit(2),
        Key::KEY_3 => KeySymbol::Digit(3),
        Key::KEY_4 => KeySymbol::Digit(4),
        Key::KEY_5 => KeySymbol::Digit(5),
        Key::KEY_6 => KeySymbol::Digit(6),
        Key::KEY_7 => KeySymbol::Digit(7),
        Key::KEY_8 => KeySymbol::Digit(8),
        Key::KEY_9 => KeySymbol::Digit(9),
        Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => KeySymbol::Shift,
        Key::KEY_ENTER | Key::KEY_KPENTER => KeySymbol::Enter,
        Key::KEY_MINUS => KeySymbol::Minus,
        Key::KEY_EQUAL => KeySymbol::Equal,
        Key::KEY_SPACE => KeySymbol::Space,
        Key::KEY_SLASH => KeySymbol::Slash,
        Key::KEY_DOT => KeySymbol::Dot,
        _ => KeySymbol::Other,
    }
}

/// Everything the Scanner task needs that doesn't change across device
/// reconnects.
pub struct ScannerConfig {
    pub dev_path: PathBuf,
    pub device_id: String,
    pub scanner_name: String,
    pub user_id: Option<String>,
    pub preferred_user: Option<String>,
}

/// Builds the `ScanRecord` for a completed barcode: runs the parser, then
/// fills in the identity/time fields the parser doesn't know about.
fn build_record(cfg: &ScannerConfig, entry_no: i32, raw: &str) -> ScanRecord {
    let formatted = parser::format_barcode(raw);
    let fields = parser::parse_parent_fields(parser::parent_text(&formatted));
    let now = Local::now();

    ScanRecord {
        device_id: cfg.device_id.clone(),
        scanner_name: cfg.scanner_name.clone(),
        entry_no,
        barcode: formatted,
        scan_date: now.date_naive(),
        scan_time: now.format("%H:%M:%S").to_string(),
        user_id: cfg.user_id.clone(),
        preferred_user: cfg.preferred_user.clone(),
        stowage: fields.stowage,
        flight_no: fields.flight_no,
        order_date: fields.order_date,
        dacs_class: fields.dacs_class,
        leg: fields.leg,
        gally: fields.gally,
        block_no: fields.block_no,
        container_code: fields.container_code,
        des: fields.des,
        dacs_ac_type: fields.dacs_ac_type,
    }
}

/// Runs until `token` is cancelled. Reopens the device and restarts the
/// Assembler from empty state on any open failure or read error.
pub async fn run(
    token: CancellationToken,
    cfg: ScannerConfig,
    spool: SpoolWriter,
    mut entry_no_state: EntryNoState,
    observer: ScanObserver,
    audio: Arc<dyn AudioPort>,
) {
    'reconnect: loop {
        if token.is_cancelled() {
            return;
        }

        let device = match open_device(&cfg.dev_path) {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %cfg.dev_path.display(), error = %e, "failed to open scanner device, retrying");
                if sleep_or_cancelled(&token, OPEN_RETRY_BACKOFF).await {
                    return;
                }
                continue 'reconnect;
            }
        };

        let mut stream = match device.into_event_stream() {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %cfg.dev_path.display(), error = %e, "failed to start event stream, retrying");
                if sleep_or_cancelled(&token, OPEN_RETRY_BACKOFF).await {
                    return;
                }
                continue 'reconnect;
            }
        };

        info!(path = %cfg.dev_path.display(), "scanner device open");
        audio.enqueue("device_ready");
        let mut assembler = Assembler::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                event = stream.next_event() => match event {
                    Ok(ev) => {
                        if let InputEventKind::Key(key) = ev.kind() {
                            if key_state(ev.value()) == KeyState::Down {
                                handle_key_down(&cfg, &mut assembler, &mut entry_no_state, &spool, &observer, to_key_symbol(key));
                            }
                        }
                    }
                    Err(e) => {
                        warn!(path = %cfg.dev_path.display(), error = %e, "scanner device read error, reconnecting");
                        if sleep_or_cancelled(&token, OPEN_RETRY_BACKOFF).await {
                            return;
                        }
                        continue 'reconnect;
                    }
                }
            }
        }
    }
}

fn handle_key_down(
    cfg: &ScannerConfig,
    assembler: &mut Assembler,
    entry_no_state: &mut EntryNoState,
    spool: &SpoolWriter,
    observer: &ScanObserver,
    symbol: KeySymbol,
) {
    let Some(raw) = assembler.on_key_down(symbol) else {
        return;
    };

    let entry_no = entry_no_state.peek_next();
    let record = build_record(cfg, entry_no, &raw);
    if let Err(e) = spool.append(&record) {
        error!(error = %e, entry_no, "failed to append scan to spool");
        return;
    }
    if let Err(e) = entry_no_state.commit(entry_no) {
        error!(error = %e, entry_no, "failed to persist entry number after spooling");
    }
    observer.report(entry_no, &record.barcode);
}

fn open_device(path: &Path) -> std::io::Result<Device> {
    Device::open(path)
}

/// Sleeps `dur`, racing the cancellation token. Returns `true` if the
/// token fired first (caller should return rather than retry).
async fn sleep_or_cancelled(token: &CancellationToken, dur: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(dur) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_state_maps_evdev_values() {
        assert_eq!(key_state(0), KeyState::Up);
        assert_eq!(key_state(1), KeyState::Down);
        assert_eq!(key_state(2), KeyState::Hold);
    }

    #[test]
    fn letters_map_to_sequential_offsets() {
        assert_eq!(to_key_symbol(Key::KEY_A), KeySymbol::Letter(0));
        assert_eq!(to_key_symbol(Key::KEY_Z), KeySymbol::Letter(25));
    }

    #[test]
    fn digit_zero_and_nine_map_correctly() {
        assert_eq!(to_key_symbol(Key::KEY_0), KeySymbol::Digit(0));
        assert_eq!(to_key_symbol(Key::KEY_9), KeySymbol::Digit(9));
    }

    #[test]
    fn both_shift_keys_map_to_shift() {
        assert_eq!(to_key_symbol(Key::KEY_LEFTSHIFT), KeySymbol::Shift);
        assert_eq!(to_key_symbol(Key::KEY_RIGHTSHIFT), KeySymbol::Shift);
    }

    #[test]
    fn unmapped_key_is_other() {
        assert_eq!(to_key_symbol(Key::KEY_F1), KeySymbol::Other);
    }

    #[test]
    fn build_record_runs_the_full_parser_pipeline() {
        let cfg = ScannerConfig {
            dev_path: PathBuf::from("/dev/input/event0"),
            device_id: "D1".into(),
            scanner_name: "scanner0".into(),
            user_id: Some("alice".into()),
            preferred_user: None,
        };
        let record = build_record(&cfg, 7, "STW-FL123-05.11.24-CLS-L1-G1-B1-CC1-DES1-ACT");
        assert_eq!(record.entry_no, 7);
        assert_eq!(record.stowage.as_deref(), Some("STW"));
        assert_eq!(record.user_id.as_deref(), Some("alice"));
    }
}
