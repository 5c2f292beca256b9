use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use scan_ingest::audio::NullAudioPort;
use scan_ingest::config::Config;
use scan_ingest::db::postgres::PgConnector;
use scan_ingest::db::DbConnector;
use scan_ingest::device_resolver::{resolve_scanner_device, resolve_user};
use scan_ingest::flush::FlushWorker;
use scan_ingest::scanner::{self, ScannerConfig};
use scan_ingest::spool::SpoolWriter;
use scan_ingest::state::{EntryNoState, OffsetFile};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: scan-ingest <config.json>");
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log_file_path);
    info!(device_id = %config.device_id, "scan-ingest starting");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_file_path: &std::path::Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let dir = log_file_path.parent().unwrap_or(std::path::Path::new("."));
    let name = log_file_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("scan-ingest.log"));

    if std::fs::create_dir_all(dir).is_err() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    }

    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    // Leaked deliberately: the guard must outlive the subscriber, and the
    // subscriber lives for the whole process.
    std::mem::forget(guard);
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
}

async fn run(config: Config) -> scan_ingest::Result<()> {
    let token = CancellationToken::new();
    let audio: Arc<dyn scan_ingest::audio::AudioPort> = Arc::new(NullAudioPort);

    let dev_path = resolve_scanner_device(
        config.scanner_input_device.as_deref(),
        config.scanner_device_filter.as_deref(),
    );
    let resolved_user = resolve_user(&config.scanner_user_map, &dev_path);
    let user_id = config.user_id.clone().or_else(|| (!resolved_user.is_empty()).then_some(resolved_user));

    let state_file = config.state_file.clone().unwrap_or_else(|| config.base_dir.join("entry_no.json"));
    let spool_file = config.spool_file.clone().unwrap_or_else(|| config.base_dir.join("spool.jsonl"));
    let offset_file_path = config
        .spool_offset_file
        .clone()
        .unwrap_or_else(|| config.base_dir.join("spool.offset"));

    let entry_no_state = EntryNoState::load(&state_file, config.starting_entry_no)?;
    let spool_writer = SpoolWriter::new(&spool_file);
    let offset_file = OffsetFile::new(&offset_file_path);

    let (observer, mut observer_rx) = scan_ingest::observer::channel(256);
    tokio::spawn(async move { while observer_rx.recv().await.is_some() {} });

    let scanner_name = dev_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| config.device_id.clone());

    let scanner_cfg = ScannerConfig {
        dev_path,
        device_id: config.device_id.clone(),
        scanner_name,
        user_id,
        preferred_user: None,
    };

    let scanner_token = token.clone();
    let scanner_audio = audio.clone();
    let scanner_task = tokio::spawn(async move {
        scanner::run(scanner_token, scanner_cfg, spool_writer, entry_no_state, observer, scanner_audio).await;
    });

    let flush_token = token.clone();
    let flush_interval = Duration::from_secs_f64(config.db_flush_interval_sec);
    let heartbeat_interval = Duration::from_secs_f64(config.db_heartbeat_interval_sec);
    let table_name = config.table_name.clone();
    let flush_audio = audio.clone();
    let connection_string = config.sql_connection_string.clone().unwrap_or_default();
    let flush_task = tokio::spawn(async move {
        let db: Box<dyn DbConnector> = Box::new(PgConnector::new(connection_string));
        match FlushWorker::new(db, flush_audio, table_name, spool_file, offset_file, heartbeat_interval) {
            Ok(mut worker) => worker.run(flush_token, flush_interval).await,
            Err(e) => error!(error = %e, "failed to start flush worker"),
        }
    });

    let network_token = token.clone();
    let network_audio = audio.clone();
    let network_host = config.network_check_host.clone();
    let network_interval = Duration::from_secs_f64(config.network_check_interval_sec);
    let network_threshold = config.network_check_fail_threshold;
    let network_task = tokio::spawn(async move {
        scan_ingest::network::run(network_token, network_audio, network_host, network_interval, network_threshold).await;
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    token.cancel();

    let joined = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = tokio::join!(scanner_task, flush_task, network_task);
    })
    .await;
    if joined.is_err() {
        error!("tasks did not shut down within the grace period");
    }

    Ok(())
}
