pub mod builders;
pub mod recording_sink;

use std::sync::{Arc, Once};
use tracing_subscriber::{EnvFilter, fmt};

use autosign::config::ConfigFile;
use autosign::device::{Device, MockDevice};
use autosign::engine::TaskScheduler;
use autosign::task::TaskSet;

pub use recording_sink::RecordingSink;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-minute timeout.
///
/// Scheduler tests run on a paused clock, where whole runs take minutes of
/// virtual time but no real time.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(300), f)
        .await
        .expect("Test timed out after 300 seconds")
}

/// A scheduler wired to a [`MockDevice`] and a [`RecordingSink`].
pub struct Harness {
    pub device: MockDevice,
    pub sink: Arc<RecordingSink>,
    pub scheduler: Arc<TaskScheduler>,
    pub tasks: TaskSet,
}

impl Harness {
    pub fn new(cfg: &ConfigFile) -> Self {
        Self::with_device(cfg, MockDevice::new())
    }

    pub fn with_device(cfg: &ConfigFile, device: MockDevice) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let scheduler = TaskScheduler::from_config(
            Device::from_backend(Arc::new(device.clone())),
            cfg,
            sink.clone(),
        );
        Self {
            device,
            sink,
            scheduler: Arc::new(scheduler),
            tasks: TaskSet::from_config(cfg),
        }
    }
}
