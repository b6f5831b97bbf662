//! Session lifecycle: at most one measurement runs at a time, each on its
//! own background thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::backend::{BackendError, BackendFactory, SpeedTestBackend};
use super::session::{self, MeasurementOutcome, Phase, SessionSnapshot};
use super::{bits_to_mbps, MeasureError};
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::progress::{self, ProgressReceiver, ProgressSender};

const COMPONENT: &str = "runner";

/// Destination for the outcome of a successful session.
pub trait ResultSink: Send + Sync {
    fn save_result(&self, outcome: &MeasurementOutcome) -> anyhow::Result<()>;
}

/// Observer's handle on one session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    progress: ProgressReceiver,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state, without side effects.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.progress.latest()
    }

    /// The terminal snapshot once the session has finished, `None` before.
    /// Safe to call any number of times.
    pub fn poll(&self) -> Option<SessionSnapshot> {
        let snap = self.progress.latest();
        snap.is_terminal().then_some(snap)
    }

    pub fn is_finished(&self) -> bool {
        self.progress.latest().is_terminal()
    }

    /// A fresh progress cursor for a presentation loop.
    pub fn watch(&self) -> ProgressReceiver {
        self.progress.clone()
    }

    /// Poll on a fixed tick until the session is terminal.
    pub async fn wait(&self, tick: Duration) -> SessionSnapshot {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            if let Some(done) = self.poll() {
                return done;
            }
        }
    }
}

/// Starts measurement sessions and enforces that only one runs at a time.
pub struct MeasurementRunner {
    factory: Arc<dyn BackendFactory>,
    results: Option<Arc<dyn ResultSink>>,
    auto_save: bool,
    sink: Arc<dyn DiagnosticSink>,
    current: Mutex<Option<SessionHandle>>,
}

impl MeasurementRunner {
    pub fn new(factory: Arc<dyn BackendFactory>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            factory,
            results: None,
            auto_save: false,
            sink,
            current: Mutex::new(None),
        }
    }

    /// Hand successful outcomes to `results` when `auto_save` is set.
    pub fn with_results(mut self, results: Arc<dyn ResultSink>, auto_save: bool) -> Self {
        self.results = Some(results);
        self.auto_save = auto_save;
        self
    }

    /// Begin a new session, or return the running one.
    pub fn start(&self) -> SessionHandle {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(running) = current.as_ref().filter(|h| !h.is_finished()) {
            self.sink.record(DiagnosticEvent::debug(
                COMPONENT,
                format!("session {} still running; start ignored", running.id()),
            ));
            return running.clone();
        }

        let id = Uuid::new_v4();
        let (tx, rx) = progress::channel(SessionSnapshot::new(id));
        let handle = SessionHandle { id, progress: rx };

        let job = SessionJob {
            id,
            factory: self.factory.clone(),
            results: if self.auto_save {
                self.results.clone()
            } else {
                None
            },
            sink: self.sink.clone(),
            tx: tx.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("netgauge-session-{}", &id.simple().to_string()[..8]))
            .spawn(move || job.run());

        if let Err(e) = spawned {
            let err = MeasureError::Execution(format!("could not start session thread: {e}"));
            self.sink
                .record(DiagnosticEvent::error(COMPONENT, err.to_string()));
            tx.finish(|s| {
                s.phase = Phase::Failed;
                s.error = Some(err);
            });
        }

        *current = Some(handle.clone());
        handle
    }
}

/// Everything the background thread needs for one session.
struct SessionJob {
    id: Uuid,
    factory: Arc<dyn BackendFactory>,
    results: Option<Arc<dyn ResultSink>>,
    sink: Arc<dyn DiagnosticSink>,
    tx: ProgressSender,
}

impl SessionJob {
    fn run(self) {
        let _guard = UnwindGuard { tx: &self.tx };
        let started = Instant::now();
        self.sink.record(DiagnosticEvent::info(
            COMPONENT,
            format!("session {} started", self.id),
        ));

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute()))
            .unwrap_or_else(|payload| Err(MeasureError::Execution(panic_message(payload))));

        match result {
            Ok(outcome) => self.complete(outcome, started),
            Err(err) => self.fail(err, started),
        }
    }

    fn execute(&self) -> Result<MeasurementOutcome, MeasureError> {
        // 1. Server selection
        self.tx.advance(Phase::SelectingServer, session::SERVER_SELECTION.start);
        let mut backend = self
            .factory
            .create()
            .map_err(|e| MeasureError::Configuration(e.to_string()))?;
        self.tx.advance(Phase::SelectingServer, 10);

        let server = backend
            .select_best_server()
            .map_err(|e| MeasureError::Configuration(e.to_string()))?;
        self.sink.record(DiagnosticEvent::info(
            COMPONENT,
            format!("best server found: {} ({})", server.sponsor, server.name),
        ));
        self.tx.set_server(server);
        self.tx.advance(Phase::SelectingServer, session::SERVER_SELECTION.end);

        // 2. Download
        let download_mbps = self.measure_phase(
            backend.as_mut(),
            Phase::Downloading,
            session::DOWNLOAD,
            "Download",
            |b, progress| b.measure_download(progress),
        )?;
        self.sink.record(DiagnosticEvent::info(
            COMPONENT,
            format!("download speed: {download_mbps} Mbps"),
        ));

        // 3. Upload
        let upload_mbps = self.measure_phase(
            backend.as_mut(),
            Phase::Uploading,
            session::UPLOAD,
            "Upload",
            |b, progress| b.measure_upload(progress),
        )?;

        // 4. Latency, measured as a side effect of the earlier phases
        let ping_ms = backend
            .latency_ms()
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .ok_or_else(|| {
                MeasureError::Measurement("Latency was not reported by the speed test.".into())
            })?;
        self.sink.record(DiagnosticEvent::info(
            COMPONENT,
            format!("upload speed: {upload_mbps} Mbps, ping: {ping_ms} ms"),
        ));

        Ok(MeasurementOutcome {
            download_mbps,
            upload_mbps,
            ping_ms,
        })
    }

    fn measure_phase(
        &self,
        backend: &mut dyn SpeedTestBackend,
        phase: Phase,
        range: session::PhaseRange,
        label: &str,
        transfer: impl FnOnce(
            &mut dyn SpeedTestBackend,
            &mut dyn FnMut(u64, u64),
        ) -> Result<Option<f64>, BackendError>,
    ) -> Result<f64, MeasureError> {
        self.tx.advance(phase, range.start);
        let tx = &self.tx;
        let mut on_progress = |current: u64, total: u64| {
            if let Some(percent) = range.scale(current, total) {
                tx.advance(phase, percent);
            }
        };

        let raw = transfer(backend, &mut on_progress).map_err(|e| classify(e, label))?;

        bits_to_mbps(raw).ok_or_else(|| {
            MeasureError::Measurement(format!(
                "{label} speed test did not return a valid speed."
            ))
        })
    }

    fn complete(&self, outcome: MeasurementOutcome, started: Instant) {
        self.tx.advance(Phase::Uploading, session::FINALIZE.start);

        let mut saved = false;
        let mut save_error = None;
        if let Some(results) = &self.results {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| results.save_result(&outcome)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!("result sink panicked: {}", panic_message(payload)))
                });
            match attempt {
                Ok(()) => saved = true,
                Err(e) => {
                    self.sink.record(DiagnosticEvent::error(
                        COMPONENT,
                        format!("could not save results of session {}: {:#}", self.id, e),
                    ));
                    save_error = Some(format!("{e:#}"));
                }
            }
        }

        self.sink.record(DiagnosticEvent::info(
            COMPONENT,
            format!(
                "session {} complete in {:.1}s: download {} Mbps, upload {} Mbps, ping {} ms",
                self.id,
                started.elapsed().as_secs_f64(),
                outcome.download_mbps,
                outcome.upload_mbps,
                outcome.ping_ms
            ),
        ));

        self.tx.finish(|s| {
            s.phase = Phase::Complete;
            s.progress_percent = session::FINALIZE.end;
            s.outcome = Some(outcome);
            s.saved = saved;
            s.save_error = save_error;
        });
    }

    fn fail(&self, err: MeasureError, started: Instant) {
        self.sink.record(DiagnosticEvent::error(
            COMPONENT,
            format!(
                "session {} failed after {:.1}s with {}: {}",
                self.id,
                started.elapsed().as_secs_f64(),
                err.kind(),
                err.message()
            ),
        ));
        self.tx.finish(|s| {
            s.phase = Phase::Failed;
            s.error = Some(err);
        });
    }
}

/// Publishes a failed terminal snapshot if the session thread unwinds
/// before reaching one, so observers and `start()` never wait on a dead
/// session.
struct UnwindGuard<'a> {
    tx: &'a ProgressSender,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.tx.finish(|s| {
                s.phase = Phase::Failed;
                s.error = Some(MeasureError::Execution(
                    "session thread panicked".to_string(),
                ));
            });
        }
    }
}

/// Map a backend failure during a transfer phase onto the session taxonomy.
fn classify(err: BackendError, label: &str) -> MeasureError {
    match err {
        BackendError::Config(msg) => MeasureError::Configuration(msg),
        BackendError::Transport(msg) => {
            MeasureError::Measurement(format!("{label} speed test error: {msg}"))
        }
        BackendError::Other(msg) => MeasureError::Execution(msg),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "speed test backend panicked".to_string()
    }
}
