use crate::config::Config;
use crate::error::{ConversionError, FailureKind, Result};
use crate::job::{
    ActiveJobInfo, ConversionEvent, ConversionJob, ConversionOutput, ConversionRequest, JobId,
    JobState, ProgressCallback,
};
use crate::media::duration::DurationProbe;
use crate::media::failure::{classify_failure, DiagnosticLog};
use crate::media::ffmpeg::{command_args, resolve, verify_ffmpeg, OutputFormat};
use crate::media::progress::{parse_progress_line, LineSplitter, ProgressSample, ProgressTracker};
use crate::system::hardware::{CapabilityProbe, CapabilitySnapshot};
use crate::system::tools::ToolPaths;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::SystemTime;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Non-progress stderr lines kept per job for failure classification.
const DIAGNOSTIC_LINES: usize = 200;
const READ_CHUNK_BYTES: usize = 8 * 1024;

struct RegistryEntry {
    job: ConversionJob,
    cancel_tx: Option<oneshot::Sender<()>>,
    gate: Arc<ProgressGate>,
}

type Registry = Arc<Mutex<HashMap<JobId, RegistryEntry>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Orders progress callbacks against `cancel`: once `close` returns, no callback for
/// the job is running or will start.
#[derive(Default)]
struct ProgressGate {
    closed: AtomicBool,
    running: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

impl ProgressGate {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // A callback cancelling its own job already holds `running`.
        let reentrant = *lock(&self.owner) == Some(thread::current().id());
        if !reentrant {
            drop(lock(&self.running));
        }
    }

    /// Runs `f` unless the gate is closed.
    fn pass(&self, f: impl FnOnce()) {
        let _running = lock(&self.running);
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        *lock(&self.owner) = Some(thread::current().id());
        f();
        *lock(&self.owner) = None;
    }
}

/// Length and mtime of a file that was at the output path before the job started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl OutputStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok().filter(|m| m.is_file())?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Conversion engine: owns the capability cache and the registry of running jobs.
///
/// Construct one per application and share it behind an `Arc`.
pub struct Transcoder {
    config: Config,
    tools: ToolPaths,
    capabilities: CapabilityProbe,
    duration_probe: DurationProbe,
    registry: Registry,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<ConversionEvent>,
}

impl Transcoder {
    pub fn new(config: Config) -> Self {
        let tools = ToolPaths::resolve(&config.tools);
        Self::with_tools(config, tools)
    }

    pub fn with_tools(config: Config, tools: ToolPaths) -> Self {
        let capabilities = CapabilityProbe::new(tools.ffmpeg.clone(), &config.probe);
        let duration_probe = DurationProbe::new(tools.ffprobe.clone(), &config.probe);
        let (event_tx, _rx) = broadcast::channel(100);
        Self {
            config,
            tools,
            capabilities,
            duration_probe,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            event_tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversionEvent> {
        self.event_tx.subscribe()
    }

    /// Cached capability snapshot; probes the encoder on first use.
    pub async fn detect_capabilities(&self) -> Arc<CapabilitySnapshot> {
        self.capabilities.detect().await
    }

    pub async fn reset_capabilities(&self) {
        self.capabilities.reset().await;
    }

    pub async fn get_duration(&self, path: &Path) -> Option<f64> {
        self.duration_probe.get_duration(path).await
    }

    /// First line of `ffmpeg -version`.
    pub async fn verify_ffmpeg(&self) -> Result<String> {
        if !self.tools.ffmpeg_present() {
            return Err(ConversionError::BinaryMissing(self.tools.ffmpeg.clone()));
        }
        verify_ffmpeg(&self.tools.ffmpeg, &self.config.probe).await
    }

    /// Run one conversion to completion.
    pub async fn convert(
        &self,
        request: ConversionRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionOutput> {
        self.start(request, on_progress).await?.wait().await
    }

    /// Validate, spawn and register a job; the returned handle resolves on exit.
    ///
    /// Input and binary presence are checked before anything is spawned.
    pub async fn start(
        &self,
        request: ConversionRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<RunningJob> {
        if !request.input_path.is_file() {
            return Err(ConversionError::InputNotFound(request.input_path));
        }
        if !self.tools.ffmpeg_present() {
            return Err(ConversionError::BinaryMissing(self.tools.ffmpeg.clone()));
        }

        let prefer_gpu = request
            .prefer_gpu
            .unwrap_or(self.config.conversion.prefer_gpu);
        let snapshot = if request.format == OutputFormat::H264 && prefer_gpu {
            self.capabilities.detect().await
        } else {
            Arc::new(CapabilitySnapshot::software(
                std::env::consts::OS,
                std::env::consts::ARCH,
            ))
        };
        let resolved = resolve(request.format, &request.quality, &snapshot, prefer_gpu);

        let duration = match request.duration_seconds {
            Some(seconds) => Some(seconds),
            None if self.config.conversion.probe_duration => {
                self.duration_probe.get_duration(&request.input_path).await
            }
            None => None,
        };

        let args = command_args(&request.input_path, &request.output_path, &resolved);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let gate = Arc::new(ProgressGate::default());
        let preexisting_output = OutputStamp::of(&request.output_path);

        lock(&self.registry).insert(
            id,
            RegistryEntry {
                job: ConversionJob {
                    id,
                    input_path: request.input_path.clone(),
                    output_path: request.output_path.clone(),
                    format: request.format,
                    quality: request.quality.clone(),
                    state: JobState::Pending,
                    pid: None,
                    last_emitted_percent: None,
                    started_at: Utc::now(),
                },
                cancel_tx: Some(cancel_tx),
                gate: Arc::clone(&gate),
            },
        );
        self.emit_state(id, JobState::Pending);

        info!(
            "Job {}: {} @ {} {:?} -> {:?}",
            id, request.format, request.quality, request.input_path, request.output_path
        );
        debug!("Job {}: {:?} {}", id, self.tools.ffmpeg, args.join(" "));

        let spawned = Command::new(&self.tools.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                lock(&self.registry).remove(&id);
                self.emit_state(id, JobState::Failed);
                error!("Job {}: failed to spawn ffmpeg: {}", id, e);
                return Err(ConversionError::ProcessSpawnFailure(e.to_string()));
            }
        };

        let Some(stderr) = child.stderr.take() else {
            let _ = child.start_kill();
            lock(&self.registry).remove(&id);
            self.emit_state(id, JobState::Failed);
            return Err(ConversionError::ProcessSpawnFailure(
                "failed to capture encoder stderr".to_string(),
            ));
        };

        let pid = child.id();
        let still_registered = match lock(&self.registry).get_mut(&id) {
            Some(entry) => {
                entry.job.state = JobState::Running;
                entry.job.pid = pid;
                true
            }
            None => false,
        };
        if still_registered {
            self.emit_state(id, JobState::Running);
        }

        let supervisor = JobSupervisor {
            id,
            child,
            stderr,
            cancel_rx,
            tracker: ProgressTracker::new(id, duration),
            registry: Arc::clone(&self.registry),
            event_tx: self.event_tx.clone(),
            on_progress,
            output_path: request.output_path,
            remove_partial_output: self.config.conversion.remove_partial_output,
            preexisting_output,
            gate,
        };
        let handle = tokio::spawn(supervisor.run());

        Ok(RunningJob { id, pid, handle })
    }

    /// Best-effort cancellation: the job leaves the registry immediately and its
    /// process is killed in the background. Returns `false` for unknown ids.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let Some(mut entry) = lock(&self.registry).remove(&job_id) else {
            return false;
        };
        if let Some(tx) = entry.cancel_tx.take() {
            let _ = tx.send(());
        }
        entry.gate.close();
        info!("Job {}: cancel requested", job_id);
        self.emit_state(job_id, JobState::CancelRequested);
        true
    }

    pub fn cancel_all(&self) -> usize {
        let ids: Vec<JobId> = lock(&self.registry).keys().copied().collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn list_active_jobs(&self) -> Vec<ActiveJobInfo> {
        let mut jobs: Vec<ActiveJobInfo> = lock(&self.registry)
            .values()
            .map(|entry| ActiveJobInfo {
                job_id: entry.job.id,
                pid: entry.job.pid,
            })
            .collect();
        jobs.sort_by_key(|j| j.job_id);
        jobs
    }

    pub fn job(&self, job_id: JobId) -> Option<ConversionJob> {
        lock(&self.registry).get(&job_id).map(|e| e.job.clone())
    }

    fn emit_state(&self, job_id: JobId, state: JobState) {
        let _ = self
            .event_tx
            .send(ConversionEvent::JobStateChanged { job_id, state });
    }
}

/// Handle to a spawned job.
pub struct RunningJob {
    id: JobId,
    pid: Option<u32>,
    handle: JoinHandle<Result<ConversionOutput>>,
}

impl RunningJob {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub async fn wait(self) -> Result<ConversionOutput> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ConversionError::EncodingFailure {
                kind: FailureKind::Unknown,
                message: format!("Job supervisor stopped unexpectedly: {e}"),
            }),
        }
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

/// Owns one child process from spawn to terminal state.
struct JobSupervisor {
    id: JobId,
    child: Child,
    stderr: ChildStderr,
    cancel_rx: oneshot::Receiver<()>,
    tracker: ProgressTracker,
    registry: Registry,
    event_tx: broadcast::Sender<ConversionEvent>,
    on_progress: Option<ProgressCallback>,
    output_path: PathBuf,
    remove_partial_output: bool,
    preexisting_output: Option<OutputStamp>,
    gate: Arc<ProgressGate>,
}

impl JobSupervisor {
    async fn run(mut self) -> Result<ConversionOutput> {
        let mut splitter = LineSplitter::new();
        let mut diagnostics = DiagnosticLog::new(DIAGNOSTIC_LINES);
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        let mut stderr_open = true;

        let outcome = loop {
            tokio::select! {
                biased;
                _ = &mut self.cancel_rx => break Outcome::Cancelled,
                read = self.stderr.read(&mut buf), if stderr_open => match read {
                    Ok(0) => {
                        stderr_open = false;
                        if let Some(line) = splitter.finish() {
                            self.handle_line(line, &mut diagnostics);
                        }
                    }
                    Ok(n) => {
                        for line in splitter.push(&buf[..n]) {
                            self.handle_line(line, &mut diagnostics);
                        }
                    }
                    Err(e) => {
                        warn!("Job {}: stderr read failed: {}", self.id, e);
                        stderr_open = false;
                    }
                },
                status = self.child.wait(), if !stderr_open => break Outcome::Exited(status),
            }
        };

        match outcome {
            Outcome::Cancelled => {
                // Registry entry was already removed by `cancel`.
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
                self.cleanup_partial_output().await;
                info!("Job {}: cancelled", self.id);
                self.emit_state(JobState::Cancelled);
                Err(ConversionError::Cancelled)
            }
            Outcome::Exited(Ok(status)) if status.success() => {
                self.deregister();
                match tokio::fs::metadata(&self.output_path).await {
                    Ok(meta) if meta.is_file() => {
                        info!(
                            "Job {}: completed {:?} ({} bytes)",
                            self.id,
                            self.output_path,
                            meta.len()
                        );
                        self.emit_state(JobState::Completed);
                        Ok(ConversionOutput {
                            output_path: self.output_path.clone(),
                            file_size_bytes: meta.len(),
                        })
                    }
                    _ => {
                        error!(
                            "Job {}: ffmpeg exited cleanly but {:?} does not exist",
                            self.id, self.output_path
                        );
                        self.emit_state(JobState::Failed);
                        Err(ConversionError::OutputMissingAfterSuccess(
                            self.output_path.clone(),
                        ))
                    }
                }
            }
            Outcome::Exited(Ok(status)) => {
                self.deregister();
                let classified = classify_failure(status.code(), &diagnostics.text());
                error!(
                    "Job {}: ffmpeg failed with {} ({}): {}",
                    self.id, status, classified.kind, classified.message
                );
                self.cleanup_partial_output().await;
                self.emit_state(JobState::Failed);
                Err(ConversionError::EncodingFailure {
                    kind: classified.kind,
                    message: classified.message,
                })
            }
            Outcome::Exited(Err(e)) => {
                self.deregister();
                error!("Job {}: failed waiting for ffmpeg: {}", self.id, e);
                self.cleanup_partial_output().await;
                self.emit_state(JobState::Failed);
                Err(ConversionError::Io(e))
            }
        }
    }

    fn handle_line(&mut self, line: String, diagnostics: &mut DiagnosticLog) {
        let Some(progress) = parse_progress_line(&line) else {
            diagnostics.push(line);
            return;
        };
        if let Some(sample) = self.tracker.observe(&progress) {
            self.emit_progress(sample);
        }
    }

    fn emit_progress(&self, sample: ProgressSample) {
        self.gate.pass(|| {
            {
                let mut registry = lock(&self.registry);
                // A missing entry means the job was cancelled; never re-insert it.
                let Some(entry) = registry.get_mut(&self.id) else {
                    return;
                };
                if sample.percent.is_some() {
                    entry.job.last_emitted_percent = sample.percent;
                }
            }
            if let Some(callback) = &self.on_progress {
                callback(sample.clone());
            }
            let _ = self.event_tx.send(ConversionEvent::Progress(sample));
        });
    }

    fn deregister(&self) {
        lock(&self.registry).remove(&self.id);
    }

    fn emit_state(&self, state: JobState) {
        let _ = self.event_tx.send(ConversionEvent::JobStateChanged {
            job_id: self.id,
            state,
        });
    }

    async fn cleanup_partial_output(&self) {
        if !self.remove_partial_output {
            return;
        }
        if self.preexisting_output.is_some()
            && OutputStamp::of(&self.output_path) == self.preexisting_output
        {
            debug!(
                "Job {}: {:?} predates the job and was not written; keeping it",
                self.id, self.output_path
            );
            return;
        }
        match tokio::fs::remove_file(&self.output_path).await {
            Ok(()) => info!("Job {}: removed partial output {:?}", self.id, self.output_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Job {}: failed to remove partial output {:?}: {}",
                self.id, self.output_path, e
            ),
        }
    }
}

impl Drop for JobSupervisor {
    fn drop(&mut self) {
        // Also runs when a progress callback panics and unwinds the task.
        lock(&self.registry).remove(&self.id);
    }
}
