//! Bounded-queue synthesis engine with barge-in semantics (spec.md §4.5).
//!
//! One worker task owns the queue. `Speak*` callers enqueue and return
//! immediately; barge-in (`stop_speaking`) drains the queue directly rather
//! than going through the worker, so it returns in bounded time regardless
//! of queue depth. State is an atomic integer; the interrupt flag and the
//! once-only stop guard are each a dedicated atomic, matching the engine's
//! "no locks held across network calls" constraint (spec.md §5).

mod job;
mod metrics;
mod synth;

pub use metrics::MetricsSnapshot;
pub use synth::{HttpSynthesizer, Synthesizer};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{fingerprint, AudioCache, AudioFormat};
use crate::config::{CacheConfig, EngineConfig};
use crate::error::{PipelineError, Result};
use job::Job;
use metrics::Metrics;

/// Engine lifecycle state (spec.md §3's TTS Engine State Machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

const STATE_IDLE: u8 = 0;
const STATE_PLAYING: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_STOPPED: u8 = 3;

impl EngineState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            STATE_PLAYING => EngineState::Playing,
            STATE_PAUSED => EngineState::Paused,
            STATE_STOPPED => EngineState::Stopped,
            _ => EngineState::Idle,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Playing => "playing",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
        }
    }
}

/// A pluggable destination for synthesized audio.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, audio: &[u8], format: AudioFormat) -> Result<()>;
}

impl<F> PlaybackSink for F
where
    F: Fn(&[u8], AudioFormat) -> Result<()> + Send + Sync,
{
    fn play(&self, audio: &[u8], format: AudioFormat) -> Result<()> {
        self(audio, format)
    }
}

/// A sink that discards audio; the default until a caller installs one.
struct NullSink;
impl PlaybackSink for NullSink {
    fn play(&self, _audio: &[u8], _format: AudioFormat) -> Result<()> {
        Ok(())
    }
}

struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    notify: Notify,
    capacity: usize,
}

impl JobQueue {
    fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    fn try_push(&self, job: Job) -> std::result::Result<(), Job> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.len() >= self.capacity {
            return Err(job);
        }
        jobs.push_back(job);
        drop(jobs);
        self.notify.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<Job> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    fn drain(&self) -> Vec<Job> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect()
    }

    fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Shared state the worker task and the engine handle both touch.
struct Shared {
    queue: JobQueue,
    state: AtomicU8,
    interrupted: AtomicBool,
    stopping: AtomicBool,
    playback: RwLock<Arc<dyn PlaybackSink>>,
    synthesizer: Arc<dyn Synthesizer>,
    cache: Arc<AudioCache>,
    metrics: Metrics,
    cancellation: CancellationToken,
}

/// Synthesizes text and delivers audio to a pluggable playback sink, with
/// bounded queueing, barge-in, and metrics.
pub struct TtsEngine {
    config: EngineConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TtsEngine {
    /// Construct an engine with the reference HTTP synthesizer, a no-op
    /// playback sink, and a private audio cache, and spawn its worker.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let synthesizer = Arc::new(HttpSynthesizer::new(&config)?);
        Ok(Self::with_synthesizer(config, synthesizer))
    }

    /// Construct an engine with a caller-supplied synthesizer (used by tests
    /// to avoid real network calls) and a private audio cache.
    pub fn with_synthesizer(config: EngineConfig, synthesizer: Arc<dyn Synthesizer>) -> Self {
        let cache = Arc::new(AudioCache::new(CacheConfig::default()));
        Self::with_synthesizer_and_cache(config, synthesizer, cache)
    }

    /// Construct an engine that shares a caller-owned audio cache, so a
    /// `Pipeline` can expose the same cache instance it consults directly
    /// (e.g. for `stats()`) as the one the worker checks before synthesis.
    pub fn with_synthesizer_and_cache(
        config: EngineConfig,
        synthesizer: Arc<dyn Synthesizer>,
        cache: Arc<AudioCache>,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: JobQueue::new(config.queue_size.max(1)),
            state: AtomicU8::new(STATE_IDLE),
            interrupted: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            playback: RwLock::new(Arc::new(NullSink)),
            synthesizer,
            cache,
            metrics: Metrics::default(),
            cancellation: CancellationToken::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move { run_worker(worker_shared).await });

        tracing::debug!(queue_size = config.queue_size, "tts engine started");

        Self {
            config,
            shared,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Install a playback sink, replacing any previous one. Swappable while
    /// the engine is running.
    pub fn set_playback_sink(&self, sink: Arc<dyn PlaybackSink>) {
        *self.shared.playback.write().unwrap_or_else(|e| e.into_inner()) = sink;
    }

    fn guard_not_stopped(&self) -> Result<()> {
        if self.state() == EngineState::Stopped {
            Err(PipelineError::EngineStopped)
        } else {
            Ok(())
        }
    }

    fn enqueue(
        &self,
        text: String,
        voice_id: String,
        speed: f32,
        response_format: String,
    ) -> Result<tokio::sync::oneshot::Receiver<Result<()>>> {
        self.guard_not_stopped()?;
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        let job = Job {
            text,
            voice_id,
            speed,
            response_format,
            result_tx,
            cancel: CancellationToken::new(),
            processed: AtomicBool::new(false),
        };
        self.shared
            .queue
            .try_push(job)
            .map_err(|_| PipelineError::QueueFull)?;
        Ok(result_rx)
    }

    /// Enqueue text with the configured default voice and speed. Returns
    /// immediately; empty text is a no-op.
    pub fn speak(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.enqueue(
            text.to_owned(),
            self.config.voice_id.clone(),
            self.config.speed,
            self.config.response_format.clone(),
        )?;
        Ok(())
    }

    /// Enqueue text with overrides; zero-valued overrides fall back to
    /// configured defaults.
    pub fn speak_with_voice(&self, text: &str, voice_id: Option<&str>, speed: f32) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let voice_id = voice_id
            .filter(|v| !v.is_empty())
            .map_or_else(|| self.config.voice_id.clone(), str::to_owned);
        let speed = self.config.resolve_speed(speed);
        self.enqueue(text.to_owned(), voice_id, speed, self.config.response_format.clone())?;
        Ok(())
    }

    /// Synthesize and play in the caller, blocking until playback completes
    /// or the token is cancelled.
    pub async fn speak_sync(
        &self,
        text: &str,
        voice_id: Option<&str>,
        speed: f32,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let voice_id = voice_id
            .filter(|v| !v.is_empty())
            .map_or_else(|| self.config.voice_id.clone(), str::to_owned);
        let speed = self.config.resolve_speed(speed);
        let rx = self.enqueue(text.to_owned(), voice_id, speed, self.config.response_format.clone())?;

        tokio::select! {
            () = cancellation.cancelled() => Err(PipelineError::Cancelled),
            res = rx => res.map_err(|_| PipelineError::Channel("result sender dropped".to_owned()))?,
        }
    }

    /// Barge-in: interrupt the in-flight job gate, drain every queued job
    /// (each receives `Interrupted`), and move to `Paused`. Non-blocking
    /// with respect to any synthesis request already in flight.
    pub fn stop_speaking(&self) {
        self.shared.interrupted.store(true, Ordering::SeqCst);
        let drained = self.shared.queue.drain();
        let count = drained.len() as u64;
        for job in drained {
            job.cancel.cancel();
            job.mark_processed();
            let _ = job.result_tx.send(Err(PipelineError::Interrupted));
        }
        self.shared.metrics.record_interrupts(count);
        self.shared.state.store(STATE_PAUSED, Ordering::SeqCst);
        tracing::info!(drained = count, "barge-in: queue drained");
    }

    /// Clear the interrupt flag and return to `Idle`.
    pub fn resume(&self) {
        self.shared.interrupted.store(false, Ordering::SeqCst);
        self.shared.state.store(STATE_IDLE, Ordering::SeqCst);
        tracing::debug!("tts engine resumed");
    }

    /// Probe the sidecar's health endpoint; true iff it responds 200 within
    /// a short timeout.
    pub async fn is_available(&self) -> bool {
        let client = match reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
        {
            Ok(c) => c,
            Err(_) => return false,
        };
        client
            .get(self.config.health_endpoint())
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }

    /// Idempotent, once-only shutdown: transitions to `Stopped`, cancels the
    /// worker, drains and interrupts remaining jobs, and waits for the
    /// worker to exit.
    pub async fn stop(&self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.state.store(STATE_STOPPED, Ordering::SeqCst);
        self.shared.cancellation.cancel();

        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        for job in self.shared.queue.drain() {
            job.cancel.cancel();
            job.mark_processed();
            let _ = job.result_tx.send(Err(PipelineError::Interrupted));
        }
        tracing::info!("tts engine stopped");
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        EngineState::from_tag(self.shared.state.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared
            .metrics
            .snapshot(self.shared.queue.len(), self.state().as_str())
    }
}

async fn run_worker(shared: Arc<Shared>) {
    loop {
        if shared.cancellation.is_cancelled() {
            break;
        }
        match shared.queue.pop() {
            Some(job) => process_job(&shared, job).await,
            None => {
                tokio::select! {
                    () = shared.cancellation.cancelled() => break,
                    () = shared.queue.notify.notified() => continue,
                }
            }
        }
    }

    for job in shared.queue.drain() {
        job.cancel.cancel();
        job.mark_processed();
        let _ = job.result_tx.send(Err(PipelineError::Interrupted));
    }
}

async fn process_job(shared: &Arc<Shared>, job: Job) {
    if shared.interrupted.load(Ordering::SeqCst) {
        job.cancel.cancel();
        job.mark_processed();
        let _ = job.result_tx.send(Err(PipelineError::Interrupted));
        shared.metrics.record_interrupts(1);
        return;
    }

    let start = Instant::now();
    let key = fingerprint(&job.text, &job.voice_id, job.speed);
    let cached = shared.cache.get(&key);

    let (audio, format) = if let Some((audio, format)) = cached {
        tracing::debug!(fingerprint = %key, "audio cache hit, skipping synthesis");
        (audio, format)
    } else {
        let synth_result = shared
            .synthesizer
            .synthesize(&job.text, &job.voice_id, job.speed, &job.response_format, &job.cancel)
            .await;

        let audio = match synth_result {
            Ok(audio) => {
                shared.metrics.record_synthesis();
                audio
            }
            Err(e) => {
                shared.metrics.record_synthesis_error();
                tracing::warn!(error = %e, "tts synthesis failed");
                job.cancel.cancel();
                job.mark_processed();
                let _ = job.result_tx.send(Err(e));
                return;
            }
        };

        let format = AudioFormat::parse(&job.response_format);
        shared.cache.set(key, audio.clone(), format);
        (audio, format)
    };

    if shared.interrupted.load(Ordering::SeqCst) {
        job.cancel.cancel();
        job.mark_processed();
        let _ = job.result_tx.send(Err(PipelineError::Interrupted));
        shared.metrics.record_interrupts(1);
        return;
    }

    shared.state.store(STATE_PLAYING, Ordering::SeqCst);
    let sink = Arc::clone(&*shared.playback.read().unwrap_or_else(|e| e.into_inner()));
    let play_result = sink.play(&audio, format);
    shared.state.store(STATE_IDLE, Ordering::SeqCst);

    job.cancel.cancel();
    job.mark_processed();
    match play_result {
        Ok(()) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            shared.metrics.record_playback(latency_ms);
            let _ = job.result_tx.send(Ok(()));
        }
        Err(e) => {
            let _ = job.result_tx.send(Err(e));
        }
    }
}
