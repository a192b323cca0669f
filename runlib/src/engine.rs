use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::bus::{BusSubscription, EventBus};
use crate::error::Result;
use crate::events::{self, EventBody, StdinFrame, StreamEvent};
use crate::language::Language;
use crate::sandbox::{OutputChunk, ResourceLimits, SandboxHandle, SandboxRuntime, SandboxSpec};
use crate::status::{JobRecord, JobState};
use crate::store::JobStore;
use crate::types::{JobId, JobRequest};

/// Synthetic stderr marker appended when the wall-clock budget fires.
const TIMEOUT_MARKER: &str = "[Process killed: timeout]\n";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Wall-clock budget for one sandboxed process.
    pub timeout: Duration,
    /// Extra time allowed for the runtime to reap a killed process.
    pub kill_grace: Duration,
    /// Retention window for status records.
    pub ttl: Duration,
    pub limits: ResourceLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            kill_grace: Duration::from_secs(5),
            ttl: Duration::from_secs(3600),
            limits: ResourceLimits::default(),
        }
    }
}

/// What one sandbox session left behind, however it ended.
struct SessionOutcome {
    stdout: String,
    stderr: String,
    exit_code: Option<i64>,
    timed_out: bool,
}

/// The job orchestrator.
///
/// Drives one dequeued job from `Running` to a terminal record:
/// resolves the language, materializes the source file, provisions a
/// sandbox under resource limits, bridges live I/O over the event bus,
/// enforces the wall-clock budget, and persists the terminal status.
/// All collaborators are explicit handles so multiple engines can run
/// in one process against fakes.
pub struct Engine {
    runtime: Arc<dyn SandboxRuntime>,
    store: Arc<dyn JobStore>,
    bus: Arc<dyn EventBus>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        store: Arc<dyn JobStore>,
        bus: Arc<dyn EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            runtime,
            store,
            bus,
            config,
        }
    }

    /// Process one delivery end-to-end.
    ///
    /// `Ok(())` means the job is resolved and the delivery may be
    /// acknowledged, including the failure outcomes that write a
    /// terminal `Failed` record. `Err` means the authoritative record
    /// could not be written and the delivery must be redelivered.
    pub async fn process(&self, job: &JobRequest) -> Result<()> {
        // at-least-once delivery: a resolved job is never rerun. A
        // surviving Running record means a previous attempt died or
        // could not write its outcome, so the job runs again rather
        // than resolving with no terminal record
        let prior = match self.store.get(job.job_id).await {
            Ok(prior) => prior,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "claim check read failed");
                None
            }
        };
        if let Some(record) = &prior {
            if record.status.is_terminal() {
                info!(job_id = %job.job_id, status = ?record.status, "duplicate delivery, already resolved");
                return Ok(());
            }
        }
        let submitted_at = prior
            .map(|record| record.submitted_at)
            .unwrap_or_else(Utc::now);

        // fail fast on an unsupported language: terminal record, no
        // sandbox, no start timestamp
        let language = match job.language.parse::<Language>() {
            Ok(language) => language,
            Err(err) => {
                warn!(job_id = %job.job_id, language = %job.language, "unsupported language");
                let record = JobRecord {
                    status: JobState::Failed,
                    finished_at: Some(Utc::now()),
                    error_message: Some(err.to_string()),
                    ..JobRecord::pending(submitted_at)
                };
                self.store.put(job.job_id, &record, self.config.ttl).await?;
                self.publish_completion(job.job_id, None).await;
                return Ok(());
            }
        };

        let started_at = Utc::now();
        let running = JobRecord {
            status: JobState::Running,
            started_at: Some(started_at),
            ..JobRecord::pending(submitted_at)
        };
        self.store.put(job.job_id, &running, self.config.ttl).await?;
        info!(job_id = %job.job_id, language = %language, "job running");

        let terminal = match self.run_sandbox(job, language).await {
            Ok(outcome) => {
                let status = if outcome.timed_out {
                    JobState::TimedOut
                } else {
                    JobState::Completed
                };
                info!(job_id = %job.job_id, status = ?status, exit_code = ?outcome.exit_code, "job finished");
                JobRecord {
                    status,
                    started_at: Some(started_at),
                    finished_at: Some(Utc::now()),
                    stdout: Some(outcome.stdout),
                    stderr: Some(outcome.stderr),
                    exit_code: outcome.exit_code,
                    ..JobRecord::pending(submitted_at)
                }
            }
            Err(err) => {
                error!(job_id = %job.job_id, error = %err, "job failed");
                JobRecord {
                    status: JobState::Failed,
                    started_at: Some(started_at),
                    finished_at: Some(Utc::now()),
                    error_message: Some(err.to_string()),
                    ..JobRecord::pending(submitted_at)
                }
            }
        };

        let exit_code = terminal.exit_code;
        self.store
            .put(job.job_id, &terminal, self.config.ttl)
            .await?;
        self.publish_completion(job.job_id, exit_code).await;
        Ok(())
    }

    /// Provision a sandbox session for one job and see it through to an
    /// outcome. Whatever happens past `create`, removal is attempted
    /// exactly once before returning.
    async fn run_sandbox(&self, job: &JobRequest, language: Language) -> Result<SessionOutcome> {
        let spec = language.spec();

        // job-scoped workspace holding exactly one source file; the
        // directory is reclaimed when this guard drops
        let workspace = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job.job_id))
            .tempdir()?;
        tokio::fs::write(workspace.path().join(spec.file_name), &job.code).await?;

        let sandbox_spec = SandboxSpec {
            name: format!("sandbox-{}", job.job_id),
            image: spec.image.to_string(),
            command: spec.command.iter().map(|s| s.to_string()).collect(),
            workspace: workspace.path().to_path_buf(),
            limits: self.config.limits,
        };

        // subscribe before the process starts so no early frame is lost
        let stdin_sub = self
            .bus
            .subscribe(&events::stdin_channel(job.job_id))
            .await?;

        let handle = self.runtime.create(&sandbox_spec).await?;
        let session = self.drive_session(job.job_id, &handle, stdin_sub).await;

        // unconditional: a removal failure must not block finalization
        if let Err(e) = self.runtime.remove(&handle).await {
            warn!(job_id = %job.job_id, error = %e, "sandbox removal failed");
        }
        session
    }

    async fn drive_session(
        &self,
        job_id: JobId,
        handle: &SandboxHandle,
        mut stdin_sub: BusSubscription,
    ) -> Result<SessionOutcome> {
        let io = self.runtime.attach(handle).await?;
        let mut output = io.output;
        let mut stdin = io.stdin;

        self.runtime.start(handle).await?;

        // output drain: buffer accumulation and bus publication happen
        // from the same chunk-arrival point, preserving per-stream
        // order. The buffers live outside the task so the partial
        // transcript survives if the stream has to be abandoned
        let buffers = Arc::new(Mutex::new((String::new(), String::new())));
        let bus = Arc::clone(&self.bus);
        let sink = Arc::clone(&buffers);
        let mut drain = tokio::spawn(async move {
            while let Some(chunk) = output.next().await {
                let event = match chunk {
                    OutputChunk::Stdout(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        sink.lock().await.0.push_str(&text);
                        StreamEvent {
                            job_id,
                            body: EventBody::Stdout(text),
                        }
                    }
                    OutputChunk::Stderr(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        sink.lock().await.1.push_str(&text);
                        StreamEvent {
                            job_id,
                            body: EventBody::Stderr(text),
                        }
                    }
                };
                publish_event(bus.as_ref(), &event).await;
            }
        });

        // stdin forward: frames on the input channel go to the process
        // verbatim; frames arriving after the session ends are dropped
        // with the subscription
        let forward = tokio::spawn(async move {
            while let Some(payload) = stdin_sub.recv().await {
                match serde_json::from_slice::<StdinFrame>(&payload) {
                    Ok(frame) => {
                        if stdin.write_all(frame.data.as_bytes()).await.is_err() {
                            break;
                        }
                        let _ = stdin.flush().await;
                    }
                    Err(e) => warn!(job_id = %job_id, error = %e, "malformed stdin frame"),
                }
            }
        });

        // the natural exit and the timer race; whichever side wins is
        // authoritative and the loser's effects are absorbed
        let raced: Result<(Option<i64>, bool)> = tokio::select! {
            result = self.runtime.wait(handle) => result.map(|code| (Some(code), false)),
            _ = tokio::time::sleep(self.config.timeout) => {
                warn!(job_id = %job_id, "wall-clock budget exceeded, killing sandbox");
                if let Err(e) = self.runtime.kill(handle).await {
                    warn!(job_id = %job_id, error = %e, "sandbox kill failed");
                }
                // bounded reap so a stuck runtime cannot hold the worker
                if tokio::time::timeout(self.config.kill_grace, self.runtime.wait(handle))
                    .await
                    .is_err()
                {
                    warn!(job_id = %job_id, "sandbox not reaped within grace period");
                }
                Ok((None, true))
            }
        };

        // both bridging tasks are stopped before teardown proceeds.
        // The drain ends with the output stream, and a stream that
        // outlives its process must not hold the worker, so the join
        // is bounded and whatever was captured so far is kept
        forward.abort();
        let _ = forward.await;
        match tokio::time::timeout(self.config.kill_grace, &mut drain).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(job_id = %job_id, error = %e, "output drain task failed"),
            Err(_) => {
                warn!(job_id = %job_id, "output stream still open after session end, abandoning drain");
                drain.abort();
                let _ = drain.await;
            }
        }
        let (mut stdout, mut stderr) = {
            let mut guard = buffers.lock().await;
            (std::mem::take(&mut guard.0), std::mem::take(&mut guard.1))
        };

        let (exit_code, timed_out) = raced?;
        if timed_out {
            stderr.push_str(TIMEOUT_MARKER);
            publish_event(
                self.bus.as_ref(),
                &StreamEvent {
                    job_id,
                    body: EventBody::Stderr(TIMEOUT_MARKER.to_string()),
                },
            )
            .await;
        }

        Ok(SessionOutcome {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }

    async fn publish_completion(&self, job_id: JobId, exit_code: Option<i64>) {
        publish_event(
            self.bus.as_ref(),
            &StreamEvent {
                job_id,
                body: EventBody::Completion { exit_code },
            },
        )
        .await;
    }
}

/// Best-effort publish: the bus exists to make execution feel live, the
/// store record is authoritative, so a publish failure never aborts a
/// job.
async fn publish_event(bus: &dyn EventBus, event: &StreamEvent) {
    let channel = events::output_channel(event.job_id);
    match serde_json::to_vec(event) {
        Ok(payload) => {
            if let Err(e) = bus.publish(&channel, &payload).await {
                warn!(job_id = %event.job_id, error = %e, "event publish failed");
            }
        }
        Err(e) => warn!(job_id = %event.job_id, error = %e, "event encode failed"),
    }
}
