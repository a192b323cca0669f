pub mod docker;

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncWrite;

use crate::error::Result;

/// Hard resource ceilings applied to every sandbox. Network access is
/// always disabled; there is no opt-out.
#[derive(Clone, Copy, Debug)]
pub struct ResourceLimits {
    pub memory_mib: u64,
    pub cpu_cores: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mib: 128,
            cpu_cores: 1.0,
        }
    }
}

/// Everything needed to provision one isolated execution context: the
/// image to boot, the argv to run, and the job-scoped workspace mounted
/// read/write at `/app`.
#[derive(Clone, Debug)]
pub struct SandboxSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub workspace: PathBuf,
    pub limits: ResourceLimits,
}

/// Opaque runtime-level identifier for a provisioned sandbox.
#[derive(Clone, Debug)]
pub struct SandboxHandle(pub String);

/// One clean chunk of process output. Any transport-level framing is
/// stripped by the adapter before a chunk reaches the engine.
#[derive(Clone, Debug)]
pub enum OutputChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// Live I/O for a running sandbox: ordered output chunks on two
/// logically separate channels, and a byte sink feeding its stdin.
pub struct SandboxIo {
    pub output: Pin<Box<dyn Stream<Item = OutputChunk> + Send>>,
    pub stdin: Pin<Box<dyn AsyncWrite + Send>>,
}

/// Seam between orchestration and the underlying process/container
/// runtime. Swapping runtimes must not touch the engine.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle>;
    async fn start(&self, handle: &SandboxHandle) -> Result<()>;
    async fn attach(&self, handle: &SandboxHandle) -> Result<SandboxIo>;
    /// Suspends the caller until the process exits; returns its exit code.
    async fn wait(&self, handle: &SandboxHandle) -> Result<i64>;
    /// Idempotent: killing an already-exited or already-killed sandbox
    /// is a no-op, not an error.
    async fn kill(&self, handle: &SandboxHandle) -> Result<()>;
    /// Idempotent: reclaims all runtime-level state for the sandbox.
    async fn remove(&self, handle: &SandboxHandle) -> Result<()>;
}
