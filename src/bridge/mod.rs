//! Synchronous execution through an isolated worker process.
//!
//! `send` in sync mode must not return until the exchange is over, without
//! relying on an event loop the caller may not have. The bridge:
//!
//! 1. creates an empty result file named after this process and a fresh
//!    token,
//! 2. hands the resolved request to a `conference-sync-worker` process on
//!    its stdin,
//! 3. polls the result file on the calling thread until a record appears,
//! 4. parses the record and removes the file on every exit path.
//!
//! No timeout is enforced. A worker that exits without writing is detected
//! and reported as a failure, but a worker that never exits (for example a
//! server that accepts the connection and never answers) blocks the caller
//! indefinitely. `abort` cannot reach a worker once it has been spawned.
//!
//! The worker binary is built with this crate but is not installed alongside
//! a dependent's executable. Applications set its path through
//! [`SyncBridge::builder`], `ClientConfig::with_sync_worker` or
//! [`WORKER_ENV`]; a worker that cannot be spawned fails the exchange.

mod record;
pub mod worker;

use std::error::Error as StdError;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use bon::Builder;
use uuid::Uuid;

pub use record::{BridgeRecord, ERROR_PREFIX, STATUS_PREFIX};
use worker::{WorkerJob, partial_path};

use crate::Result;
use crate::engine::ResolvedRequest;
use crate::error::{Error, Kind};

/// File name of the worker executable.
pub const WORKER_BIN: &str = "conference-sync-worker";
/// Environment variable overriding the worker executable path.
pub const WORKER_ENV: &str = "CONFERENCE_SYNC_WORKER";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug, Builder)]
pub struct SyncBridge {
    /// Worker executable. Resolved from the environment or next to the
    /// current executable when unset.
    #[builder(into)]
    worker: Option<PathBuf>,
    /// Directory for result files; the system temp dir when unset.
    #[builder(into)]
    scratch_dir: Option<PathBuf>,
    /// Pause between polls. `Duration::ZERO` spins.
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    poll_interval: Duration,
}

impl Default for SyncBridge {
    fn default() -> Self {
        Self {
            worker: None,
            scratch_dir: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SyncBridge {
    /// Runs `request` in a worker process and blocks until it reports.
    ///
    /// `Err` means the bridge itself failed (worker missing, I/O on the
    /// result file); a failed exchange is `Ok(BridgeRecord::Error)`.
    pub fn run(&self, request: &ResolvedRequest) -> Result<BridgeRecord> {
        let worker = self.worker_path()?;
        let result = ResultFile::create(self.result_path())?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            worker = %worker.display(),
            result = %result.path().display(),
            "spawning sync worker"
        );

        let job = WorkerJob {
            result_path: result.path().to_path_buf(),
            request: request.clone(),
        };
        let payload = serde_json::to_vec(&job)?;

        let mut child = Command::new(&worker)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;

        if let Err(e) = feed(&mut child, &payload) {
            let _: io::Result<()> = child.kill();
            let _: io::Result<ExitStatus> = child.wait();
            return Err(e);
        }

        let contents = self.poll(result.path(), &mut child);
        let _: io::Result<ExitStatus> = child.wait();
        let record = BridgeRecord::parse(&contents?)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(record = %record, "sync worker finished");

        Ok(record)
    }

    /// Worker executable: explicit path, then [`WORKER_ENV`], then
    /// [`WORKER_BIN`] beside the current executable or one directory up
    /// (test binaries live in `deps/`).
    pub fn worker_path(&self) -> Result<PathBuf> {
        if let Some(worker) = &self.worker {
            return Ok(worker.clone());
        }
        if let Some(worker) = std::env::var_os(WORKER_ENV).filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(worker));
        }

        let exe = std::env::current_exe()?;
        let name = format!("{WORKER_BIN}{}", std::env::consts::EXE_SUFFIX);
        exe.parent()
            .into_iter()
            .flat_map(|dir| [Some(dir), dir.parent()])
            .flatten()
            .map(|dir| dir.join(&name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                Error::validation(format!(
                    "sync worker `{name}` not found; set {WORKER_ENV} or configure its path"
                ))
            })
    }

    /// Unique per call: process id plus a random token.
    #[must_use]
    pub fn result_path(&self) -> PathBuf {
        let dir = self
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!(
            "conference-sdk-sync-{}-{}",
            std::process::id(),
            Uuid::new_v4().simple()
        ))
    }

    fn poll(&self, path: &Path, child: &mut Child) -> Result<String> {
        loop {
            let contents = fs::read_to_string(path)?;
            if !contents.is_empty() {
                return Ok(contents);
            }

            if let Some(status) = child.try_wait()? {
                // The record may have landed between the read and the exit.
                let contents = fs::read_to_string(path)?;
                if !contents.is_empty() {
                    return Ok(contents);
                }
                return Err(Error::with_source(Kind::Internal, WorkerExited { status }));
            }

            if self.poll_interval.is_zero() {
                std::hint::spin_loop();
            } else {
                std::thread::sleep(self.poll_interval);
            }
        }
    }
}

fn feed(child: &mut Child, payload: &[u8]) -> Result<()> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::validation("sync worker stdin was not captured"))?;
    stdin.write_all(payload)?;
    Ok(())
}

/// Result file owned by one sync call; removed when dropped.
#[derive(Debug)]
struct ResultFile {
    path: PathBuf,
}

impl ResultFile {
    fn create(path: PathBuf) -> Result<Self> {
        File::create(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ResultFile {
    fn drop(&mut self) {
        let _: io::Result<()> = fs::remove_file(&self.path);
        let _: io::Result<()> = fs::remove_file(partial_path(&self.path));
    }
}

/// The worker exited without leaving a record.
#[non_exhaustive]
#[derive(Debug)]
pub struct WorkerExited {
    pub status: ExitStatus,
}

impl fmt::Display for WorkerExited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sync worker exited without a result ({})", self.status)
    }
}

impl StdError for WorkerExited {}
