//! Worker-process side of the bridge.
//!
//! The worker reads one [`WorkerJob`] as JSON from stdin, performs the
//! exchange with the same transport the async path uses, and leaves exactly
//! one [`BridgeRecord`] at the job's result path.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::bridge::BridgeRecord;
use crate::engine::{ResolvedRequest, execute};

#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub result_path: PathBuf,
    pub request: ResolvedRequest,
}

/// Entry point of the worker binary.
pub fn run_from_reader<R: Read>(mut reader: R) -> Result<()> {
    let mut payload = String::new();
    reader.read_to_string(&mut payload)?;
    let job: WorkerJob = serde_json::from_str(&payload)?;
    run(&job)
}

pub fn run(job: &WorkerJob) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let record = match runtime.block_on(execute(&job.request)) {
        Ok((code, body)) => BridgeRecord::Status {
            code,
            body: String::from_utf8_lossy(&body).into_owned(),
        },
        Err(failure) => BridgeRecord::Error(failure),
    };

    write_record(&job.result_path, &record)
}

/// Writes next to the result file, then renames over it, so a polling reader
/// sees either nothing or the whole record.
pub(crate) fn write_record(path: &Path, record: &BridgeRecord) -> Result<()> {
    let partial = partial_path(path);
    fs::write(&partial, record.encode()?)?;
    fs::rename(&partial, path)?;
    Ok(())
}

pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
