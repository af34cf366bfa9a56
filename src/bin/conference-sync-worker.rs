//! Worker process for sync-mode requests.
//!
//! Reads one job from stdin, performs the exchange and writes the record to
//! the job's result file. Launched by the bridge; not meant to be run by hand.

use std::process::ExitCode;

#[expect(
    clippy::print_stderr,
    reason = "stderr is inherited from the caller and is the only channel left once the job is unreadable"
)]
fn main() -> ExitCode {
    match conference_client_sdk::bridge::worker::run_from_reader(std::io::stdin().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("conference-sync-worker: {e}");
            ExitCode::FAILURE
        }
    }
}
