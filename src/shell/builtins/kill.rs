use std::convert::TryFrom;

use nix::sys::signal::Signal;

use crate::core::job::JobId;
use crate::errors::{self, Result};
use crate::shell::job_control::JobTable;

/// Sends signal number `signal` to every process of job `job_id`. Signal 0
/// only checks that the job's processes can be signaled.
pub fn run(jobs: &JobTable, job_id: JobId, signal: i32) -> Result<()> {
    let signal = match signal {
        0 => None,
        n => Some(Signal::try_from(n).map_err(|_| {
            errors::builtin_command(format!("kill: {}: invalid signal specification", n), 1)
        })?),
    };

    jobs.signal_job(job_id, signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_signal_number() {
        let jobs = JobTable::default();
        let e = run(&jobs, JobId(1), 4096).unwrap_err();
        assert_eq!(e.to_string(), "kill: 4096: invalid signal specification");
    }

    #[test]
    fn test_unknown_job() {
        let jobs = JobTable::default();
        let e = run(&jobs, JobId(7), 9).unwrap_err();
        assert_eq!(e.to_string(), "7: no such job");
    }
}
