use std::io::Write;

use crate::errors::Result;
use crate::shell::job_control::JobTable;

/// Lists running background jobs in the order they were started.
pub fn run(jobs: &JobTable, stdout: &mut dyn Write) -> Result<()> {
    for job in jobs.list_jobs() {
        writeln!(stdout, "{}", job)?;
    }
    stdout.flush()?;
    Ok(())
}
