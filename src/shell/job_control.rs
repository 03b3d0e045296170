use std::fmt;
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::core::job::{Job, JobId, Process, ProcessGroup};
use crate::errors::{self, ErrorKind, Result};
use crate::util::QuashExitStatusExt;

/// Ignores interactive and job-control signals so that Ctrl-C only reaches
/// the foreground pipeline, which shares the shell's process group.
pub fn initialize_job_control() -> Result<()> {
    unsafe {
        signal::signal(Signal::SIGINT, SigHandler::SigIgn)?;
        signal::signal(Signal::SIGQUIT, SigHandler::SigIgn)?;
        signal::signal(Signal::SIGTSTP, SigHandler::SigIgn)?;
        signal::signal(Signal::SIGTTIN, SigHandler::SigIgn)?;
        signal::signal(Signal::SIGTTOU, SigHandler::SigIgn)?;
    }

    Ok(())
}

/// Background jobs that have not been reported as completed yet.
#[derive(Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    job_count: u32,
}

impl JobTable {
    /// Registers a background pipeline. Ids start at 1 and are never reused.
    pub fn create_job(&mut self, input: &str, process_group: ProcessGroup) -> JobId {
        let job_id = self.get_next_job_id();
        let job = Job::new(job_id, input, process_group.id, process_group.processes);
        debug!("created job {:?}", job);
        self.jobs.push(job);
        job_id
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn get_job(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id() == job_id)
    }

    /// Running jobs in the order they were started.
    pub fn list_jobs(&self) -> Vec<&Job> {
        self.jobs.iter().filter(|job| !job.is_completed()).collect()
    }

    /// Delivers `signal` to the process group of `job_id`. `None` performs
    /// only the permission and existence check.
    pub fn signal_job(&self, job_id: JobId, signal: Option<Signal>) -> Result<()> {
        let job = self
            .get_job(job_id)
            .ok_or_else(|| ErrorKind::NoSuchJob(job_id.to_string()))?;
        let pgid = match job.pgid() {
            Some(pgid) => pgid,
            None => {
                debug!("job [{}] has no process group to signal", job_id);
                return Ok(());
            }
        };

        debug!("sending {:?} to process group {}", signal, pgid);
        signal::killpg(pgid, signal).map_err(|e| {
            errors::builtin_command(format!("kill: ({}) - {}", pgid, e.desc()), 1)
        })
    }

    /// Reaps whatever background processes have terminated, without
    /// blocking, and removes and returns the jobs that are now complete.
    /// Each job is returned by exactly one call.
    pub fn poll_jobs(&mut self) -> Vec<Job> {
        for job in &mut self.jobs {
            for pid in job.running_pids() {
                match reap(pid, false) {
                    Ok(Some(status)) => job.mark_exited(pid, status),
                    Ok(None) => (),
                    Err(e) => error!("failed to poll process {} of job [{}]: {}", pid, job.id(), e),
                }
            }
        }

        let (done, running): (Vec<Job>, Vec<Job>) =
            self.jobs.drain(..).partition(Job::is_completed);
        self.jobs = running;
        done
    }

    fn get_next_job_id(&mut self) -> JobId {
        self.job_count += 1;
        JobId(self.job_count)
    }
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} jobs\tjob_count: {}", self.jobs.len(), self.job_count)?;
        for job in &self.jobs {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}

/// Blocks until every launched process has terminated and returns the status
/// of the last stage.
pub fn wait_for_processes(processes: &mut [Process]) -> ExitStatus {
    for process in processes.iter_mut().filter(|p| p.is_running()) {
        let pid = match process.id() {
            Some(pid) => pid,
            None => continue,
        };
        match reap(pid, true) {
            Ok(Some(status)) => process.mark_exited(status),
            Ok(None) => (),
            Err(e) => {
                error!("failed to wait for process {} ({}): {}", pid, process.argv(), e);
                process.mark_exited(ExitStatus::from_failure());
            }
        }
    }

    processes
        .last()
        .and_then(Process::status_code)
        .unwrap_or_else(ExitStatus::from_success)
}

/// Collects the status of `pid`. Returns `None` if it is still running and
/// `block` is false.
fn reap(pid: Pid, block: bool) -> Result<Option<ExitStatus>> {
    let flags = if block { None } else { Some(WaitPidFlag::WNOHANG) };
    loop {
        match wait::waitpid(pid, flags) {
            Ok(WaitStatus::Exited(_, code)) => {
                debug!("{} exited with {}", pid, code);
                return Ok(Some(ExitStatus::from_status(code)));
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                debug!("{} terminated by signal {:?}", pid, signal);
                return Ok(Some(ExitStatus::from_signal_number(signal as i32)));
            }
            Ok(WaitStatus::StillAlive) => return Ok(None),
            Ok(status) => {
                debug!("ignoring wait status {:?}", status);
                if !block {
                    return Ok(None);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => {
                warn!("process {} was already reaped", pid);
                return Ok(Some(ExitStatus::from_failure()));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::process::CommandExt;
    use std::process::Command;
    use std::thread;
    use std::time::{Duration, Instant};

    fn spawn_in_own_group(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program)
            .args(args)
            .process_group(0)
            .spawn()
            .unwrap();
        Pid::from_raw(child.id() as i32)
    }

    fn background_group(text: &str, pid: Pid) -> ProcessGroup {
        ProcessGroup {
            id: Some(pid),
            processes: vec![Process::new_launched(text, pid)],
            foreground: false,
            aborted: None,
        }
    }

    fn poll_until_done(jobs: &mut JobTable) -> Vec<Job> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let done = jobs.poll_jobs();
            if !done.is_empty() || Instant::now() > deadline {
                return done;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_job_ids_are_sequential() {
        let mut jobs = JobTable::default();
        let first = jobs.create_job(
            "cd / &",
            ProcessGroup {
                id: None,
                processes: vec![Process::new_finished("cd /", ExitStatus::from_success())],
                foreground: false,
                aborted: None,
            },
        );
        let second = jobs.create_job(
            "cd / &",
            ProcessGroup {
                id: None,
                processes: Vec::new(),
                foreground: false,
                aborted: None,
            },
        );
        assert_eq!(first, JobId(1));
        assert_eq!(second, JobId(2));

        // already done, so not listed but still reported once
        assert!(jobs.list_jobs().is_empty());
        assert_eq!(jobs.poll_jobs().len(), 2);
        assert!(jobs.poll_jobs().is_empty());
        assert!(!jobs.has_jobs());

        let pid = spawn_in_own_group("true", &[]);
        assert_eq!(jobs.create_job("true &", background_group("true", pid)), JobId(3));
        poll_until_done(&mut jobs);
    }

    #[test]
    fn test_poll_reports_completion_exactly_once() {
        let mut jobs = JobTable::default();
        let pid = spawn_in_own_group("sh", &["-c", "exit 3"]);
        let job_id = jobs.create_job("sh -c \"exit 3\" &", background_group("sh", pid));

        let done = poll_until_done(&mut jobs);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id(), job_id);
        assert_eq!(done[0].last_status_code().and_then(|s| s.code()), Some(3));

        assert!(jobs.poll_jobs().is_empty());
        assert!(jobs.get_job(job_id).is_none());
    }

    #[test]
    fn test_running_job_is_listed_and_killable() {
        let mut jobs = JobTable::default();
        let pid = spawn_in_own_group("sleep", &["30"]);
        let job_id = jobs.create_job("sleep 30 &", background_group("sleep 30", pid));

        assert!(jobs.poll_jobs().is_empty());
        assert_eq!(jobs.list_jobs().len(), 1);
        jobs.signal_job(job_id, None).unwrap();
        jobs.signal_job(job_id, Some(Signal::SIGTERM)).unwrap();

        let done = poll_until_done(&mut jobs);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].last_status_code().and_then(|s| s.code()), Some(143));
        assert!(jobs.list_jobs().is_empty());
    }

    #[test]
    fn test_signal_unknown_job() {
        let jobs = JobTable::default();
        let e = jobs.signal_job(JobId(5), Some(Signal::SIGTERM)).unwrap_err();
        assert_eq!(e.to_string(), "5: no such job");
    }

    #[test]
    fn test_wait_for_processes_returns_last_status() {
        let first = spawn_in_own_group("true", &[]);
        let last = spawn_in_own_group("sh", &["-c", "exit 4"]);
        let mut processes = vec![
            Process::new_launched("true", first),
            Process::new_finished("cd /", ExitStatus::from_success()),
            Process::new_launched("sh -c \"exit 4\"", last),
        ];

        let status = wait_for_processes(&mut processes);
        assert_eq!(status.code(), Some(4));
        assert!(processes.iter().all(|p| !p.is_running()));
    }
}
