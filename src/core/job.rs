use std::fmt;
use std::process::ExitStatus;
use std::str::FromStr;

use nix::unistd::Pid;

use crate::errors::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Completed,
}

/// One stage of a launched pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Process {
    argv: String,
    /// `id` is None when no OS process was started for the stage, e.g. a
    /// builtin that ran inside the shell or a program that failed to spawn.
    id: Option<Pid>,
    status: ProcessStatus,
    status_code: Option<ExitStatus>,
}

impl Process {
    pub fn new_launched<S: Into<String>>(argv: S, id: Pid) -> Self {
        Self {
            argv: argv.into(),
            id: Some(id),
            status: ProcessStatus::Running,
            status_code: None,
        }
    }

    pub fn new_finished<S: Into<String>>(argv: S, status_code: ExitStatus) -> Self {
        Self {
            argv: argv.into(),
            id: None,
            status: ProcessStatus::Completed,
            status_code: Some(status_code),
        }
    }

    pub fn argv(&self) -> &str {
        &self.argv
    }

    pub fn id(&self) -> Option<Pid> {
        self.id
    }

    pub fn status_code(&self) -> Option<ExitStatus> {
        self.status_code
    }

    pub fn is_running(&self) -> bool {
        self.status == ProcessStatus::Running
    }

    pub fn mark_exited(&mut self, status_code: ExitStatus) {
        self.status = ProcessStatus::Completed;
        self.status_code = Some(status_code);
    }

    /// Overrides the status of a stage whose work happened in the shell itself.
    pub fn set_status_code(&mut self, status_code: ExitStatus) {
        self.status_code = Some(status_code);
    }
}

/// The processes of one launched pipeline, in pipeline order.
#[derive(Debug)]
pub struct ProcessGroup {
    /// Shared process group; only background pipelines get their own.
    pub id: Option<Pid>,
    pub processes: Vec<Process>,
    pub foreground: bool,
    /// Set when launching stopped part way; `processes` holds only the
    /// stages that were reached.
    pub aborted: Option<Error>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
}

/// A background pipeline tracked until every one of its processes terminates.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    input: String,
    pgid: Option<Pid>,
    processes: Vec<Process>,
    state: JobState,
}

impl Job {
    pub fn new(id: JobId, input: &str, pgid: Option<Pid>, processes: Vec<Process>) -> Self {
        let mut job = Self {
            id,
            input: input.to_string(),
            pgid,
            processes,
            state: JobState::Running,
        };
        job.update_state();
        job
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pgid(&self) -> Option<Pid> {
        self.pgid
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Pid shown to the user: the first process that was actually started.
    pub fn representative_pid(&self) -> Option<Pid> {
        self.processes.iter().filter_map(Process::id).next()
    }

    pub fn is_completed(&self) -> bool {
        self.state == JobState::Done
    }

    /// Pids of the processes that have not been reaped yet.
    pub fn running_pids(&self) -> Vec<Pid> {
        self.processes
            .iter()
            .filter(|p| p.is_running())
            .filter_map(Process::id)
            .collect()
    }

    pub fn mark_exited(&mut self, pid: Pid, status_code: ExitStatus) {
        if let Some(process) = self.processes.iter_mut().find(|p| p.id() == Some(pid)) {
            process.mark_exited(status_code);
        }
        self.update_state();
    }

    /// Status of the last stage, once it is known.
    pub fn last_status_code(&self) -> Option<ExitStatus> {
        self.processes.last().and_then(Process::status_code)
    }

    /// A job is done only once every one of its processes has been reaped.
    fn update_state(&mut self) {
        if self.processes.iter().all(|p| !p.is_running()) {
            self.state = JobState::Done;
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "id: {}\tpgid: {:?}\tstate: {:?}\tinput: {}",
            self.id, self.pgid, self.state, self.input
        )
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pid = self
            .representative_pid()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(f, "[{}]\t{:>8}\t{}", self.id, pid, self.input)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    /// Accepts both `3` and `%3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = if s.starts_with('%') { &s[1..] } else { s };
        digits.parse::<u32>().map(JobId)
    }
}
