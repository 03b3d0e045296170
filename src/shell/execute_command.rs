//! Turns one validated pipeline into running processes: creates the pipes,
//! opens redirect targets, starts a process per stage, and runs the stages
//! that only have meaning inside the shell.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{self, ExitStatus, Stdio};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::{self, ForkResult, Pid};

use crate::core::command::{is_background, validate_pipeline, Stage};
use crate::core::job::{Process, ProcessGroup};
use crate::errors::{self, Error, ErrorKind, Result};
use crate::shell::builtins::{self, BuiltinOutput, Dispatch, ExecutionContext};
use crate::shell::job_control::JobTable;
use crate::util::{self, QuashExitStatusExt};

/// Where one standard stream of a stage comes from or goes to.
#[derive(Debug)]
enum StageIo {
    Inherit,
    File(File),
    Pipe(OwnedFd),
}

impl StageIo {
    fn raw_fd(&self) -> Option<RawFd> {
        match self {
            StageIo::Inherit => None,
            StageIo::File(file) => Some(file.as_raw_fd()),
            StageIo::Pipe(fd) => Some(fd.as_raw_fd()),
        }
    }
}

impl From<StageIo> for Stdio {
    fn from(io: StageIo) -> Self {
        match io {
            StageIo::Inherit => Self::inherit(),
            StageIo::File(file) => file.into(),
            StageIo::Pipe(fd) => fd.into(),
        }
    }
}

/// Every pipe of a pipeline, indexed by the boundary after stage `i`.
/// Whatever ends were not handed to a stage are closed when the pool drops.
#[derive(Debug)]
struct PipePool {
    readers: Vec<Option<OwnedFd>>,
    writers: Vec<Option<OwnedFd>>,
}

impl PipePool {
    fn new(pipeline: &[Stage]) -> Result<Self> {
        let boundaries = pipeline.len().saturating_sub(1);
        let mut pool = PipePool {
            readers: Vec::with_capacity(boundaries),
            writers: Vec::with_capacity(boundaries),
        };

        for stage in &pipeline[..boundaries] {
            if stage.pipe_to_next {
                let (reader, writer) = create_pipe()?;
                pool.readers.push(Some(reader));
                pool.writers.push(Some(writer));
            } else {
                pool.readers.push(None);
                pool.writers.push(None);
            }
        }

        Ok(pool)
    }

    fn take_reader(&mut self, boundary: usize) -> Option<OwnedFd> {
        self.readers.get_mut(boundary).and_then(Option::take)
    }

    fn take_writer(&mut self, boundary: usize) -> Option<OwnedFd> {
        self.writers.get_mut(boundary).and_then(Option::take)
    }

    fn raw_fds(&self) -> Vec<RawFd> {
        self.readers
            .iter()
            .chain(self.writers.iter())
            .filter_map(|fd| fd.as_ref().map(AsRawFd::as_raw_fd))
            .collect()
    }
}

fn create_pipe() -> Result<(OwnedFd, OwnedFd)> {
    unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| ErrorKind::ResourceExhausted("pipe".to_string(), e.desc().to_string()).into())
}

/// Resolves the stdin and stdout of the stage at `index`. File redirects
/// are opened here, so a missing input file fails only this stage.
fn open_streams(stage: &Stage, index: usize, pipes: &mut PipePool) -> Result<(StageIo, StageIo)> {
    let pipe_in = if stage.pipe_from_prev {
        index.checked_sub(1).and_then(|boundary| pipes.take_reader(boundary))
    } else {
        None
    };
    let pipe_out = if stage.pipe_to_next {
        pipes.take_writer(index)
    } else {
        None
    };

    let stdin = match (&stage.redirect_in, pipe_in) {
        (Some(path), _) => StageIo::File(File::open(path).map_err(|e| redirect_error(path, &e))?),
        (None, Some(fd)) => StageIo::Pipe(fd),
        (None, None) => StageIo::Inherit,
    };
    let stdout = match (&stage.redirect_out, pipe_out) {
        (Some(path), _) => StageIo::File(
            OpenOptions::new()
                .write(true)
                .create(true)
                .append(stage.append)
                .truncate(!stage.append)
                .open(path)
                .map_err(|e| redirect_error(path, &e))?,
        ),
        (None, Some(fd)) => StageIo::Pipe(fd),
        (None, None) => StageIo::Inherit,
    };

    Ok((stdin, stdout))
}

fn redirect_error(path: &Path, e: &io::Error) -> Error {
    errors::builtin_command(
        format!("{}: {}", path.display(), util::describe_io_error(e)),
        1,
    )
}

#[derive(Debug)]
enum Launch {
    Started(Pid),
    /// No process is left running for the stage.
    Finished(ExitStatus),
}

/// Starts the processes of one pipeline and tracks its process group.
#[derive(Debug)]
struct Launcher {
    background: bool,
    reset_signals: bool,
    pgid: Option<Pid>,
}

impl Launcher {
    fn spawn_external(
        &mut self,
        argv: &[String],
        stdin: StageIo,
        stdout: StageIo,
    ) -> Result<Launch> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ErrorKind::InvalidPipeline("empty command".to_string()))?;

        let mut command = process::Command::new(program);
        command.args(args).stdin(stdin).stdout(stdout);
        if self.background {
            command.process_group(self.pgid.map_or(0, Pid::as_raw));
        }
        if self.reset_signals {
            unsafe {
                command.pre_exec(restore_default_signals);
            }
        }

        match command.spawn() {
            Ok(child) => {
                let pid = Pid::from_raw(child.id() as libc::pid_t);
                debug!("spawned {} as {}", program, pid);
                self.join(pid);
                Ok(Launch::Started(pid))
            }
            Err(e) => match e.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::ENOMEM) | Some(libc::EMFILE)
                | Some(libc::ENFILE) => Err(ErrorKind::ResourceExhausted(
                    "fork".to_string(),
                    util::describe_io_error(&e),
                )
                .into()),
                _ if e.kind() == io::ErrorKind::NotFound => {
                    let e = Error::from(ErrorKind::CommandNotFound(program.clone()));
                    eprintln!("quash: {}", e);
                    Ok(Launch::Finished(ExitStatus::from_status(e.exit_code())))
                }
                _ => {
                    eprintln!("quash: {}: {}", program, util::describe_io_error(&e));
                    Ok(Launch::Finished(ExitStatus::from_status(126)))
                }
            },
        }
    }

    /// Forks a child that writes the builtin's pre-rendered output to the
    /// stage's stdout and exits with its code.
    fn fork_builtin(
        &mut self,
        output: BuiltinOutput,
        stdin: StageIo,
        stdout: StageIo,
        pipes: &PipePool,
    ) -> Result<Launch> {
        let stdout_fd = stdout.raw_fd();
        let mut inherited_fds = pipes.raw_fds();
        inherited_fds.extend(stdin.raw_fd());
        inherited_fds.extend(stdout_fd);
        let pgid = if self.background {
            Some(self.pgid.unwrap_or_else(|| Pid::from_raw(0)))
        } else {
            None
        };

        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => unsafe {
                run_builtin_child(&output, pgid, stdout_fd, &inherited_fds)
            },
            Ok(ForkResult::Parent { child }) => {
                debug!("forked builtin as {}", child);
                if self.background {
                    let pgid = self.pgid.unwrap_or(child);
                    log_if_err!(
                        unistd::setpgid(child, pgid),
                        "failed to move {} into process group {}",
                        child,
                        pgid
                    );
                }
                self.join(child);
                Ok(Launch::Started(child))
            }
            Err(e) => {
                Err(ErrorKind::ResourceExhausted("fork".to_string(), e.desc().to_string()).into())
            }
        }
    }

    /// The first process of a background pipeline leads its group.
    fn join(&mut self, pid: Pid) {
        if self.background && self.pgid.is_none() {
            self.pgid = Some(pid);
        }
    }
}

fn restore_default_signals() -> io::Result<()> {
    for &sig in &[
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
    ] {
        unsafe { signal::signal(sig, SigHandler::SigDfl) }.map_err(io::Error::from)?;
    }
    Ok(())
}

/// Body of a forked builtin. Only async-signal-safe calls are allowed here.
unsafe fn run_builtin_child(
    output: &BuiltinOutput,
    pgid: Option<Pid>,
    stdout_fd: Option<RawFd>,
    inherited_fds: &[RawFd],
) -> ! {
    if let Some(pgid) = pgid {
        libc::setpgid(0, pgid.as_raw());
    }
    if let Some(fd) = stdout_fd {
        libc::dup2(fd, libc::STDOUT_FILENO);
    }
    for &fd in inherited_fds {
        if fd > libc::STDERR_FILENO {
            libc::close(fd);
        }
    }

    write_all(libc::STDOUT_FILENO, &output.stdout);
    write_all(libc::STDERR_FILENO, &output.stderr);
    libc::_exit(output.code)
}

unsafe fn write_all(fd: RawFd, mut buf: &[u8]) {
    while !buf.is_empty() {
        let written = libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len());
        if written < 0 {
            if Errno::last() == Errno::EINTR {
                continue;
            }
            return;
        }
        buf = &buf[written as usize..];
    }
}

/// Launches every stage of `pipeline` and returns without waiting.
///
/// Stages run concurrently, connected by pipes. Commands that only affect the
/// shell (`cd`, `export`, `kill`) get no process; they run here after every
/// other stage has started, and their status is recorded in place.
///
/// On resource exhaustion the pipeline is abandoned: no new stages start and
/// the error is carried in `ProcessGroup::aborted` next to the stages that
/// did start, so the caller can still wait for them or track them as a job.
pub fn spawn_processes(
    pipeline: &[Stage],
    jobs: &JobTable,
    job_control: bool,
) -> Result<ProcessGroup> {
    validate_pipeline(pipeline)?;

    let background = is_background(pipeline);
    let mut pipes = PipePool::new(pipeline)?;
    let mut launcher = Launcher {
        background,
        reset_signals: job_control,
        pgid: None,
    };
    let mut processes = Vec::with_capacity(pipeline.len());
    let mut redirect_failed = vec![false; pipeline.len()];

    for (index, stage) in pipeline.iter().enumerate() {
        let text = stage.to_string();
        let (stdin, stdout) = match open_streams(stage, index, &mut pipes) {
            Ok(streams) => streams,
            Err(e) => {
                eprintln!("quash: {}", e);
                redirect_failed[index] = true;
                let status = ExitStatus::from_status(e.exit_code());
                processes.push(Process::new_finished(text, status));
                continue;
            }
        };

        let dispatch = builtins::dispatch(&stage.command, ExecutionContext::ChildProcess, jobs);
        let launched = match dispatch {
            Dispatch::Exec(argv) => launcher.spawn_external(&argv, stdin, stdout),
            Dispatch::Builtin(output) => launcher.fork_builtin(output, stdin, stdout, &pipes),
            Dispatch::Ran(status) => Ok(Launch::Finished(status)),
            Dispatch::Skipped => Ok(Launch::Finished(ExitStatus::from_success())),
        };

        match launched {
            Ok(Launch::Started(pid)) => processes.push(Process::new_launched(text, pid)),
            Ok(Launch::Finished(status)) => processes.push(Process::new_finished(text, status)),
            Err(e) => {
                error!("aborting pipeline at stage {}: {}", index, e);
                return Ok(abandon_pipeline(e, pipes, &launcher, processes));
            }
        }
    }

    // the parent's copies of the pipe ends must close so readers see EOF
    drop(pipes);

    for (index, stage) in pipeline.iter().enumerate() {
        if redirect_failed[index] {
            continue;
        }
        let dispatch = builtins::dispatch(&stage.command, ExecutionContext::ShellProcess, jobs);
        if let Dispatch::Ran(status) = dispatch {
            processes[index].set_status_code(status);
        }
    }

    Ok(ProcessGroup {
        id: launcher.pgid,
        processes,
        foreground: !background,
        aborted: None,
    })
}

/// Stops a pipeline part way through launching. Closing the pool lets the
/// started stages see end of input, so they can still be reaped; shell-only
/// stages are not run.
fn abandon_pipeline(
    error: Error,
    pipes: PipePool,
    launcher: &Launcher,
    processes: Vec<Process>,
) -> ProcessGroup {
    drop(pipes);
    ProcessGroup {
        id: launcher.pgid,
        processes,
        foreground: !launcher.background,
        aborted: Some(error),
    }
}
