//! Quash builtins
//!
//! This module includes the implementations of the shell builtin commands and
//! the dispatcher that decides which process a command runs in. Some builtins
//! only make sense in the shell's own process (`cd`, `export`, `kill`), the
//! rest run in the disposable child forked for their stage.

use std::io::Write;
use std::process::ExitStatus;

use crate::core::command::Command;
use crate::errors::Result;
use crate::shell::job_control::JobTable;
use crate::util::QuashExitStatusExt;

mod dirs;
mod echo;
mod env;
mod jobs;
mod kill;

/// The process a command is being dispatched in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// The child forked for a pipeline stage.
    ChildProcess,
    /// The shell itself.
    ShellProcess,
}

/// Output of a builtin destined for a child process. It is rendered in the
/// shell before forking so the child only has to write it out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuiltinOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub code: i32,
}

#[derive(Debug, PartialEq)]
pub enum Dispatch {
    /// Replace the child's program image with `argv`.
    Exec(Vec<String>),
    /// The child writes this output and exits.
    Builtin(BuiltinOutput),
    /// The command already ran in the shell process.
    Ran(ExitStatus),
    /// The command does nothing in this context.
    Skipped,
}

/// Resolves `command` to the behavior valid in `context`. Dispatching a
/// command in the wrong context is a no-op.
pub fn dispatch(command: &Command, context: ExecutionContext, jobs: &JobTable) -> Dispatch {
    use self::ExecutionContext::{ChildProcess, ShellProcess};

    match (context, command) {
        (ChildProcess, Command::External { argv }) => Dispatch::Exec(argv.clone()),
        (ChildProcess, Command::Echo { args }) => render(|stdout| echo::run(args, stdout)),
        (ChildProcess, Command::Pwd) => render(dirs::pwd),
        (ChildProcess, Command::Jobs) => render(|stdout| jobs::run(jobs, stdout)),
        (ShellProcess, Command::Export { name, value }) => run_in_shell(env::export(name, value)),
        (ShellProcess, Command::Cd { path }) => {
            run_in_shell(dirs::cd(path.as_ref().map(String::as_str)).map(|_| ()))
        }
        (ShellProcess, Command::Kill { job_id, signal }) => {
            run_in_shell(kill::run(jobs, *job_id, *signal))
        }
        (ChildProcess, Command::Export { .. })
        | (ChildProcess, Command::Cd { .. })
        | (ChildProcess, Command::Kill { .. })
        | (ShellProcess, Command::External { .. })
        | (ShellProcess, Command::Echo { .. })
        | (ShellProcess, Command::Pwd)
        | (ShellProcess, Command::Jobs) => Dispatch::Skipped,
        // handled by the pipeline orchestrator
        (_, Command::Exit) => Dispatch::Skipped,
        (_, Command::EndOfChain) => {
            error!("end-of-chain marker dispatched as a command");
            eprintln!("quash: internal error: end-of-chain marker dispatched as a command");
            Dispatch::Skipped
        }
    }
}

fn render<F>(run: F) -> Dispatch
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let mut output = BuiltinOutput::default();
    if let Err(e) = run(&mut output.stdout) {
        output.code = e.exit_code();
        output.stderr = format!("quash: {}\n", e).into_bytes();
    }
    Dispatch::Builtin(output)
}

fn run_in_shell(result: Result<()>) -> Dispatch {
    let status = match result {
        Ok(()) => ExitStatus::from_success(),
        Err(e) => {
            debug!("builtin failed: {:?}", e);
            eprintln!("quash: {}", e);
            ExitStatus::from_status(e.exit_code())
        }
    };
    Dispatch::Ran(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::env;

    use crate::core::job::JobId;

    macro_rules! generate_unique_env_key {
        () => {
            format!("KEY_LINE{}_COLUMN{}", line!(), column!())
        };
    }

    #[test]
    fn test_child_context_builtins_render_output() {
        let jobs = JobTable::default();
        let echo = Command::Echo {
            args: vec!["hello".into(), "world".into()],
        };
        assert_eq!(
            dispatch(&echo, ExecutionContext::ChildProcess, &jobs),
            Dispatch::Builtin(BuiltinOutput {
                stdout: b"hello world\n".to_vec(),
                stderr: Vec::new(),
                code: 0,
            })
        );
        assert_eq!(
            dispatch(&echo, ExecutionContext::ShellProcess, &jobs),
            Dispatch::Skipped
        );
    }

    #[test]
    fn test_external_commands_exec_in_child_only() {
        let jobs = JobTable::default();
        let command = Command::External {
            argv: vec!["ls".into(), "-l".into()],
        };
        assert_eq!(
            dispatch(&command, ExecutionContext::ChildProcess, &jobs),
            Dispatch::Exec(vec!["ls".into(), "-l".into()])
        );
        assert_eq!(
            dispatch(&command, ExecutionContext::ShellProcess, &jobs),
            Dispatch::Skipped
        );
    }

    #[test]
    fn test_shell_context_builtins_mutate_the_shell() {
        let jobs = JobTable::default();
        let key = generate_unique_env_key!();
        let command = Command::Export {
            name: key.clone(),
            value: "bar".into(),
        };

        assert_eq!(
            dispatch(&command, ExecutionContext::ChildProcess, &jobs),
            Dispatch::Skipped
        );
        assert!(env::var(&key).is_err());

        assert_eq!(
            dispatch(&command, ExecutionContext::ShellProcess, &jobs),
            Dispatch::Ran(ExitStatus::from_success())
        );
        assert_eq!(env::var(&key).unwrap(), "bar");
    }

    #[test]
    fn test_kill_unknown_job_fails_without_panicking() {
        let jobs = JobTable::default();
        let command = Command::Kill {
            job_id: JobId(99),
            signal: 15,
        };
        assert_eq!(
            dispatch(&command, ExecutionContext::ShellProcess, &jobs),
            Dispatch::Ran(ExitStatus::from_failure())
        );
    }

    #[test]
    fn test_orchestrator_commands_are_never_dispatched() {
        let jobs = JobTable::default();
        for context in &[ExecutionContext::ChildProcess, ExecutionContext::ShellProcess] {
            assert_eq!(dispatch(&Command::Exit, *context, &jobs), Dispatch::Skipped);
            assert_eq!(
                dispatch(&Command::EndOfChain, *context, &jobs),
                Dispatch::Skipped
            );
        }
    }
}
