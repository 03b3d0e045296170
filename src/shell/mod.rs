//! The shell: reads command lines, runs their pipelines in the foreground or
//! as background jobs, and reports background jobs as they complete.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::{self, ExitStatus};

use crate::core::command::{self, Command, Stage};
use crate::core::job::Process;
use crate::core::parser;
use crate::core::variable_expansion::Expander;
use crate::editor::Editor;
use crate::errors::{self, Result};
use crate::util::{self, QuashExitStatusExt};

pub mod builtins;
pub mod execute_command;
pub mod job_control;

use self::job_control::JobTable;

/// Whether the shell should keep reading commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Determines if new command entries will be added to the shell's command history.
    enable_command_history: bool,

    /// Number of entries to store in the shell's command history
    command_history_capacity: usize,

    /// Determines if the shell ignores interactive signals and restores them
    /// in the programs it starts.
    enable_job_control: bool,

    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, job control
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - Job Control is enabled
    /// - Some additional messages are displayed
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_command_history: true,
            command_history_capacity,
            enable_job_control: true,
            display_messages: true,
        }
    }

    /// Creates a noninteractive shell, e.g. no command history, no job control
    pub fn noninteractive() -> Self {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_command_history: false,
            command_history_capacity: 0,
            enable_job_control: false,
            display_messages: false,
        }
    }
}

#[derive(Debug)]
pub struct Shell {
    /// Responsible for readline and history; only present when reading from
    /// a terminal.
    editor: Option<Editor>,
    job_table: JobTable,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    /// Is `false` if stdin is not a terminal or if initializing job control
    /// fails.
    is_interactive: bool,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Result<Self> {
        let mut shell = Self {
            editor: None,
            job_table: JobTable::default(),
            last_exit_status: ExitStatus::from_success(),
            config,
            is_interactive: config.enable_job_control && util::isatty(),
        };

        if shell.is_interactive {
            if let Err(e) = job_control::initialize_job_control() {
                error!("failed to initialize job control despite isatty: {}", e);
                shell.is_interactive = false;
            }
        }

        if config.enable_command_history && util::isatty() {
            shell.editor = Some(Editor::with_capacity(config.command_history_capacity)?);
        }

        info!("quash started up");
        Ok(shell)
    }

    pub fn job_table(&self) -> &JobTable {
        &self.job_table
    }

    pub fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    /// Parses and runs one command line. Syntax errors are returned without
    /// running anything; failures of individual pipelines are reported and
    /// the remaining pipelines still run.
    ///
    /// Each pipeline is expanded right before it runs, so `$?` and variables
    /// exported earlier on the same line see their current values.
    pub fn execute_command_string(&mut self, input: &str) -> Result<Control> {
        let pipelines = match parser::parse(input) {
            Ok(pipelines) => pipelines,
            Err(e) => {
                self.last_exit_status = ExitStatus::from_status(e.exit_code());
                return Err(e);
            }
        };

        for pipeline in &pipelines {
            let expander = Expander::from_env(self.last_exit_status.code().unwrap_or(1));
            match pipeline.expand(&expander) {
                Ok(stages) => {
                    if self.run_stages(&stages) == Control::Exit {
                        return Ok(Control::Exit);
                    }
                }
                Err(e) => self.report_failure(input, &e),
            }
        }

        Ok(Control::Continue)
    }

    /// Runs every pipeline of an end-of-chain terminated stage array in order.
    pub fn run_stages(&mut self, stages: &[Stage]) -> Control {
        for pipeline in command::pipelines(stages) {
            match self.run_pipeline(pipeline) {
                Ok(Control::Exit) => return Control::Exit,
                Ok(Control::Continue) => (),
                Err(e) => self.report_failure(&command::command_text(pipeline), &e),
            }
        }

        Control::Continue
    }

    fn report_failure(&mut self, text: &str, e: &errors::Error) {
        error!("pipeline '{}' failed: {}", text, e);
        eprintln!("quash: {}", e);
        self.last_exit_status = ExitStatus::from_status(e.exit_code());
    }

    fn run_pipeline(&mut self, pipeline: &[Stage]) -> Result<Control> {
        if let [stage] = pipeline {
            if stage.command == Command::Exit {
                return Ok(Control::Exit);
            }
        }

        let mut process_group =
            execute_command::spawn_processes(pipeline, &self.job_table, self.is_interactive)?;
        let aborted = process_group.aborted.take();

        if process_group.foreground {
            self.last_exit_status = job_control::wait_for_processes(&mut process_group.processes);
            debug!("foreground pipeline exited with {}", self.last_exit_status);
        } else if aborted.is_none() || process_group.processes.iter().any(Process::is_running) {
            let text = command::command_text(pipeline);
            let job_id = self.job_table.create_job(&text, process_group);
            if let Some(job) = self.job_table.get_job(job_id) {
                println!("Background job started: {}", job);
            }
            self.last_exit_status = ExitStatus::from_success();
        }

        match aborted {
            Some(e) => Err(e),
            None => Ok(Control::Continue),
        }
    }

    /// Reports and forgets background jobs that have finished.
    pub fn check_jobs(&mut self) {
        for job in self.job_table.poll_jobs() {
            info!("job [{}] completed with {:?}", job.id(), job.last_status_code());
            println!("Completed: \t{}", job);
        }
    }

    pub fn execute_commands_from_file(&mut self, path: &Path) -> Result<Control> {
        let contents = fs::read_to_string(path).map_err(|e| {
            errors::builtin_command(
                format!("{}: {}", path.display(), util::describe_io_error(&e)),
                1,
            )
        })?;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let control = self.execute_line(line);
            self.check_jobs();
            if control == Control::Exit {
                return Ok(Control::Exit);
            }
        }

        Ok(Control::Continue)
    }

    /// Reads and runs lines until end of input or `exit`.
    pub fn execute_from_stdin(&mut self) -> Control {
        loop {
            self.check_jobs();

            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("failed to read input: {}", e);
                    eprintln!("quash: {}", e);
                    break;
                }
            };

            if let Some(editor) = self.editor.as_mut() {
                editor.add_history_entry(&line);
            }
            if self.execute_line(&line) == Control::Exit {
                return Control::Exit;
            }
        }

        Control::Continue
    }

    fn execute_line(&mut self, line: &str) -> Control {
        match self.execute_command_string(line) {
            Ok(control) => control,
            Err(e) => {
                eprintln!("quash: {}", e);
                Control::Continue
            }
        }
    }

    /// Returns `None` when end of file is reached.
    fn read_line(&mut self) -> Result<Option<String>> {
        let prompt = self.prompt();
        if let Some(editor) = self.editor.as_mut() {
            return editor.readline(&prompt);
        }

        if self.is_interactive {
            print!("{}", prompt);
            io::stdout().flush()?;
        }
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\n', '\r'][..]).to_string()))
    }

    fn prompt(&self) -> String {
        let cwd = env::current_dir()
            .map(|cwd| cwd.display().to_string())
            .unwrap_or_else(|_| "?".to_string());
        format!("[QUASH {}]$ ", cwd)
    }

    /// Terminates the shell with `status`, or with the last pipeline's status.
    pub fn exit(&mut self, status: Option<ExitStatus>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }
        if self.job_table.has_jobs() {
            warn!("exiting with unfinished background jobs: {:?}", self.job_table);
        }

        let code = status
            .unwrap_or(self.last_exit_status)
            .code()
            .unwrap_or(1);
        info!("quash has shut down");
        process::exit(code & 0xff);
    }
}
