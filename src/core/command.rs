use std::fmt;
use std::path::PathBuf;

use crate::core::job::JobId;
use crate::errors::{ErrorKind, Result};

/// A single shell command. Built-ins get their own variant so every dispatch
/// site has to account for each of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Program looked up on `PATH`; `argv[0]` is the program name.
    External { argv: Vec<String> },
    Echo { args: Vec<String> },
    Pwd,
    Jobs,
    Export { name: String, value: String },
    /// `path` is `None` when no target directory could be determined.
    Cd { path: Option<String> },
    Kill { job_id: JobId, signal: i32 },
    Exit,
    /// Closes a pipeline inside a stage array.
    EndOfChain,
}

/// One element of a pipeline: a command plus how its standard streams are wired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub command: Command,
    pub pipe_from_prev: bool,
    pub pipe_to_next: bool,
    pub redirect_in: Option<PathBuf>,
    pub redirect_out: Option<PathBuf>,
    /// Only meaningful together with `redirect_out`.
    pub append: bool,
    pub background: bool,
}

impl Stage {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            pipe_from_prev: false,
            pipe_to_next: false,
            redirect_in: None,
            redirect_out: None,
            append: false,
            background: false,
        }
    }

    pub fn end_of_chain() -> Self {
        Self::new(Command::EndOfChain)
    }

    pub fn is_end_of_chain(&self) -> bool {
        self.command == Command::EndOfChain
    }

    pub fn piped_from_prev(self) -> Self {
        Self {
            pipe_from_prev: true,
            ..self
        }
    }

    pub fn piped_to_next(self) -> Self {
        Self {
            pipe_to_next: true,
            ..self
        }
    }

    pub fn with_redirect_in<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            redirect_in: Some(path.into()),
            ..self
        }
    }

    pub fn with_redirect_out<P: Into<PathBuf>>(self, path: P, append: bool) -> Self {
        Self {
            redirect_out: Some(path.into()),
            append,
            ..self
        }
    }

    pub fn in_background(self, background: bool) -> Self {
        Self { background, ..self }
    }
}

/// Splits a stage array into its pipelines at each end-of-chain marker.
pub fn pipelines(stages: &[Stage]) -> impl Iterator<Item = &[Stage]> {
    stages
        .split(Stage::is_end_of_chain)
        .filter(|pipeline| !pipeline.is_empty())
}

/// A pipeline runs in the background when its first stage says so.
pub fn is_background(pipeline: &[Stage]) -> bool {
    pipeline.first().map_or(false, |stage| stage.background)
}

/// Checks the wiring invariants of one pipeline.
pub fn validate_pipeline(pipeline: &[Stage]) -> Result<()> {
    let (first, last) = match (pipeline.first(), pipeline.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(invalid("empty pipeline")),
    };

    if pipeline.iter().any(Stage::is_end_of_chain) {
        return Err(invalid("end-of-chain marker inside a pipeline"));
    }
    if first.pipe_from_prev {
        return Err(invalid("first stage reads from a pipe"));
    }
    if last.pipe_to_next {
        return Err(invalid("last stage writes to a pipe"));
    }
    for pair in pipeline.windows(2) {
        if pair[0].pipe_to_next != pair[1].pipe_from_prev {
            return Err(invalid(format!(
                "unmatched pipe between '{}' and '{}'",
                pair[0], pair[1]
            )));
        }
    }
    for stage in pipeline {
        if stage.pipe_from_prev && stage.redirect_in.is_some() {
            return Err(invalid(format!("'{}' has two input sources", stage)));
        }
        if stage.pipe_to_next && stage.redirect_out.is_some() {
            return Err(invalid(format!("'{}' has two output targets", stage)));
        }
    }

    Ok(())
}

/// Renders a pipeline the way the user would have typed it.
pub fn command_text(pipeline: &[Stage]) -> String {
    let mut text = pipeline
        .iter()
        .map(Stage::to_string)
        .collect::<Vec<_>>()
        .join(" | ");
    if is_background(pipeline) {
        text.push_str(" &");
    }
    text
}

fn invalid<T: Into<String>>(reason: T) -> crate::errors::Error {
    ErrorKind::InvalidPipeline(reason.into()).into()
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Command::External { ref argv } => write!(f, "{}", argv.join(" ")),
            Command::Echo { ref args } if args.is_empty() => write!(f, "echo"),
            Command::Echo { ref args } => write!(f, "echo {}", args.join(" ")),
            Command::Pwd => write!(f, "pwd"),
            Command::Jobs => write!(f, "jobs"),
            Command::Export {
                ref name,
                ref value,
            } => write!(f, "export {}={}", name, value),
            Command::Cd { path: Some(ref path) } => write!(f, "cd {}", path),
            Command::Cd { path: None } => write!(f, "cd"),
            Command::Kill { job_id, signal } => write!(f, "kill -{} {}", signal, job_id),
            Command::Exit => write!(f, "exit"),
            Command::EndOfChain => Ok(()),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(ref path) = self.redirect_in {
            write!(f, " < {}", path.display())?;
        }
        if let Some(ref path) = self.redirect_out {
            let op = if self.append { ">>" } else { ">" };
            write!(f, " {} {}", op, path.display())?;
        }
        Ok(())
    }
}
