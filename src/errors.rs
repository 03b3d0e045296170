//! Error module. See the [error-chain](https://crates.io/crates/error-chain) crate for details.

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Nix(::nix::Error);
        Readline(::rustyline::error::ReadlineError);
    }

    errors {
        /// Generic syntax error containing the offending input
        Syntax(line: String) {
            description("syntax error")
            display("syntax error near: {}", line)
        }
        /// A program could not be located on `PATH`
        CommandNotFound(command: String) {
            description("command not found")
            display("{}: command not found", command)
        }
        /// `kill` referred to a job the shell is not tracking
        NoSuchJob(job: String) {
            description("no such job")
            display("{}: no such job", job)
        }
        /// A builtin failed; `code` becomes the stage's exit status
        BuiltinCommand(message: String, code: i32) {
            description("builtin command failed")
            display("{}", message)
        }
        /// Pipe or process creation failed
        ResourceExhausted(operation: String, reason: String) {
            description("resource exhausted")
            display("{}: {}", operation, reason)
        }
        /// A pipeline violated a structural invariant that the parser guarantees
        InvalidPipeline(reason: String) {
            description("invalid pipeline")
            display("internal error: {}", reason)
        }
    }
}

impl Error {
    /// Exit status a stage reports when it fails with this error.
    pub fn exit_code(&self) -> i32 {
        match *self.kind() {
            ErrorKind::Syntax(_) => 2,
            ErrorKind::CommandNotFound(_) => 127,
            ErrorKind::BuiltinCommand(_, code) => code,
            _ => 1,
        }
    }
}

pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
    ErrorKind::BuiltinCommand(message.as_ref().to_string(), code).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_shell_conventions() {
        assert_eq!(Error::from(ErrorKind::Syntax("|".into())).exit_code(), 2);
        assert_eq!(
            Error::from(ErrorKind::CommandNotFound("nope".into())).exit_code(),
            127
        );
        assert_eq!(builtin_command("cd: HOME not set", 1).exit_code(), 1);
        assert_eq!(
            Error::from(ErrorKind::ResourceExhausted(
                "fork".into(),
                "Resource temporarily unavailable".into()
            ))
            .exit_code(),
            1
        );
    }

    #[test]
    fn messages_name_the_failing_operation() {
        let e = Error::from(ErrorKind::NoSuchJob("%7".into()));
        assert_eq!(e.to_string(), "%7: no such job");
        let e = Error::from(ErrorKind::ResourceExhausted(
            "pipe".into(),
            "Too many open files".into(),
        ));
        assert_eq!(e.to_string(), "pipe: Too many open files");
    }
}
