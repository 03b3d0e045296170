use std::io::{self, IsTerminal};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
#[cfg(test)]
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Quash utility extensions for `ExitStatus`
pub trait QuashExitStatusExt {
    /// Create an ExitStatus to indicate *successful* program execution.
    fn from_success() -> Self;

    /// Create an ExitStatus to indicate *unsuccessful* program execution.
    fn from_failure() -> Self;

    /// Create an ExitStatus from a status code
    fn from_status(code: i32) -> Self;

    /// Create the status a shell reports for a process terminated by `signal`.
    fn from_signal_number(signal: i32) -> Self;
}

impl QuashExitStatusExt for ExitStatus {
    /// # Examples
    /// ```rust
    /// use quash::QuashExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_success().success());
    /// ```
    fn from_success() -> Self {
        ExitStatus::from_status(0)
    }

    /// # Examples
    /// ```rust
    /// use quash::QuashExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(!ExitStatus::from_failure().success());
    /// ```
    fn from_failure() -> Self {
        ExitStatus::from_status(1)
    }

    /// # Examples
    /// ```rust
    /// use quash::QuashExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_status(0).success());
    /// assert_eq!(ExitStatus::from_status(127).code(), Some(127));
    /// ```
    fn from_status(code: i32) -> Self {
        ExitStatus::from_raw((code & 0xff) << 8)
    }

    fn from_signal_number(signal: i32) -> Self {
        ExitStatus::from_status(128 + signal)
    }
}

/// Describes an I/O error without the trailing `(os error N)`.
pub fn describe_io_error(e: &io::Error) -> String {
    let message = e.to_string();
    match message.find(" (os error") {
        Some(index) => message[..index].to_string(),
        None => message,
    }
}

/// Serializes tests that read or change the process-wide working directory.
#[cfg(test)]
pub fn cwd_lock() -> MutexGuard<'static, ()> {
    lazy_static! {
        static ref CWD_LOCK: Mutex<()> = Mutex::new(());
    }
    CWD_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns `true` if the shell's stdin is attached to a terminal.
pub fn isatty() -> bool {
    io::stdin().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_statuses_are_offset_by_128() {
        assert_eq!(ExitStatus::from_signal_number(9).code(), Some(137));
        assert_eq!(ExitStatus::from_signal_number(15).code(), Some(143));
    }

    #[test]
    fn io_errors_drop_the_errno_suffix() {
        let e = io::Error::from_raw_os_error(2);
        assert_eq!(describe_io_error(&e), "No such file or directory");
    }

    #[test]
    fn status_codes_wrap_like_a_byte() {
        assert_eq!(ExitStatus::from_status(256 + 3).code(), Some(3));
        assert_eq!(ExitStatus::from_status(-1).code(), Some(255));
    }
}
