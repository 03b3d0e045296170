//! Quash - Quite a Shell
//!
//! The execution core of an interactive command shell: pipelines, redirection,
//! built-in dispatch, and background job tracking.

#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

/// Logs the error of a `Result` that is otherwise ignored.
macro_rules! log_if_err {
    ($result:expr, $fmt:expr) => {{
        if let Err(ref e) = $result {
            error!(concat!($fmt, ": {}"), e);
        }
    }};
    ($result:expr, $fmt:expr, $($arg:tt)*) => {{
        if let Err(ref e) = $result {
            error!(concat!($fmt, ": {}"), $($arg)*, e);
        }
    }};
}

pub mod core;
mod editor;
pub mod errors;
pub mod shell;
mod util;

pub use crate::shell::{Control, Shell, ShellConfig};
pub use crate::util::QuashExitStatusExt;
