#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use docopt::Docopt;
use nix::unistd::Pid;
use quash::errors::*;
use quash::{Control, QuashExitStatusExt, Shell, ShellConfig};

const COMMAND_HISTORY_CAPACITY: usize = 100;
const LOG_FILE_NAME: &str = ".quash_log";

const USAGE: &str = "
quash.

Usage:
    quash [options]
    quash [options] -c <command>
    quash [options] <file>
    quash (-h | --help)
    quash --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -c              If the -c option is present, then commands are read from the first non-option
                        argument command_string.
    --log=<path>    File to write log to, defaults to ~/.quash_log
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    init_logger(args.flag_log.as_ref().map(PathBuf::from));
    debug!("{:?}", args);

    if args.flag_version {
        println!("quash version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

fn init_logger(path: Option<PathBuf>) {
    let log_path = match path.or_else(default_log_path) {
        Some(log_path) => log_path,
        None => {
            eprintln!("quash: unable to determine home directory, logging disabled");
            return;
        }
    };

    if let Err(e) = install_logger(&log_path) {
        eprintln!(
            "quash: failed to open log file {}: {}",
            log_path.display(),
            e
        );
    }
}

fn install_logger(log_path: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let pid = Pid::this();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Trace)
        .chain(fern::log_file(log_path)?)
        .apply()?;
    Ok(())
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive();
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    let result = if let Some(ref command) = args.arg_command {
        shell.execute_command_string(command)
    } else if let Some(ref file_path) = args.arg_file {
        shell.execute_commands_from_file(Path::new(file_path))
    } else {
        Err(ErrorKind::Msg("no command given".to_string()).into())
    };
    shell.check_jobs();

    exit(result, &mut shell);
}

fn execute_from_stdin() -> ! {
    let shell_config = ShellConfig::interactive(COMMAND_HISTORY_CAPACITY);
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    let control = shell.execute_from_stdin();
    exit(Ok(control), &mut shell);
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to create shell: {}", error);
    eprintln!("quash: {}", error);
    process::exit(ExitStatus::from_failure().code().unwrap_or(1));
}

fn exit(result: Result<Control>, shell: &mut Shell) -> ! {
    match result {
        Ok(Control::Exit) => shell.exit(Some(ExitStatus::from_success())),
        Ok(Control::Continue) => shell.exit(None),
        Err(e) => {
            eprintln!("quash: {}", e);
            shell.exit(Some(ExitStatus::from_status(e.exit_code())))
        }
    }
}
