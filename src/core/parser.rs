//! Quash Parser
//!
//! Splits a command line into pipelines and turns each one into an array of
//! stages closed by an end-of-chain marker.

use std::iter::Peekable;
use std::mem;
use std::path::PathBuf;
use std::str::{Chars, FromStr};
use std::vec;

use nix::sys::signal::Signal;
use regex::Regex;

use crate::core::command::{Command, Stage};
use crate::core::job::JobId;
use crate::core::variable_expansion::{Expander, Segment};
use crate::errors::{self, ErrorKind, Result};

const CD_NAME: &str = "cd";
const ECHO_NAME: &str = "echo";
const EXIT_NAME: &str = "exit";
const EXPORT_NAME: &str = "export";
const JOBS_NAME: &str = "jobs";
const KILL_NAME: &str = "kill";
const PWD_NAME: &str = "pwd";

const DEFAULT_KILL_SIGNAL: Signal = Signal::SIGTERM;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

type Word = Vec<Segment>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Word(Word),
    Pipe,
    RedirectIn,
    RedirectOut,
    RedirectAppend,
    Background,
    Semicolon,
}

/// Words and redirects of one command, kept unexpanded until its pipeline runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SimpleCommand {
    words: Vec<Word>,
    redirect_in: Option<Word>,
    redirect_out: Option<Word>,
    append: bool,
}

impl SimpleCommand {
    fn is_empty(&self) -> bool {
        self.words.is_empty() && self.redirect_in.is_none() && self.redirect_out.is_none()
    }
}

/// One pipeline of a command line. Its words are expanded by `expand`, right
/// before it runs, so pipelines earlier on the same line are visible to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedPipeline {
    commands: Vec<SimpleCommand>,
    background: bool,
}

impl ParsedPipeline {
    /// Builds the stages of this pipeline followed by an end-of-chain stage.
    /// Bad builtin arguments fail here, affecting only this pipeline.
    pub fn expand(&self, expander: &Expander) -> Result<Vec<Stage>> {
        let last_index = self.commands.len().saturating_sub(1);
        let expand_path = |word: &Word| PathBuf::from(expander.expand_word(word));

        let mut stages = Vec::with_capacity(self.commands.len() + 1);
        for (index, simple) in self.commands.iter().enumerate() {
            let words = simple
                .words
                .iter()
                .map(|word| expander.expand_word(word))
                .collect();
            stages.push(Stage {
                command: build_command(words, expander)?,
                pipe_from_prev: index > 0,
                pipe_to_next: index < last_index,
                redirect_in: simple.redirect_in.as_ref().map(expand_path),
                redirect_out: simple.redirect_out.as_ref().map(expand_path),
                append: simple.append,
                background: self.background,
            });
        }
        stages.push(Stage::end_of_chain());
        Ok(stages)
    }
}

/// Splits `input` into pipelines. Empty input yields none.
pub fn parse(input: &str) -> Result<Vec<ParsedPipeline>> {
    let mut pipelines = Vec::new();
    let mut commands = Vec::new();
    let mut current = SimpleCommand::default();

    let mut tokens = tokenize(input)?.into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => current.words.push(word),
            Token::RedirectIn => current.redirect_in = Some(redirect_target(&mut tokens, input)?),
            Token::RedirectOut | Token::RedirectAppend => {
                current.append = token == Token::RedirectAppend;
                current.redirect_out = Some(redirect_target(&mut tokens, input)?);
            }
            Token::Pipe => {
                if current.words.is_empty() {
                    return Err(syntax_error(input));
                }
                commands.push(mem::take(&mut current));
            }
            Token::Semicolon | Token::Background => {
                if current.words.is_empty() {
                    return Err(syntax_error(input));
                }
                commands.push(mem::take(&mut current));
                let background = token == Token::Background;
                pipelines.push(finish_pipeline(mem::take(&mut commands), background, input)?);
            }
        }
    }

    if current.is_empty() {
        // a trailing `|` leaves a pipeline without its last command
        if !commands.is_empty() {
            return Err(syntax_error(input));
        }
    } else {
        if current.words.is_empty() {
            return Err(syntax_error(input));
        }
        commands.push(current);
        pipelines.push(finish_pipeline(commands, false, input)?);
    }

    debug!("parsed {:?} into {} pipelines", input, pipelines.len());
    Ok(pipelines)
}

fn redirect_target(tokens: &mut vec::IntoIter<Token>, input: &str) -> Result<Word> {
    match tokens.next() {
        Some(Token::Word(word)) => Ok(word),
        _ => Err(syntax_error(input)),
    }
}

/// A stage cannot take input from both a pipe and a file, nor send output to both.
fn finish_pipeline(
    commands: Vec<SimpleCommand>,
    background: bool,
    input: &str,
) -> Result<ParsedPipeline> {
    let last_index = commands.len().saturating_sub(1);
    for (index, simple) in commands.iter().enumerate() {
        if (index > 0 && simple.redirect_in.is_some())
            || (index < last_index && simple.redirect_out.is_some())
        {
            return Err(syntax_error(input));
        }
    }

    Ok(ParsedPipeline {
        commands,
        background,
    })
}

/// Maps the words of one command to its `Command` variant.
fn build_command(words: Vec<String>, expander: &Expander) -> Result<Command> {
    let program = match words.first() {
        Some(program) => program.as_str(),
        None => return Err(ErrorKind::InvalidPipeline("empty command".into()).into()),
    };
    let args = &words[1..];

    let command = match program {
        ECHO_NAME => Command::Echo {
            args: args.to_vec(),
        },
        PWD_NAME => Command::Pwd,
        JOBS_NAME => Command::Jobs,
        EXIT_NAME => Command::Exit,
        CD_NAME => match args.len() {
            0 => Command::Cd {
                path: expander.home_dir().map(str::to_string),
            },
            1 => Command::Cd {
                path: Some(args[0].clone()),
            },
            _ => return Err(errors::builtin_command("cd: too many arguments", 1)),
        },
        EXPORT_NAME => parse_export(args)?,
        KILL_NAME => parse_kill(args)?,
        _ => Command::External { argv: words },
    };

    Ok(command)
}

fn parse_export(args: &[String]) -> Result<Command> {
    let assignment = match args {
        [assignment] => assignment,
        _ => return Err(errors::builtin_command("export: usage: export NAME=value", 2)),
    };

    let mut key_value = assignment.splitn(2, '=');
    match (key_value.next(), key_value.next()) {
        (Some(name), Some(value)) if IDENTIFIER.is_match(name) => Ok(Command::Export {
            name: name.to_string(),
            value: value.to_string(),
        }),
        _ => Err(errors::builtin_command(
            format!("export: `{}': not a valid identifier", assignment),
            1,
        )),
    }
}

fn parse_kill(args: &[String]) -> Result<Command> {
    let usage = || errors::builtin_command("kill: usage: kill [-signal] job_id", 2);
    let (signal, job) = match args {
        [job] => (DEFAULT_KILL_SIGNAL as i32, job),
        [signal, job] if signal.starts_with('-') => (parse_signal(&signal[1..])?, job),
        _ => return Err(usage()),
    };

    let job_id = JobId::from_str(job).map_err(|_| {
        errors::builtin_command(format!("kill: {}: arguments must be job IDs", job), 1)
    })?;
    Ok(Command::Kill { job_id, signal })
}

/// Accepts `9`, `KILL` and `SIGKILL`.
fn parse_signal(spec: &str) -> Result<i32> {
    if let Ok(number) = spec.parse::<i32>() {
        return Ok(number);
    }

    let upper = spec.to_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    Signal::from_str(&name)
        .map(|signal| signal as i32)
        .map_err(|_| {
            errors::builtin_command(format!("kill: {}: invalid signal specification", spec), 1)
        })
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '&' => {
                chars.next();
                tokens.push(Token::Background);
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semicolon);
            }
            '<' => {
                chars.next();
                tokens.push(Token::RedirectIn);
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::RedirectAppend);
                } else {
                    tokens.push(Token::RedirectOut);
                }
            }
            _ => tokens.push(Token::Word(read_word(&mut chars, input)?)),
        }
    }

    Ok(tokens)
}

fn is_operator(c: char) -> bool {
    ['|', '&', ';', '<', '>'].contains(&c)
}

/// Reads one word, keeping track of how each part of it was quoted.
fn read_word(chars: &mut Peekable<Chars>, input: &str) -> Result<Word> {
    let mut segments = Vec::new();
    let mut unquoted = String::new();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || is_operator(c) {
            break;
        }
        chars.next();

        match c {
            '\'' | '"' | '\\' if !unquoted.is_empty() => {
                segments.push(Segment::Unquoted(unquoted.split_off(0)));
            }
            _ => {}
        }

        match c {
            '\'' => {
                let text = read_until(chars, '\'', input)?;
                segments.push(Segment::Literal(text));
            }
            '"' => {
                let text = read_until(chars, '"', input)?;
                segments.push(Segment::DoubleQuoted(text));
            }
            '\\' => match chars.next() {
                Some(escaped) => segments.push(Segment::Literal(escaped.to_string())),
                None => return Err(syntax_error(input)),
            },
            c => unquoted.push(c),
        }
    }

    if !unquoted.is_empty() {
        segments.push(Segment::Unquoted(unquoted));
    }
    Ok(segments)
}

fn read_until(chars: &mut Peekable<Chars>, quote: char, input: &str) -> Result<String> {
    let mut text = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => return Ok(text),
            Some(c) => text.push(c),
            None => return Err(syntax_error(input)),
        }
    }
}

fn syntax_error(input: &str) -> errors::Error {
    ErrorKind::Syntax(input.trim().to_string()).into()
}
