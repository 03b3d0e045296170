use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// A piece of a shell word, as written by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Single-quoted or backslash-escaped text, never expanded.
    Literal(String),
    /// Unquoted text; subject to variable and tilde expansion.
    Unquoted(String),
    /// Double-quoted text; subject to variable expansion only.
    DoubleQuoted(String),
}

/// Expands shell and environment variables in words.
#[derive(Debug, Default)]
pub struct Expander {
    home_dir: Option<String>,
    variables: HashMap<String, String>,
    last_exit_status: i32,
}

impl Expander {
    pub fn new<I>(home_dir: Option<PathBuf>, variables: I, last_exit_status: i32) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            home_dir: home_dir.map(|p| p.to_string_lossy().into_owned()),
            variables: variables.into_iter().collect(),
            last_exit_status,
        }
    }

    /// Snapshot of the shell's current environment.
    pub fn from_env(last_exit_status: i32) -> Self {
        let variables = env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        });
        Self::new(dirs::home_dir(), variables, last_exit_status)
    }

    pub fn home_dir(&self) -> Option<&str> {
        self.home_dir.as_ref().map(String::as_str)
    }

    /// Joins the segments of one word, expanding those that allow it.
    pub fn expand_word(&self, segments: &[Segment]) -> String {
        let mut word = String::new();
        for (index, segment) in segments.iter().enumerate() {
            match *segment {
                Segment::Literal(ref text) => word.push_str(text),
                Segment::Unquoted(ref text) if index == 0 => {
                    let text = self.expand_tilde(text);
                    word.push_str(&self.expand_variables(&text));
                }
                Segment::Unquoted(ref text) | Segment::DoubleQuoted(ref text) => {
                    word.push_str(&self.expand_variables(text))
                }
            }
        }
        word
    }

    /// Replaces a leading `~` (alone or followed by `/`) with the home directory.
    fn expand_tilde(&self, text: &str) -> String {
        match self.home_dir {
            Some(ref home) if text == "~" || text.starts_with("~/") => {
                format!("{}{}", home, &text[1..])
            }
            _ => text.to_string(),
        }
    }

    /// Expands `$NAME`, `${NAME}` and `$?`. Unset variables expand to nothing.
    fn expand_variables(&self, text: &str) -> String {
        let mut expanded = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                expanded.push(c);
                continue;
            }

            match chars.peek() {
                Some('?') => {
                    chars.next();
                    expanded.push_str(&self.last_exit_status.to_string());
                }
                Some('{') => {
                    chars.next();
                    let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                    expanded.push_str(self.variable(&name));
                }
                Some(&c) if is_name_start(c) => {
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if !is_name_char(c) {
                            break;
                        }
                        name.push(c);
                        chars.next();
                    }
                    expanded.push_str(self.variable(&name));
                }
                _ => expanded.push('$'),
            }
        }
        expanded
    }

    fn variable(&self, name: &str) -> &str {
        self.variables.get(name).map(String::as_str).unwrap_or("")
    }
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}
