use std::fmt;

use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::{DefaultHistory, History},
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::Result;

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> ::std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;
}

impl Highlighter for EditorHelper {}

impl Validator for EditorHelper {}

impl Helper for EditorHelper {}

/// Line reader for interactive sessions with an in-memory command history.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper, DefaultHistory>,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Result<Editor> {
        let config = Config::builder()
            .max_history_size(history_capacity)?
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config)?;
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Ok(Editor {
            internal,
            history_capacity,
        })
    }

    /// Returns `None` at end of input. Ctrl-C abandons the current line.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn add_history_entry(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        log_if_err!(
            self.internal.add_history_entry(line),
            "failed to add '{}' to history",
            line
        );
    }

    pub fn history_len(&self) -> usize {
        self.internal.history().len()
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "history: {}/{}",
            self.history_len(),
            self.history_capacity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_not_remembered() {
        let mut editor = Editor::with_capacity(10).unwrap();
        editor.add_history_entry("");
        editor.add_history_entry("   ");
        assert_eq!(editor.history_len(), 0);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let mut editor = Editor::with_capacity(10).unwrap();
        editor.add_history_entry("ls");
        editor.add_history_entry("ls");
        editor.add_history_entry("pwd");
        assert_eq!(editor.history_len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let mut editor = Editor::with_capacity(2).unwrap();
        for i in 0..5 {
            editor.add_history_entry(&format!("cmd{}", i));
        }
        assert_eq!(editor.history_len(), 2);
    }
}
