//! Line input for the debugger CLI.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use rustyline::DefaultEditor;

/// Source of command lines for the CLI loop.
///
/// `None` means end of input and quits the debugger.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Interactive input with line editing and in-memory history.
///
/// The editor is created lazily; when no terminal is available the
/// source falls back to plain buffered stdin.
#[derive(Default)]
pub struct ReadlineSource {
    editor: Option<DefaultEditor>,
    editor_failed: bool,
}

impl ReadlineSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineSource for ReadlineSource {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        if self.editor.is_none() && !self.editor_failed {
            match DefaultEditor::new() {
                Ok(editor) => self.editor = Some(editor),
                Err(_) => self.editor_failed = true,
            }
        }
        match &mut self.editor {
            Some(editor) => match editor.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    Some(line)
                }
                Err(_) => None,
            },
            None => {
                print!("{prompt}");
                let _ = io::stdout().flush();
                let mut line = String::new();
                match io::stdin().lock().read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_owned()),
                }
            }
        }
    }
}

/// Pre-scripted input, used by tests to drive the CLI without a
/// terminal.
pub struct ScriptedSource {
    lines: VecDeque<String>,
}

impl ScriptedSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for ScriptedSource {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        self.lines.pop_front()
    }
}
