//! The interactive read loop.

use crate::engine::{ExecutionEngine, Flow, read_lossy_line};
use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{BufRead, Write};
use tracing::debug;

/// Something that can show a prompt and hand back one line of input.
pub trait LineSource {
    /// Returns `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Line editor on a terminal, with in-memory history.
pub struct Editor {
    rl: DefaultEditor,
}

impl Editor {
    pub fn new() -> Result<Self> {
        let rl = DefaultEditor::new().context("initialising line editor")?;
        Ok(Self { rl })
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.rl.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.rl.add_history_entry(line.as_str())?;
                }
                Ok(Some(line))
            }
            // Ctrl-C drops the current line; the loop prompts again.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err).context("reading line"),
        }
    }
}

/// Prints the prompt to `out` and reads from any buffered reader.
///
/// Used when standard input is not a terminal.
pub struct PlainReader<R, W> {
    input: R,
    out: W,
    buf: Vec<u8>,
}

impl<R: BufRead, W: Write> PlainReader<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self {
            input,
            out,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead, W: Write> LineSource for PlainReader<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.out, "{prompt}")?;
        self.out.flush()?;
        match read_lossy_line(&mut self.input, &mut self.buf) {
            Ok(line) => Ok(line),
            // A failing input stream ends the session like end of file.
            Err(err) => {
                debug!(error = %err, "reading standard input failed, ending session");
                Ok(None)
            }
        }
    }
}

/// Prompts for lines and runs each one before prompting again.
pub struct Driver {
    prompt: String,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new("> ")
    }
}

impl Driver {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    /// Read and execute lines until `exit` or end of input.
    pub fn run<S, W>(&self, source: &mut S, engine: &mut ExecutionEngine<W>) -> Result<()>
    where
        S: LineSource + ?Sized,
        W: Write,
    {
        while let Some(line) = source.read_line(&self.prompt)? {
            if engine.execute_line(&line)? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }
}
