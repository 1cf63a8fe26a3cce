//! Line classification and the serial/parallel execution strategies.

use crate::lexer;
use crate::process::{ProcessHandle, ProcessLauncher};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, info};

/// Whether each launched command is waited on immediately or at the end of its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Serial,
    Parallel,
}

impl ExecutionMode {
    /// Mode named by a sub-run keyword (`SERIAL` or `PARALLEL`).
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "SERIAL" => Some(ExecutionMode::Serial),
            "PARALLEL" => Some(ExecutionMode::Parallel),
            _ => None,
        }
    }
}

/// What a single input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Blank line or a comment (`#` as the first token).
    Ignore,
    /// `exit`: stop reading the current stream.
    Exit,
    /// `SERIAL <file>` or `PARALLEL <file>`. The file may be missing.
    SubRun {
        mode: ExecutionMode,
        path: Option<String>,
    },
    /// Anything else: program name followed by its arguments.
    Command(Vec<String>),
}

impl Line {
    /// Classify a token list. The first matching rule wins.
    pub fn classify(mut tokens: Vec<String>) -> Self {
        let Some(first) = tokens.first() else {
            return Line::Ignore;
        };
        if first == "#" {
            return Line::Ignore;
        }
        if first == "exit" {
            return Line::Exit;
        }
        if let Some(mode) = ExecutionMode::from_keyword(first) {
            let path = if tokens.len() > 1 {
                Some(tokens.swap_remove(1))
            } else {
                None
            };
            return Line::SubRun { mode, path };
        }
        Line::Command(tokens)
    }

    pub fn parse(line: &str) -> Self {
        Line::classify(lexer::split(line))
    }
}

/// Read one line as raw bytes and decode it, replacing invalid UTF-8.
///
/// The trailing `\n` or `\r\n` is removed. Returns `None` at end of input.
pub(crate) fn read_lossy_line<R: BufRead>(
    input: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    buf.clear();
    if input.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Whether the current stream should keep being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Reads lines, classifies them and drives the [`ProcessLauncher`].
///
/// Every launched command is announced on `out` as `Running: <tokens>` and
/// every reaped one as `Exit code: <code>`. Children themselves write to the
/// interpreter's inherited standard streams.
///
/// Example
/// ```
/// use batch_shell::{ExecutionEngine, ExecutionMode};
/// let mut out = Vec::new();
/// let script = "# nothing runs\n\nexit\ntrue\n";
/// ExecutionEngine::new(&mut out)
///     .run_stream(script.as_bytes(), ExecutionMode::Serial)
///     .unwrap();
/// assert!(out.is_empty());
/// ```
pub struct ExecutionEngine<W: Write> {
    launcher: ProcessLauncher,
    out: W,
}

impl<W: Write> ExecutionEngine<W> {
    pub fn new(out: W) -> Self {
        Self {
            launcher: ProcessLauncher::new(),
            out,
        }
    }

    /// Give back the output sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Execute one line typed at the top level.
    ///
    /// Top-level commands are always serial: a command is reaped before this
    /// returns. Returns [`Flow::Exit`] when the line is `exit`.
    pub fn execute_line(&mut self, line: &str) -> Result<Flow> {
        let mut in_flight = Vec::new();
        let flow = self.step(line, ExecutionMode::Serial, &mut in_flight);
        debug_assert!(in_flight.is_empty());
        flow
    }

    /// Run every line of `input` in the given mode until end of input or `exit`.
    ///
    /// In parallel mode the launched children are waited on after the stream
    /// ends, in launch order. They are waited on even if reading the stream
    /// failed part way, and the first error is returned afterwards.
    pub fn run_stream<R: BufRead>(&mut self, input: R, mode: ExecutionMode) -> Result<()> {
        let mut in_flight = Vec::new();
        let fan_out = self.read_loop(input, mode, &mut in_flight);
        let fan_in = self.drain(in_flight);
        fan_out.and(fan_in)
    }

    /// Run the script at `path`. A file that cannot be opened runs nothing.
    pub fn run_file(&mut self, path: &Path, mode: ExecutionMode) -> Result<()> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "script not readable, treating as empty");
                return Ok(());
            }
        };
        info!(path = %path.display(), ?mode, "entering sub-run");
        let result = self.run_stream(BufReader::new(file), mode);
        info!(path = %path.display(), "leaving sub-run");
        result
    }

    fn read_loop<R: BufRead>(
        &mut self,
        mut input: R,
        mode: ExecutionMode,
        in_flight: &mut Vec<ProcessHandle>,
    ) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            let line = match read_lossy_line(&mut input, &mut buf) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "read failed, ending stream");
                    break;
                }
            };
            if self.step(&line, mode, in_flight)? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Classify and dispatch a single line. Parallel launches go to `in_flight`.
    fn step(
        &mut self,
        line: &str,
        mode: ExecutionMode,
        in_flight: &mut Vec<ProcessHandle>,
    ) -> Result<Flow> {
        match Line::parse(line) {
            Line::Ignore => {
                debug!(line, "skipping line");
                Ok(Flow::Continue)
            }
            Line::Exit => Ok(Flow::Exit),
            Line::SubRun {
                mode: sub_mode,
                path,
            } => {
                if let Some(path) = path {
                    self.run_file(Path::new(&path), sub_mode)?;
                }
                Ok(Flow::Continue)
            }
            Line::Command(tokens) => {
                self.announce(&tokens)?;
                let handle = self.launcher.launch(&tokens);
                match mode {
                    ExecutionMode::Serial => self.report(handle)?,
                    ExecutionMode::Parallel => in_flight.push(handle),
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn announce(&mut self, tokens: &[String]) -> Result<()> {
        writeln!(self.out, "Running: {}", tokens.join(" ")).context("writing to output")?;
        // Children share the terminal, so the echo has to land before they start writing.
        self.out.flush().context("flushing output")
    }

    fn report(&mut self, handle: ProcessHandle) -> Result<()> {
        let status = self.launcher.wait_one(handle)?;
        writeln!(self.out, "Exit code: {status}").context("writing to output")?;
        self.out.flush().context("flushing output")
    }

    /// Reap every handle in launch order. All handles are waited on even after an error.
    fn drain(&mut self, in_flight: Vec<ProcessHandle>) -> Result<()> {
        let mut result = Ok(());
        for handle in in_flight {
            let reported = self.report(handle);
            if result.is_ok() {
                result = reported;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn lines(out: Vec<u8>) -> Vec<String> {
        String::from_utf8(out)
            .expect("utf8")
            .lines()
            .map(str::to_owned)
            .collect()
    }

    fn run(script: &str, mode: ExecutionMode) -> Vec<String> {
        let mut engine = ExecutionEngine::new(Vec::new());
        engine.run_stream(script.as_bytes(), mode).unwrap();
        lines(engine.into_inner())
    }

    #[test]
    fn classify_blank_and_comment() {
        assert_eq!(Line::parse(""), Line::Ignore);
        assert_eq!(Line::parse("   "), Line::Ignore);
        assert_eq!(Line::parse("# comment"), Line::Ignore);
    }

    #[test]
    fn hash_glued_to_word_is_a_command() {
        assert_eq!(
            Line::parse("#notacomment x"),
            Line::Command(vec!["#notacomment".into(), "x".into()])
        );
    }

    #[test]
    fn classify_exit_and_subruns() {
        assert_eq!(Line::parse("exit now"), Line::Exit);
        assert_eq!(
            Line::parse("SERIAL cmds.txt"),
            Line::SubRun {
                mode: ExecutionMode::Serial,
                path: Some("cmds.txt".into())
            }
        );
        assert_eq!(
            Line::parse("PARALLEL \"my cmds.txt\" ignored"),
            Line::SubRun {
                mode: ExecutionMode::Parallel,
                path: Some("my cmds.txt".into())
            }
        );
        assert_eq!(
            Line::parse("PARALLEL"),
            Line::SubRun {
                mode: ExecutionMode::Parallel,
                path: None
            }
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            Line::parse("serial x"),
            Line::Command(vec!["serial".into(), "x".into()])
        );
    }

    #[test]
    #[cfg(unix)]
    fn serial_waits_before_next_command() {
        let out = run("sh -c \"sleep 0.2; exit 3\"\ntrue\n", ExecutionMode::Serial);
        assert_eq!(
            out,
            vec![
                "Running: sh -c sleep 0.2; exit 3",
                "Exit code: 3",
                "Running: true",
                "Exit code: 0",
            ]
        );
    }

    #[test]
    #[cfg(unix)]
    fn parallel_reports_in_launch_order() {
        let out = run(
            "sh -c \"sleep 0.5; exit 4\"\nsh -c \"exit 5\"\n",
            ExecutionMode::Parallel,
        );
        assert_eq!(
            out,
            vec![
                "Running: sh -c sleep 0.5; exit 4",
                "Running: sh -c exit 5",
                "Exit code: 4",
                "Exit code: 5",
            ]
        );
    }

    #[test]
    #[cfg(unix)]
    fn parallel_runs_children_concurrently() {
        let start = Instant::now();
        let out = run("sleep 1\nsleep 1\nsleep 1\n", ExecutionMode::Parallel);
        assert_eq!(out.len(), 6);
        assert!(start.elapsed() < Duration::from_millis(2500));
    }

    #[test]
    #[cfg(unix)]
    fn exit_stops_the_stream() {
        let out = run("true\ntrue\nexit\nfalse\nfalse\n", ExecutionMode::Serial);
        assert_eq!(
            out,
            vec!["Running: true", "Exit code: 0", "Running: true", "Exit code: 0"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn exit_in_parallel_still_drains() {
        let out = run("false\nexit\ntrue\n", ExecutionMode::Parallel);
        assert_eq!(out, vec!["Running: false", "Exit code: 1"]);
    }

    #[test]
    fn missing_program_reports_nonzero() {
        let out = run("no-such-program-91b3 --flag\n", ExecutionMode::Serial);
        assert_eq!(
            out,
            vec!["Running: no-such-program-91b3 --flag", "Exit code: 127"]
        );
    }

    #[test]
    fn missing_script_runs_nothing() {
        let out = run(
            "SERIAL /nonexistent/dir/script.txt\nPARALLEL\n",
            ExecutionMode::Serial,
        );
        assert!(out.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn nested_script_drains_before_outer_continues() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner.txt");
        let mut f = File::create(&inner).unwrap();
        writeln!(f, "sh -c \"exit 2\"\nsh -c \"exit 3\"").unwrap();

        let script = format!("true\nPARALLEL {}\nfalse\n", inner.display());
        let out = run(&script, ExecutionMode::Serial);
        assert_eq!(
            out,
            vec![
                "Running: true",
                "Exit code: 0",
                "Running: sh -c exit 2",
                "Running: sh -c exit 3",
                "Exit code: 2",
                "Exit code: 3",
                "Running: false",
                "Exit code: 1",
            ]
        );
    }

    #[test]
    #[cfg(unix)]
    fn exit_inside_sub_run_only_ends_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner.txt");
        std::fs::write(&inner, "exit\nfalse\n").unwrap();

        let script = format!("SERIAL {}\ntrue\n", inner.display());
        let out = run(&script, ExecutionMode::Serial);
        assert_eq!(out, vec!["Running: true", "Exit code: 0"]);
    }

    #[test]
    #[cfg(unix)]
    fn execute_line_runs_serially() {
        let mut engine = ExecutionEngine::new(Vec::new());
        assert_eq!(engine.execute_line("sh -c \"exit 9\"").unwrap(), Flow::Continue);
        assert_eq!(engine.execute_line("# skip").unwrap(), Flow::Continue);
        assert_eq!(engine.execute_line("exit").unwrap(), Flow::Exit);
        assert_eq!(
            lines(engine.into_inner()),
            vec!["Running: sh -c exit 9", "Exit code: 9"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn invalid_utf8_line_does_not_end_stream() {
        let mut engine = ExecutionEngine::new(Vec::new());
        let script: &[u8] = b"true\necho caf\xE9\nfalse\r\n";
        engine.run_stream(script, ExecutionMode::Serial).unwrap();
        assert_eq!(
            lines(engine.into_inner()),
            vec![
                "Running: true",
                "Exit code: 0",
                "Running: echo caf\u{FFFD}",
                "Exit code: 0",
                "Running: false",
                "Exit code: 1",
            ]
        );
    }

    #[test]
    fn lossy_lines_strip_endings() {
        let mut input: &[u8] = b"a\r\nb\xFF\nlast";
        let mut buf = Vec::new();
        let mut read = || read_lossy_line(&mut input, &mut buf).unwrap();
        assert_eq!(read().as_deref(), Some("a"));
        assert_eq!(read().as_deref(), Some("b\u{FFFD}"));
        assert_eq!(read().as_deref(), Some("last"));
        assert_eq!(read(), None);
    }

    #[test]
    fn directory_as_script_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("SERIAL {}\n", dir.path().display());
        assert!(run(&script, ExecutionMode::Serial).is_empty());
    }
}
