//! Splitting a command line into whitespace-delimited tokens.
//!
//! A token that starts with a double quote runs until the matching quote.
//! Whitespace inside it is kept and the quotes are dropped, and a backslash
//! escapes the next character. Single quotes are ordinary characters, and so
//! is a double quote that appears in the middle of a bare word.
//!
//! There are no lexing errors: an unterminated quote is taken literally and
//! the rest of the line is split on whitespace as if it had no quoting.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingQuoted,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    /// Position of the opening quote of the token being read, if any.
    quote_start: usize,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            quote_start: 0,
        }
    }

    /// Runs the state machine over the whole line.
    fn make_tokens(&mut self) -> Vec<String> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingQuoted => self.handle_quoted(ch, &mut out),
            }
        }

        match self.state {
            LexingState::ReadingWord => out.push(std::mem::take(&mut self.buffer)),
            LexingState::ReadingQuoted => {
                let rest: String = self.input[self.quote_start..].iter().collect();
                out.extend(rest.split_whitespace().map(str::to_owned));
            }
            LexingState::Start => {}
        }

        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn handle_start(&mut self, ch: char) {
        match ch {
            c if c.is_whitespace() => {}
            '"' => {
                self.quote_start = self.pos - 1;
                self.state = LexingState::ReadingQuoted;
            }
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<String>) {
        if ch.is_whitespace() {
            out.push(std::mem::take(&mut self.buffer));
            self.state = LexingState::Start;
        } else {
            self.buffer.push(ch);
        }
    }

    fn handle_quoted(&mut self, ch: char, out: &mut Vec<String>) {
        match ch {
            '"' => {
                out.push(std::mem::take(&mut self.buffer));
                self.state = LexingState::Start;
            }
            '\\' => {
                // A trailing backslash leaves the quote open, which falls back to literal text.
                if let Some(escaped) = self.read_char() {
                    self.buffer.push(escaped);
                }
            }
            c => self.buffer.push(c),
        }
    }
}

/// Split a line into tokens.
///
/// Returns an empty vector for a blank line.
///
/// ```
/// use batch_shell::lexer::split;
/// assert_eq!(split(r#"ls -l "my file.txt""#), vec!["ls", "-l", "my file.txt"]);
/// ```
pub fn split(line: &str) -> Vec<String> {
    LexingFSM::new(line).make_tokens()
}
