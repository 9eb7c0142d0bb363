//! Human Operator Interface
//!
//! Everything the dispatcher shows to, or asks of, the person at the terminal
//! goes through [`Operator`].

use std::io::{self, BufRead, Write};

use tracing::{debug, error, info, warn};

use crate::models::error::{AgentError, Result};

/// Kind of status line shown to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Info,
    Success,
    Warning,
    Error,
    Debug,
    /// Something the model is doing
    Ai,
    /// Something sent on the operator's behalf
    User,
    /// Unprefixed text such as a model message body
    Text,
}

impl Notice {
    pub fn prefix(&self) -> &'static str {
        match self {
            Notice::Info => "[INFO] ",
            Notice::Success => "[SUCCESS] ",
            Notice::Warning => "[WARNING] ",
            Notice::Error => "[ERROR] ",
            Notice::Debug => "[DEBUG] ",
            Notice::Ai => "[AI] ",
            Notice::User => "[USER] ",
            Notice::Text => "",
        }
    }
}

/// The person in the loop
pub trait Operator: Send {
    fn show(&mut self, notice: Notice, text: &str);

    /// Block for one line of input, without its line terminator
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Yes only for an explicit "y"
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(is_yes(&self.ask(prompt)?))
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// Terminal operator over any line reader and writer
pub struct ConsoleOperator<R, W> {
    reader: R,
    writer: W,
}

impl ConsoleOperator<io::BufReader<io::Stdin>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| AgentError::Operator(e.to_string()))?;
        if read == 0 {
            return Err(AgentError::Operator("input closed".to_string()));
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Lines up to the first empty one, joined with newlines
    pub fn ask_multiline(&mut self, prompt: &str) -> Result<String> {
        // Write errors on the terminal are not actionable
        let _ = writeln!(self.writer, "{}\n(finish with an empty line)", prompt);
        let _ = self.writer.flush();

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

impl<R: BufRead + Send, W: Write + Send> Operator for ConsoleOperator<R, W> {
    fn show(&mut self, notice: Notice, text: &str) {
        let _ = writeln!(self.writer, "{}{}", notice.prefix(), text);
        let _ = self.writer.flush();

        match notice {
            Notice::Error => error!("{}", text),
            Notice::Warning => warn!("{}", text),
            Notice::Debug => debug!("{}", text),
            Notice::Text => {}
            _ => info!("{}", text),
        }
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        let _ = write!(self.writer, "{}\n> ", prompt);
        let _ = self.writer.flush();
        self.read_line()
    }
}
