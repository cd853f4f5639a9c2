use std::fmt;

use anyhow::anyhow;
use log::{error, warn};

/// A file and line a diagnostic refers to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Position used for entries the compiler creates itself.
    pub fn generated() -> Self {
        Self::new("<generated>", 0)
    }

    /// Logs `msg` as an error at this position and returns it for propagation.
    pub fn error(&self, msg: impl fmt::Display) -> anyhow::Error {
        error!("{self}: error: {msg}");
        anyhow!("{self}: {msg}")
    }

    pub fn warning(&self, msg: impl fmt::Display) {
        warn!("{self}: warning: {msg}");
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Errors gathered by a pass that keeps going after a failure so that every problem gets reported.
#[derive(Debug, Default)]
pub struct ErrorLog {
    errors: Vec<anyhow::Error>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.errors.push(err);
    }

    /// Keeps the value of a successful result, or remembers the error.
    pub fn record<T>(&mut self, result: anyhow::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errors.push(err);
                None
            }
        }
    }

    pub fn append(&mut self, other: ErrorLog) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn messages(&self) -> impl Iterator<Item = String> + '_ {
        self.errors.iter().map(|err| err.to_string())
    }

    /// Fails with every collected message if anything went wrong.
    pub fn finish(self, what: &str) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let mut message = format!("{what} failed with {} error(s)", self.errors.len());
        for err in &self.errors {
            message.push_str("\n  ");
            message.push_str(&err.to_string());
        }
        Err(anyhow!(message))
    }
}
