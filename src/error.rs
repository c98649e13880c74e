use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Classification of everything that can go wrong during a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// grammar violation
    Syntax,
    /// redeclaration along the lexical chain
    Semantic,
    /// incompatible data types
    Type,
    /// impossible internal state (scope navigation, missing labels)
    Runtime,
    /// accessing a variable before declaration
    Reference,
    /// unbalanced braces
    Scope,
    /// malformed function header, unsupported function use
    Function,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "Syntax Error"),
            Self::Semantic => write!(f, "Semantic Error"),
            Self::Type => write!(f, "Type Error"),
            Self::Runtime => write!(f, "Runtime Error"),
            Self::Reference => write!(f, "Reference Error"),
            Self::Scope => write!(f, "Scope Error"),
            Self::Function => write!(f, "Function Error"),
        }
    }
}

/// The single error value of the pipeline.
///
/// A `line` of `-1` means the position was not known where the error was
/// raised; [`at_line`](CompileError::at_line) lets the caller stamp it
/// later, and the rendered message drops its line clause.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: i64,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == -1 {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(f, "{} at line {}: {}", self.kind, self.line, self.message)
        }
    }
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, line: i64) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn syntax(message: impl Into<String>, line: i64) -> Self {
        Self::new(ErrorKind::Syntax, message, line)
    }

    pub fn semantic(message: impl Into<String>, line: i64) -> Self {
        Self::new(ErrorKind::Semantic, message, line)
    }

    pub fn type_error(message: impl Into<String>, line: i64) -> Self {
        Self::new(ErrorKind::Type, message, line)
    }

    pub fn runtime(message: impl Into<String>, line: i64) -> Self {
        Self::new(ErrorKind::Runtime, message, line)
    }

    pub fn reference(message: impl Into<String>, line: i64) -> Self {
        Self::new(ErrorKind::Reference, message, line)
    }

    pub fn scope(message: impl Into<String>, line: i64) -> Self {
        Self::new(ErrorKind::Scope, message, line)
    }

    pub fn function(message: impl Into<String>, line: i64) -> Self {
        Self::new(ErrorKind::Function, message, line)
    }

    /// Stamps a line number onto an error raised without one.
    #[must_use]
    pub fn at_line(mut self, line: i64) -> Self {
        if self.line == -1 {
            self.line = line;
        }
        self
    }
}
