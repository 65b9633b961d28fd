use crate::span::Span;
use std::fmt;
use thiserror::Error;

/// Closed taxonomy of diagnostic kinds. Each phase reports only its own
/// rows of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // Parser
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("missing token")]
    MissingToken,
    #[error("invalid return type")]
    InvalidReturnType,
    // Semantic
    #[error("undefined variable")]
    UndefinedVariable,
    #[error("redefined variable")]
    RedefinedVariable,
    #[error("undefined function")]
    UndefinedFunction,
    #[error("redefined function")]
    RedefinedFunction,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("argument count mismatch")]
    ArgCountMismatch,
    #[error("invalid return value")]
    InvalidReturnValue,
    #[error("missing return")]
    MissingReturn,
    #[error("return value in void function")]
    ReturnValueInVoid,
    #[error("break outside loop")]
    BreakOutsideLoop,
    #[error("continue outside loop")]
    ContinueOutsideLoop,
    #[error("division by zero")]
    DivisionByZero,
    // IR / backend
    #[error("internal invariant violation")]
    InternalInvariant,
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn new_with_span(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        CompileError {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::new(ErrorKind::InternalInvariant, message)
    }

    /// Render against the source, with the offending line and a caret
    /// under the span. Positions are 1-based.
    pub fn display(&self, src: &str) -> String {
        let mut result = format!("error[{}]: {}", self.kind, self.message);
        if let Some(span) = self.span {
            let (line_num, col_num, line) = locate(src, span.start);
            result.push_str(&format!("\n --> at line {}, column {}", line_num, col_num));
            result.push_str("\n   |\n");
            result.push_str(&format!("{:>2} | {}\n", line_num, line));
            let remaining = line.len() + 1 - (col_num - 1).min(line.len());
            let width = (span.end - span.start).clamp(1, remaining);
            result.push_str(&format!(
                "   | {}{}",
                " ".repeat(col_num - 1),
                "^".repeat(width)
            ));
        }
        result
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// 1-based (line, column) and the line's text for a byte offset.
pub fn locate(src: &str, offset: usize) -> (usize, usize, &str) {
    let mut line_start = 0;
    let mut line_num = 1;
    for (i, c) in src.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line_start = i + 1;
            line_num += 1;
        }
    }
    let line_end = src[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(src.len());
    let line = &src[line_start..line_end];
    let col_num = offset - line_start + 1;
    (line_num, col_num, line)
}

/// Non-fatal note with an optional position. Warnings never affect the
/// exit code and may be suppressed wholesale.
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub span: Option<Span>,
}

/// Per-run accumulator. Phases push as many errors and warnings as they
/// can recover past; the run fails iff any error was recorded.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub errors: Vec<CompileError>,
    pub warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, err: CompileError) {
        self.errors.push(err);
    }

    pub fn warning(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.warnings.push(Warning {
            message: message.into(),
            span,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn render(&self, src: &str, suppress_warnings: bool) -> String {
        let mut out = String::new();
        if !suppress_warnings {
            for w in &self.warnings {
                out.push_str("warning: ");
                out.push_str(&w.message);
                if let Some(span) = w.span {
                    let (line, col, _) = locate(src, span.start);
                    out.push_str(&format!(" (line {}, column {})", line, col));
                }
                out.push('\n');
            }
        }
        for e in &self.errors {
            out.push_str(&e.display(src));
            out.push('\n');
        }
        out
    }
}

impl From<CompileError> for Diagnostics {
    fn from(err: CompileError) -> Self {
        Diagnostics {
            errors: vec![err],
            warnings: Vec::new(),
        }
    }
}
