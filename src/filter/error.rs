use std::fmt;

#[derive(Debug)]
pub enum ParseError {
  UnexpectedToken {
    expected: String,
    found: String,
    line: usize,
    pos: usize,
  },
  UnexpectedEOF,
  UnexpectedEOS,
  InvalidValueType { field: String },
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParseError::UnexpectedToken {
        expected,
        found,
        line,
        pos,
      } => write!(
        f,
        "unexpected token at {line}:{pos}: expected {expected}, found {found}"
      ),
      ParseError::UnexpectedEOF => write!(f, "unexpected end of expression"),
      ParseError::UnexpectedEOS => write!(f, "unterminated string literal"),
      ParseError::InvalidValueType { field } => {
        write!(f, "invalid value type for field {field}")
      }
    }
  }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum CompileError {
  UnknownField(String),
  TypeMismatch { field: String, expected: String },
  InvalidRegex { field: String, pattern: String, source: regex::Error },
  InvalidRulesValue(String),
}

impl fmt::Display for CompileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CompileError::UnknownField(field) => write!(f, "unknown filter field {field}"),
      CompileError::TypeMismatch { field, expected } => {
        write!(f, "field {field} expects a {expected} value")
      }
      CompileError::InvalidRegex {
        field,
        pattern,
        source,
      } => write!(f, "invalid regex for field {field} ({pattern:?}): {source}"),
      CompileError::InvalidRulesValue(v) => {
        write!(f, "rules value must be one of I, V, IFR, VFR (got {v:?})")
      }
    }
  }
}

impl std::error::Error for CompileError {}

/// The single error surface the rest of the crate sees: parse and compile
/// failures both land here so a session handler only needs to handle one
/// filter-related error kind.
#[derive(Debug)]
pub enum FilterCompileError {
  Parse(ParseError),
  Compile(CompileError),
}

impl fmt::Display for FilterCompileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FilterCompileError::Parse(e) => write!(f, "{e}"),
      FilterCompileError::Compile(e) => write!(f, "{e}"),
    }
  }
}

impl std::error::Error for FilterCompileError {}

impl From<ParseError> for FilterCompileError {
  fn from(e: ParseError) -> Self {
    FilterCompileError::Parse(e)
  }
}

impl From<CompileError> for FilterCompileError {
  fn from(e: CompileError) -> Self {
    FilterCompileError::Compile(e)
  }
}
