//! Text-level PDF parsing used by the usage collector
//!
//! Two small parsers live here: the drawing-program (content stream) reader
//! and the CMap reader used for composite-font encodings and ToUnicode maps.
//! Loading the PDF file itself is left to the caller's document model.

pub mod cmap;
pub mod content;

use crate::error::FontError;

pub use self::cmap::{CMap, CMapType, CodeRange};
pub use self::content::{ContentOperation, ContentParser, ContentTokenizer, TextElement};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Content stream and CMap parse errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },
}

impl From<ParseError> for FontError {
    fn from(err: ParseError) -> Self {
        FontError::MalformedFontProgram(err.to_string())
    }
}
