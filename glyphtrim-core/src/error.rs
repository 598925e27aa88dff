use thiserror::Error;

/// Failures scoped to a single font program.
///
/// None of these abort a whole document run: the orchestrator records them
/// per digest and leaves the affected font program untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FontError {
    #[error("Unsupported font format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed font program: {0}")]
    MalformedFontProgram(String),

    #[error("Font resource not found: {0}")]
    MissingFontResource(String),

    #[error("Cannot compute font program digest: {0}")]
    DigestComputationFailure(String),
}

impl FontError {
    pub(crate) fn malformed(position: usize, message: impl AsRef<str>) -> Self {
        FontError::MalformedFontProgram(format!("{} at byte {}", message.as_ref(), position))
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FontError::UnsupportedFormat(_) => "UnsupportedFormat",
            FontError::MalformedFontProgram(_) => "MalformedFontProgram",
            FontError::MissingFontResource(_) => "MissingFontResource",
            FontError::DigestComputationFailure(_) => "DigestComputationFailure",
        }
    }
}

pub type Result<T> = std::result::Result<T, FontError>;
