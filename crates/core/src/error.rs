//! Error types for the vellum PDF engine.

use thiserror::Error;

/// Primary error type for reading and writing PDF documents.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF object not found: {0}")]
    ObjectNotFound(u32),

    #[error("no valid xref table found: {0}")]
    NoValidXRef(String),

    #[error("xref /Prev chain loops back to offset {0}")]
    XRefLoop(usize),

    #[error("trailer has no usable /Root catalog")]
    MissingRoot,

    #[error("page tree cycle through object {0}")]
    PageTreeCycle(u32),

    #[error("page index {0} out of range")]
    PageNotFound(usize),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("incorrect password or no matching recipient")]
    BadPassword,

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("SASLprep: {0}")]
    SaslPrepError(String),

    #[error("unbalanced BT/ET: {0}")]
    UnbalancedText(&'static str),

    #[error("unbalanced save/restore state operators")]
    UnbalancedState,

    #[error("unbalanced marked content operators")]
    UnbalancedMarkedContent,

    #[error("unbalanced layer operators")]
    UnbalancedLayer,

    #[error("content stream left in a dangling state: {0}")]
    DanglingState(String),

    #[error("illegal content operation: {0}")]
    IllegalOperation(String),
}

impl PdfError {
    /// Wrong password or certificate; the caller may re-prompt.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, PdfError::BadPassword)
    }

    /// Well-formed input that uses a feature this crate does not handle.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            PdfError::UnsupportedFilter(_) | PdfError::UnsupportedEncryption(_)
        )
    }

    /// Whether a rebuild-by-scan is worth trying after this error. Only a
    /// wrong password and I/O failures are final.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PdfError::BadPassword | PdfError::Io(_))
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
