//! Entity layer (C2/C3): character source with transparent encoding
//! auto-detection, BOM sniffing, in-stream meta-declaration sniffing,
//! nested entity expansion and line/column accounting.

use std::fmt;
use std::io;

mod entity;
mod stack;
mod win1252;

pub use entity::{Entity, LiteralKind, EOF};
pub use stack::EntityStack;

/// External collaborator (§6): given an absolute URI, return its bytes, the
/// resolved URI (which may differ after a redirect) and its content type.
/// The core handles `file:` and opaque "web" schemes identically through
/// this interface — it does not know or care which one it is talking to.
pub trait ByteSource {
    fn fetch(&self, uri: &str) -> io::Result<FetchedBytes>;
}

pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub resolved_uri: String,
    pub content_type: Option<String>,
}

/// External collaborator (§6): a line-oriented error writer for recoverable
/// warnings. Optional — readers run fine with no logger attached.
pub trait Logger {
    fn warn(&self, message: &str);
}

/// A `Logger` that writes nothing; the default when no `-e` target is given.
pub struct NullLogger;

impl Logger for NullLogger {
    fn warn(&self, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityError {
    UnexpectedEof,
    InvalidNameStart(char),
    InvalidNameChar(char),
    InvalidCharacterReference(String),
    UnterminatedConstruct(String),
    Io(String, String),
    Encoding(String),
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::UnexpectedEof => write!(f, "unexpected end of entity"),
            EntityError::InvalidNameStart(c) => {
                write!(f, "'{}' is not a valid name start character", c)
            }
            EntityError::InvalidNameChar(c) => write!(f, "'{}' is not a valid name character", c),
            EntityError::InvalidCharacterReference(digits) => {
                write!(f, "invalid character reference '&#{}'", digits)
            }
            EntityError::UnterminatedConstruct(label) => {
                write!(f, "unterminated {}", label)
            }
            EntityError::Io(uri, message) => write!(f, "error fetching '{}': {}", uri, message),
            EntityError::Encoding(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for EntityError {}
