use std::fmt;

use sgml_dtd::DtdError;
use sgml_entities::EntityError;

pub type ReaderResult<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderError {
    Entity(EntityError),
    Dtd(DtdError),
    UnexpectedEof,
    InvalidNameStart(char),
    UnknownEntity(String),
    SecondRootElement,
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::Entity(e) => write!(f, "{}", e),
            ReaderError::Dtd(e) => write!(f, "{}", e),
            ReaderError::UnexpectedEof => write!(f, "unexpected end of input"),
            ReaderError::InvalidNameStart(c) => {
                write!(f, "'{}' cannot start a name", c)
            }
            ReaderError::UnknownEntity(name) => write!(f, "unknown entity '&{};'", name),
            ReaderError::SecondRootElement => {
                write!(f, "a second root-level element was found; document must be single-rooted")
            }
        }
    }
}

impl std::error::Error for ReaderError {}

impl From<EntityError> for ReaderError {
    fn from(e: EntityError) -> Self {
        ReaderError::Entity(e)
    }
}

impl From<DtdError> for ReaderError {
    fn from(e: DtdError) -> Self {
        ReaderError::Dtd(e)
    }
}
