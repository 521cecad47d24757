use std::fmt;

use sgml_entities::EntityError;

pub type DtdResult<T> = std::result::Result<T, DtdError>;

#[derive(Debug, Clone, PartialEq)]
pub struct DtdError {
    pub reason: DtdErrorReason,
    pub context: String,
}

impl DtdError {
    pub fn new(reason: DtdErrorReason, context: String) -> Self {
        Self { reason, context }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DtdErrorReason {
    Entity(EntityError),
    UnsupportedMarkedSection(String),
    UnexpectedMarkup(char),
    ExpectedKeyword(&'static str),
    UnknownAttributeType(String),
    MixedConnectors,
    AttlistForUndeclaredElement(String),
    EmptyModelGroup,
    UndeclaredParameterEntity(String),
    ExternalParameterEntity(String),
}

impl fmt::Display for DtdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            DtdErrorReason::Entity(e) => write!(f, "{}", e),
            DtdErrorReason::UnsupportedMarkedSection(kw) => {
                write!(f, "marked section '{}' is not supported", kw)
            }
            DtdErrorReason::UnexpectedMarkup(c) => write!(f, "unexpected '{}' after '<!'", c),
            DtdErrorReason::ExpectedKeyword(kw) => write!(f, "expected keyword '{}'", kw),
            DtdErrorReason::UnknownAttributeType(t) => write!(f, "unknown attribute type '{}'", t),
            DtdErrorReason::MixedConnectors => write!(f, "mixed connectors within one group"),
            DtdErrorReason::AttlistForUndeclaredElement(name) => {
                write!(f, "ATTLIST for undeclared element '{}'", name)
            }
            DtdErrorReason::EmptyModelGroup => write!(f, "empty content model group"),
            DtdErrorReason::UndeclaredParameterEntity(name) => {
                write!(f, "undeclared parameter entity '%{};'", name)
            }
            DtdErrorReason::ExternalParameterEntity(name) => write!(
                f,
                "external parameter entity '%{};' reference is fatal",
                name
            ),
        }
    }
}

impl std::error::Error for DtdError {}

impl From<EntityError> for DtdErrorReason {
    fn from(e: EntityError) -> Self {
        DtdErrorReason::Entity(e)
    }
}
