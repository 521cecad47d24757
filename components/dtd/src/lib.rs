//! DTD layer (C4/C5): content-model tables and the recursive-descent
//! parser that turns SGML DTD text into element, attribute and entity
//! declarations.

mod attdef;
mod dtd;
mod element;
mod error;
mod model;
mod parser;

pub use attdef::{AttDef, AttType, Presence};
pub use dtd::{Dtd, EntityValue};
pub use element::{ElementDecl, TagOmission};
pub use error::{DtdError, DtdErrorReason, DtdResult};
pub use model::{ContentModel, DeclaredContent, Group, GroupType, Member, Occurrence};
pub use parser::DtdParser;
