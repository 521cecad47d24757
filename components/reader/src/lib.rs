//! Pull-mode SGML/HTML reader (C6/C7): a stateful cursor over an
//! [`sgml_entities::EntityStack`] plus an optional [`sgml_dtd::Dtd`] that
//! emits a well-formed XML event stream from loosely-structured markup.

mod namespace;
mod node;
mod open_stack;
mod reader;
mod resource;
mod state;

pub mod error;

pub use error::{ReaderError, ReaderResult};
pub use namespace::NamespaceStack;
pub use node::{Attr, Node, NodeType};
pub use open_stack::{OpenElement, OpenElementStack};
pub use reader::{ReaderOptions, SgmlReader, WhitespacePolicy};
pub use resource::{DefaultResourceLoader, ResourceLoader, DEFAULT_HTML_DTD};
pub use state::{ReadState, ReaderState};
