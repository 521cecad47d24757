//! C7's pull-reader states (§4.4).

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReadState {
    Initial,
    Markup,
    EndTag,
    PartialTag,
    PseudoStartTag,
    AutoClose,
    CData,
    Attr,
    AttrValue,
    Text,
    PartialText,
    Eof,
}

/// The reader's coarse-grained public lifecycle (§6's `read_state`) —
/// collapses the fine-grained [`ReadState`] dispatch states above into the
/// handful a caller actually needs to distinguish.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReaderState {
    /// `read()` has never been called.
    Initial,
    /// Positioned on a node; `read()` can be called again.
    Interactive,
    /// `read()` has returned `false`; no more nodes.
    EndOfFile,
    /// `close()` has been called.
    Closed,
}
