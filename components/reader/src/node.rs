//! The reader's current-node buffer (§3's "Open-element Node, Attribute").
//!
//! A single [`Node`] is reused across every `read()` call: strings and the
//! attribute vector are cleared rather than reallocated, matching the
//! high-water-mark reuse the open-element stack also relies on.

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NodeType {
    Element,
    EndElement,
    Text,
    Whitespace,
    CData,
    Comment,
    ProcessingInstruction,
    DocumentType,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,
    pub value: String,
    /// `'\0'` marks an HTML-style boolean attribute (`<input disabled>`)
    /// whose value defaults to its own name.
    pub quote: char,
    /// Resolved namespace URI for a prefixed attribute name, or `#unknown`/
    /// `#unknownN` if the prefix was never declared. `None` for an
    /// unprefixed attribute (`xmlns`/`xmlns:*` declarations are never
    /// resolved against themselves).
    pub namespace_uri: Option<String>,
    /// `true` when this attribute was not present in the source markup
    /// and was synthesized from the matching `<!ATTLIST …>`'s `#FIXED` or
    /// default literal.
    pub is_default: bool,
}

impl Attr {
    pub fn new(name: String, value: String, quote: char) -> Self {
        Self {
            name,
            value,
            quote,
            namespace_uri: None,
            is_default: false,
        }
    }

    /// An attribute synthesized from a DTD `<!ATTLIST …>` default or
    /// `#FIXED` literal, absent from the source markup.
    pub fn defaulted(name: String, value: String) -> Self {
        Self {
            name,
            value,
            quote: '"',
            namespace_uri: None,
            is_default: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub node_type: NodeType,
    pub name: String,
    pub value: String,
    pub attrs: Vec<Attr>,
    pub depth: usize,
    pub empty: bool,
    pub simulated: bool,
    pub namespace_uri: Option<String>,
}

impl Node {
    pub fn new() -> Self {
        Self {
            node_type: NodeType::Eof,
            name: String::new(),
            value: String::new(),
            attrs: Vec::new(),
            depth: 0,
            empty: false,
            simulated: false,
            namespace_uri: None,
        }
    }

    /// Clears every field back to its empty state while keeping the
    /// allocations of `name`, `value` and `attrs` (and each attribute's own
    /// strings) for reuse on the next node.
    pub fn reset(&mut self, node_type: NodeType) {
        self.node_type = node_type;
        self.name.clear();
        self.value.clear();
        self.attrs.clear();
        self.empty = false;
        self.simulated = false;
        self.namespace_uri = None;
    }

    pub fn find_attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Attribute names that fail NMTOKEN validation are dropped by the
    /// caller before this is reached; duplicates are rejected here with a
    /// bool result so the caller can log and drop per §4.4.
    pub fn push_attr(&mut self, attr: Attr) -> bool {
        if self.find_attr(&attr.name).is_some() {
            return false;
        }
        self.attrs.push(attr);
        true
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_attribute_is_rejected() {
        let mut node = Node::new();
        assert!(node.push_attr(Attr::new("id".to_string(), "a".to_string(), '"')));
        assert!(!node.push_attr(Attr::new("ID".to_string(), "b".to_string(), '"')));
        assert_eq!(node.attrs.len(), 1);
    }

    #[test]
    fn reset_clears_but_keeps_capacity() {
        let mut node = Node::new();
        node.push_attr(Attr::new("id".to_string(), "a".to_string(), '"'));
        node.name.push_str("DIV");
        let cap_before = node.attrs.capacity();
        node.reset(NodeType::Element);
        assert!(node.name.is_empty());
        assert!(node.attrs.is_empty());
        assert_eq!(node.attrs.capacity(), cap_before);
    }
}
