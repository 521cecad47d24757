//! Namespace prefix resolution (§4.4's "Namespace surface"). SGML itself
//! has no namespaces; the reader passes `xmlns`/`xmlns:*` attributes
//! through verbatim and, for prefixed element/attribute names, walks
//! ancestor scopes the same way the teacher's `NamespaceStack` tracks
//! scope boundaries by length rather than by popping one declaration at a
//! time.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct NamespaceStack {
    /// `(depth, prefix, uri)`, pushed in non-decreasing depth order so a
    /// scope exit can drop a suffix with `retain` instead of per-entry pops.
    decls: Vec<(usize, String, String)>,
    /// Stable placeholder assigned to each distinct unresolved prefix.
    unknown: HashMap<String, String>,
}

impl NamespaceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, depth: usize, prefix: String, uri: String) {
        self.decls.push((depth, prefix, uri));
    }

    /// Drops every declaration made at `depth` or deeper, called when the
    /// open-element stack truncates back to `depth`.
    pub fn close_to(&mut self, depth: usize) {
        self.decls.retain(|(d, _, _)| *d < depth);
    }

    /// Resolves `prefix` against the innermost matching declaration; an
    /// unresolved prefix gets `#unknown` the first time it is seen and
    /// `#unknownN` for the Nth distinct unresolved prefix after that,
    /// stable for the rest of the document.
    pub fn resolve(&mut self, prefix: &str) -> String {
        if let Some((_, _, uri)) = self.decls.iter().rev().find(|(_, p, _)| p == prefix) {
            return uri.clone();
        }
        if let Some(placeholder) = self.unknown.get(prefix) {
            return placeholder.clone();
        }
        let placeholder = if self.unknown.is_empty() {
            "#unknown".to_string()
        } else {
            format!("#unknown{}", self.unknown.len() + 1)
        };
        self.unknown.insert(prefix.to_string(), placeholder.clone());
        placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_prefix_resolves_to_its_uri() {
        let mut ns = NamespaceStack::new();
        ns.declare(1, "x".to_string(), "urn:x".to_string());
        assert_eq!(ns.resolve("x"), "urn:x");
    }

    #[test]
    fn unresolved_prefixes_get_stable_numbered_placeholders() {
        let mut ns = NamespaceStack::new();
        assert_eq!(ns.resolve("a"), "#unknown");
        assert_eq!(ns.resolve("b"), "#unknown2");
        assert_eq!(ns.resolve("a"), "#unknown");
    }

    #[test]
    fn close_to_drops_declarations_at_or_above_depth() {
        let mut ns = NamespaceStack::new();
        ns.declare(1, "x".to_string(), "urn:x".to_string());
        ns.declare(2, "y".to_string(), "urn:y".to_string());
        ns.close_to(2);
        assert_eq!(ns.resolve("x"), "urn:x");
        assert_eq!(ns.resolve("y"), "#unknown");
    }
}
