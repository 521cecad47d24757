//! C6: the open-element stack. Auto-close pops several frames at once, so
//! the stack is a plain `Vec` truncated to a target length rather than
//! popped element-by-element — the teacher's namespace stack
//! ([`sgml_chars`] aside) uses the same "batch-release by length" shape for
//! scope bookkeeping.

#[derive(Debug, Clone)]
pub struct OpenElement {
    pub name: String,
    pub xml_space: Option<String>,
    pub xml_lang: Option<String>,
    /// True for an element whose DTD declaration could not be found — the
    /// auto-close walk never descends past one of these.
    pub unknown: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OpenElementStack {
    elements: Vec<OpenElement>,
}

impl OpenElementStack {
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn push(&mut self, element: OpenElement) {
        self.elements.push(element);
    }

    pub fn top(&self) -> Option<&OpenElement> {
        self.elements.last()
    }

    /// The element below the top, i.e. the current element's parent.
    pub fn parent(&self) -> Option<&OpenElement> {
        let len = self.elements.len();
        if len >= 2 {
            Some(&self.elements[len - 2])
        } else {
            None
        }
    }

    pub fn at(&self, depth: usize) -> Option<&OpenElement> {
        self.elements.get(depth)
    }

    pub fn pop(&mut self) -> Option<OpenElement> {
        self.elements.pop()
    }

    /// Drops every frame above `new_len` in one shot — used both by plain
    /// end-tag handling and by the auto-close walk, which may need to
    /// close several intervening elements for a single incoming tag.
    pub fn truncate(&mut self, new_len: usize) {
        self.elements.truncate(new_len);
    }

    /// Case-insensitively searches from the top for an open element named
    /// `name`, returning its depth (stack index) if found.
    pub fn find_from_top(&self, name: &str) -> Option<usize> {
        self.elements
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.name.eq_ignore_ascii_case(name))
            .map(|(idx, _)| idx)
    }

    pub fn inherited_xml_space(&self) -> Option<&str> {
        self.elements.iter().rev().find_map(|e| e.xml_space.as_deref())
    }

    pub fn inherited_xml_lang(&self) -> Option<&str> {
        self.elements.iter().rev().find_map(|e| e.xml_lang.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(name: &str) -> OpenElement {
        OpenElement {
            name: name.to_string(),
            xml_space: None,
            xml_lang: None,
            unknown: false,
        }
    }

    #[test]
    fn truncate_drops_several_frames_at_once() {
        let mut stack = OpenElementStack::new();
        stack.push(elem("html"));
        stack.push(elem("body"));
        stack.push(elem("div"));
        stack.push(elem("span"));
        assert_eq!(stack.find_from_top("body"), Some(1));
        stack.truncate(2);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.top().unwrap().name, "body");
    }

    #[test]
    fn inherited_xml_space_walks_up_from_top() {
        let mut stack = OpenElementStack::new();
        let mut root = elem("pre");
        root.xml_space = Some("preserve".to_string());
        stack.push(root);
        stack.push(elem("span"));
        assert_eq!(stack.inherited_xml_space(), Some("preserve"));
    }
}
