use crate::entity::EOF;
use crate::{ByteSource, Entity, EntityError};

/// C3: nested entities flattened behind a single cursor. Push/pop is
/// explicit and caller-driven — matching the DTD parser's main loop in
/// spec §4.3 ("EOF -> pop; terminate when the stack is empty") — rather
/// than hidden inside `read_char`, since some callers (the DTD parser
/// dispatching on `%` parameter entity references) need to observe the
/// EOF of an inner entity before deciding whether to pop or to stop.
pub struct EntityStack {
    frames: Vec<Entity>,
}

impl EntityStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push_entity(
        &mut self,
        mut entity: Entity,
        byte_source: &dyn ByteSource,
        default_encoding: Option<&str>,
    ) -> Result<(), EntityError> {
        let parent_is_html = self.current().map(|e| e.is_html()).unwrap_or(false);
        entity.open(byte_source, default_encoding, parent_is_html)?;
        self.frames.push(entity);
        Ok(())
    }

    pub fn pop_entity(&mut self) -> Option<Entity> {
        let mut entity = self.frames.pop();
        if let Some(e) = &mut entity {
            e.close();
        }
        entity
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> Option<&Entity> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Entity> {
        self.frames.last_mut()
    }

    /// The encoding the innermost entity was decoded with.
    pub fn encoding(&self) -> Option<&str> {
        self.current().and_then(|e| e.encoding())
    }

    /// The resolved URI of the nearest entity on the stack that has one
    /// (innermost first) — internal/preloaded entities carry none, so a
    /// reference inside one resolves against whichever external entity it
    /// is nested in.
    pub fn base_uri(&self) -> Option<&str> {
        self.frames.iter().rev().find_map(|e| e.resolved_uri())
    }

    pub fn last_char(&self) -> char {
        self.current().map(|e| e.last_char()).unwrap_or(EOF)
    }

    pub fn read_char(&mut self) -> char {
        match self.current_mut() {
            Some(e) => e.read_char(),
            None => EOF,
        }
    }

    pub fn skip_whitespace(&mut self) -> char {
        match self.current_mut() {
            Some(e) => e.skip_whitespace(),
            None => EOF,
        }
    }

    pub fn scan_token(&mut self, term: &str, nmtoken: bool) -> Result<String, EntityError> {
        self.current_mut()
            .ok_or(EntityError::UnexpectedEof)?
            .scan_token(term, nmtoken)
    }

    pub fn scan_literal(&mut self, quote: char, html_mode: bool) -> Result<String, EntityError> {
        self.current_mut()
            .ok_or(EntityError::UnexpectedEof)?
            .scan_literal(quote, html_mode)
    }

    pub fn scan_to_end(&mut self, label: &str, terminator: &str) -> Result<String, EntityError> {
        self.current_mut()
            .ok_or(EntityError::UnexpectedEof)?
            .scan_to_end(label, terminator)
    }

    pub fn try_expand_char_entity(&mut self, html_mode: bool) -> Result<Option<String>, EntityError> {
        self.current_mut()
            .ok_or(EntityError::UnexpectedEof)?
            .try_expand_char_entity(html_mode)
    }

    /// Walks the parent chain (innermost first) and returns a human-readable
    /// trace with line, column, entity name and resolved URI per frame.
    pub fn context(&self) -> String {
        self.frames
            .iter()
            .rev()
            .map(|e| e.context_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for EntityStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LiteralKind;
    use crate::FetchedBytes;
    use std::io;

    struct NullSource;
    impl ByteSource for NullSource {
        fn fetch(&self, _uri: &str) -> io::Result<FetchedBytes> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no fetch in test"))
        }
    }

    #[test]
    fn push_pop_and_empty_stack_is_eof() {
        let mut stack = EntityStack::new();
        assert_eq!(stack.read_char(), EOF);

        stack
            .push_entity(
                Entity::internal("x", "ab", LiteralKind::None),
                &NullSource,
                None,
            )
            .unwrap();
        assert_eq!(stack.last_char(), 'a');
        assert_eq!(stack.read_char(), 'b');
        assert_eq!(stack.read_char(), EOF);

        stack.pop_entity();
        assert!(stack.is_empty());
    }

    #[test]
    fn context_lists_frames_innermost_first() {
        let mut stack = EntityStack::new();
        stack
            .push_entity(
                Entity::external("doc", None, "file:///root.html"),
                &NullSource,
                None,
            )
            .unwrap_err(); // NullSource always errors; nothing pushed.
        assert!(stack.is_empty());

        stack
            .push_entity(
                Entity::internal("outer", "x", LiteralKind::None),
                &NullSource,
                None,
            )
            .unwrap();
        stack
            .push_entity(
                Entity::internal("inner", "y", LiteralKind::None),
                &NullSource,
                None,
            )
            .unwrap();

        let ctx = stack.context();
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("inner"));
        assert!(lines[1].contains("outer"));
    }
}
