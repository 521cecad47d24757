//! C7: the SGML reader's pull-mode state machine.

use sgml_chars::{CaseFolding, XmlAsciiChar};
use sgml_dtd::{Dtd, DtdParser, Presence};
use sgml_entities::{ByteSource, Entity, EntityStack, LiteralKind, Logger, EOF};

use crate::error::{ReaderError, ReaderResult};
use crate::namespace::NamespaceStack;
use crate::node::{Attr, Node, NodeType};
use crate::open_stack::{OpenElement, OpenElementStack};
use crate::resource::ResourceLoader;
use crate::state::{ReadState, ReaderState};

const ATERM: &str = " \t\r\n='\"/>";
const AVTERM: &str = " \t\r\n>";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WhitespacePolicy {
    Report,
    Suppress,
}

#[derive(Clone)]
pub struct ReaderOptions {
    pub case_folding: CaseFolding,
    pub whitespace_policy: WhitespacePolicy,
    /// `true` drops `<!DOCTYPE …>` instead of emitting a `DocumentType`
    /// node — the default; the CLI's `-doctype` flag clears this to keep it.
    pub strip_doc_type: bool,
    /// Forces HTML mode (the bundled DTD, HTML entity/root handling) even
    /// before a `<!DOCTYPE html>` or root `<html>` is seen — the `-html`
    /// CLI flag's effect.
    pub force_html: bool,
    pub default_encoding: Option<String>,
    /// Overrides the document's own `<!DOCTYPE … SYSTEM …>` (if any) with
    /// an externally named DTD — the CLI's `-dtd url` flag.
    pub forced_dtd_uri: Option<String>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            case_folding: CaseFolding::None,
            whitespace_policy: WhitespacePolicy::Report,
            strip_doc_type: true,
            force_html: false,
            default_encoding: None,
            forced_dtd_uri: None,
        }
    }
}

struct PendingAutoClose {
    close_until_depth: usize,
    new_element: Node,
}

pub struct SgmlReader<'a> {
    stack: EntityStack,
    byte_source: &'a dyn ByteSource,
    resource_loader: &'a dyn ResourceLoader,
    logger: &'a dyn Logger,
    options: ReaderOptions,

    dtd: Option<Dtd>,
    is_html: bool,

    open: OpenElementStack,
    namespaces: NamespaceStack,
    node: Node,
    state: ReadState,

    root_found: bool,
    text_buf: String,
    lookahead: Option<char>,
    cdata_element: Option<String>,
    pending_cdata_end: Option<(String, usize)>,
    pending_autoclose: Option<PendingAutoClose>,
    /// A start tag whose processing (auto-close check, push, CDATA-content
    /// switch) is deferred one `read()` call so a synthesized root `<html>`
    /// element can be emitted first — see `handle_root_injection`.
    pending_start_tag: Option<(String, String, Node)>,

    /// Index into the current node's attribute list when the reader has
    /// been navigated onto one via `move_to_attribute*`; `None` means the
    /// reader is positioned on the element/text/etc. node itself.
    current_attr: Option<usize>,
    /// Whether `read_attribute_value` has already yielded the current
    /// attribute's (single, already-expanded) value.
    attr_value_consumed: bool,
    closed: bool,
}

impl<'a> SgmlReader<'a> {
    pub fn new(
        entry: Entity,
        byte_source: &'a dyn ByteSource,
        resource_loader: &'a dyn ResourceLoader,
        logger: &'a dyn Logger,
        options: ReaderOptions,
    ) -> ReaderResult<Self> {
        let mut stack = EntityStack::new();
        stack.push_entity(entry, byte_source, options.default_encoding.as_deref())?;
        let is_html = options.force_html;
        Ok(Self {
            stack,
            byte_source,
            resource_loader,
            logger,
            options,
            dtd: None,
            is_html,
            open: OpenElementStack::new(),
            namespaces: NamespaceStack::new(),
            node: Node::new(),
            state: ReadState::Initial,
            root_found: false,
            text_buf: String::new(),
            lookahead: None,
            cdata_element: None,
            pending_cdata_end: None,
            pending_autoclose: None,
            pending_start_tag: None,
            current_attr: None,
            attr_value_consumed: false,
            closed: false,
        })
    }

    pub fn node_type(&self) -> NodeType {
        self.node.node_type
    }

    /// The current node's (possibly prefixed) name — or, once navigated
    /// onto one via `move_to_attribute*`, that attribute's name.
    pub fn name(&self) -> &str {
        match self.current_attr {
            Some(i) => &self.node.attrs[i].name,
            None => &self.node.name,
        }
    }

    pub fn value(&self) -> &str {
        match self.current_attr {
            Some(i) => &self.node.attrs[i].value,
            None => &self.node.value,
        }
    }

    /// The current name with any `prefix:` stripped.
    pub fn local_name(&self) -> &str {
        split_qname(self.name()).1
    }

    /// The current name's prefix, or `""` if unprefixed.
    pub fn prefix(&self) -> &str {
        split_qname(self.name()).0
    }

    /// Resolved namespace URI for a prefixed element or attribute name
    /// (`#unknown`/`#unknownN` if the prefix was never declared); `None`
    /// for an unprefixed name.
    pub fn namespace_uri(&self) -> Option<&str> {
        match self.current_attr {
            Some(i) => self.node.attrs[i].namespace_uri.as_deref(),
            None => self.node.namespace_uri.as_deref(),
        }
    }

    /// The resolved URI of the entity the current node was read from,
    /// used to make sense of relative `SYSTEM` identifiers.
    pub fn base_uri(&self) -> &str {
        self.stack.base_uri().unwrap_or("")
    }

    pub fn attrs(&self) -> &[Attr] {
        &self.node.attrs
    }

    pub fn depth(&self) -> usize {
        self.node.depth
    }

    pub fn is_empty_element(&self) -> bool {
        self.node.empty
    }

    pub fn is_simulated(&self) -> bool {
        self.node.simulated
    }

    /// `true` when positioned on an attribute synthesized from a DTD
    /// default/`#FIXED` literal rather than read from the source markup.
    pub fn is_default(&self) -> bool {
        match self.current_attr {
            Some(i) => self.node.attrs[i].is_default,
            None => false,
        }
    }

    /// The quote character the current attribute was written with, or
    /// `'\0'` for an HTML-style boolean attribute. `'"'` when not
    /// positioned on an attribute.
    pub fn quote_char(&self) -> char {
        match self.current_attr {
            Some(i) => self.node.attrs[i].quote,
            None => '"',
        }
    }

    pub fn attribute_count(&self) -> usize {
        self.node.attrs.len()
    }

    pub fn get_attribute(&self, index: usize) -> Option<&str> {
        self.node.attrs.get(index).map(|a| a.value.as_str())
    }

    pub fn get_attribute_named(&self, name: &str) -> Option<&str> {
        self.node.find_attr(name).map(|a| a.value.as_str())
    }

    /// Navigates onto the `index`-th attribute of the current node; `name`/
    /// `value`/`local_name`/`prefix`/`namespace_uri`/`is_default`/
    /// `quote_char` all report that attribute's own data until
    /// `move_to_element` is called. Returns `false` (and does not move) if
    /// `index` is out of range.
    pub fn move_to_attribute(&mut self, index: usize) -> bool {
        if index >= self.node.attrs.len() {
            return false;
        }
        self.current_attr = Some(index);
        self.attr_value_consumed = false;
        true
    }

    pub fn move_to_attribute_named(&mut self, name: &str) -> bool {
        match self.node.attrs.iter().position(|a| a.name.eq_ignore_ascii_case(name)) {
            Some(index) => self.move_to_attribute(index),
            None => false,
        }
    }

    pub fn move_to_first_attribute(&mut self) -> bool {
        self.move_to_attribute(0)
    }

    pub fn move_to_next_attribute(&mut self) -> bool {
        let next = self.current_attr.map(|i| i + 1).unwrap_or(0);
        self.move_to_attribute(next)
    }

    /// Returns to the element/text/etc. node itself; `true` if the reader
    /// had been positioned on an attribute.
    pub fn move_to_element(&mut self) -> bool {
        let was_on_attribute = self.current_attr.is_some();
        self.current_attr = None;
        self.attr_value_consumed = false;
        was_on_attribute
    }

    /// Reads the (already fully expanded) text of the current attribute's
    /// value, once. Returns `false` without a second "child" to read,
    /// since attribute values here are never split into separate text/
    /// entity-reference nodes the way a DOM-backed reader might expose
    /// them.
    pub fn read_attribute_value(&mut self) -> bool {
        if self.current_attr.is_none() || self.attr_value_consumed {
            return false;
        }
        self.attr_value_consumed = true;
        true
    }

    /// `true` once `read()` has returned `false` (or `close()` was
    /// called): no more nodes remain.
    pub fn eof(&self) -> bool {
        self.closed || self.state == ReadState::Eof
    }

    pub fn read_state(&self) -> ReaderState {
        if self.closed {
            ReaderState::Closed
        } else {
            match self.state {
                ReadState::Initial => ReaderState::Initial,
                ReadState::Eof => ReaderState::EndOfFile,
                _ => ReaderState::Interactive,
            }
        }
    }

    /// Releases the reader for reuse-free disposal; `read()` after this
    /// always returns `false`. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.state = ReadState::Eof;
        self.node.reset(NodeType::Eof);
    }

    /// The encoding the document's outermost entity was actually decoded
    /// with, once it has been opened.
    pub fn get_encoding(&self) -> Option<&str> {
        self.stack.encoding()
    }

    pub fn xml_space(&self) -> Option<&str> {
        self.open.inherited_xml_space()
    }

    pub fn xml_lang(&self) -> Option<&str> {
        self.open.inherited_xml_lang()
    }

    /// Reads and concatenates the text/whitespace/CData content of the
    /// current element, advancing past it and stopping at the next
    /// non-text node (typically the matching end tag). A no-op returning
    /// `""` when not positioned on a non-empty element.
    pub fn read_string(&mut self) -> ReaderResult<String> {
        if self.node_type() == NodeType::Element && !self.is_empty_element() {
            self.read()?;
        }
        let mut out = String::new();
        while matches!(self.node_type(), NodeType::Text | NodeType::Whitespace | NodeType::CData) {
            out.push_str(self.value());
            if !self.read()? {
                break;
            }
        }
        Ok(out)
    }

    /// Serializes every node inside the current element (not including its
    /// own start/end tags), advancing past the whole subtree including the
    /// matching end tag. `""` when not positioned on a non-empty element.
    pub fn read_inner_xml(&mut self) -> ReaderResult<String> {
        if self.node_type() != NodeType::Element || self.is_empty_element() {
            self.read()?;
            return Ok(String::new());
        }
        let start_depth = self.depth();
        let mut out = String::new();
        if !self.read()? {
            return Ok(out);
        }
        loop {
            if self.node_type() == NodeType::EndElement && self.depth() == start_depth {
                self.read()?;
                break;
            }
            append_node_xml(&mut out, self);
            if !self.read()? {
                break;
            }
        }
        Ok(out)
    }

    /// Serializes the current node and, if it is a non-empty element, its
    /// entire subtree including its own start and end tags, advancing past
    /// all of it. This is the round-trip law's `read_outer_xml`: re-parsing
    /// the result under XML rules reproduces the same event sequence
    /// (modulo namespace assignment).
    pub fn read_outer_xml(&mut self) -> ReaderResult<String> {
        if self.node_type() != NodeType::Element {
            let mut out = String::new();
            append_node_xml(&mut out, self);
            self.read()?;
            return Ok(out);
        }

        let start_depth = self.depth();
        let is_empty = self.is_empty_element();
        let mut out = String::new();
        append_node_xml(&mut out, self);
        let mut more = self.read()?;
        if is_empty {
            return Ok(out);
        }
        loop {
            if !more {
                break;
            }
            let is_matching_end = self.node_type() == NodeType::EndElement && self.depth() == start_depth;
            append_node_xml(&mut out, self);
            more = self.read()?;
            if is_matching_end {
                break;
            }
        }
        Ok(out)
    }

    // ---- character-stream helpers, flattening parameter/general entity
    // pushes the way the DTD parser's own `peek`/`bump` do -----------------

    fn cur(&mut self) -> char {
        loop {
            let c = self.stack.last_char();
            if c != EOF || self.stack.depth() <= 1 {
                return c;
            }
            self.stack.pop_entity();
        }
    }

    fn adv(&mut self) -> char {
        self.stack.read_char();
        self.cur()
    }

    fn skip_ws(&mut self) {
        while self.cur().is_xml_whitespace() {
            self.adv();
        }
    }

    fn fold(&self, name: &str) -> String {
        self.options.case_folding.fold(name)
    }

    // ---- top-level driver --------------------------------------------------

    pub fn read(&mut self) -> ReaderResult<bool> {
        loop {
            match self.state {
                ReadState::Initial => {
                    self.open_dtd_if_needed()?;
                    self.state = ReadState::Text;
                }
                ReadState::AutoClose => {
                    if self.advance_auto_close() {
                        return Ok(true);
                    }
                }
                ReadState::PseudoStartTag => {
                    if let Some((raw_name, folded_name, node)) = self.pending_start_tag.take() {
                        return self.finish_start_tag(raw_name, folded_name, node);
                    }
                    self.state = ReadState::Text;
                }
                ReadState::Eof => {
                    self.node.reset(NodeType::Eof);
                    return Ok(false);
                }
                ReadState::CData => {
                    if self.read_cdata()? {
                        return Ok(true);
                    }
                }
                _ => {
                    if self.read_content()? {
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn open_dtd_if_needed(&mut self) -> ReaderResult<()> {
        if self.dtd.is_some() {
            return Ok(());
        }
        if let Some(uri) = self.options.forced_dtd_uri.clone() {
            self.load_external_dtd("html", &uri)?;
            return Ok(());
        }
        if self.is_html {
            if let Ok(text) = self.resource_loader.load("HTML") {
                log::debug!("loading bundled HTML DTD ({} bytes)", text.len());
                let entry = Entity::internal("HTML", text, LiteralKind::None);
                let mut parser = DtdParser::new(entry, self.byte_source, self.logger)?;
                let mut dtd = Dtd::new("HTML".to_string());
                parser.parse(&mut dtd)?;
                self.dtd = Some(dtd);
            }
        }
        Ok(())
    }

    /// Loads and parses an externally referenced DTD (a `<!DOCTYPE … SYSTEM
    /// "uri">`), merging its declarations into whatever table already
    /// exists (e.g. the bundled HTML one).
    fn load_external_dtd(&mut self, root_name: &str, system_id: &str) -> ReaderResult<()> {
        log::debug!("fetching external DTD subset '{}'", system_id);
        let entry = Entity::external("dtd", None, system_id.to_string());
        let mut parser = DtdParser::new(entry, self.byte_source, self.logger)?;
        let mut dtd = self.dtd.take().unwrap_or_else(|| Dtd::new(root_name.to_string()));
        parser.parse(&mut dtd)?;
        self.dtd = Some(dtd);
        Ok(())
    }

    // ---- content dispatch (Markup / Text / PartialText / PartialTag) ------

    fn read_content(&mut self) -> ReaderResult<bool> {
        if let Some(c) = self.lookahead.take() {
            return self.dispatch_markup(c);
        }

        let c = self.cur();
        if c == EOF {
            return self.finish_at_eof();
        }
        if c == '<' {
            let next = self.adv();
            return self.dispatch_markup(next);
        }
        self.read_text()
    }

    fn dispatch_markup(&mut self, next: char) -> ReaderResult<bool> {
        match next {
            '%' => self.read_asp_block(),
            '!' => self.read_bang_markup(),
            '?' => self.read_processing_instruction(),
            '/' => self.read_end_tag(),
            c if c == '_' || c.is_alphabetic() => self.read_start_tag(c),
            c => {
                // Not actually markup; re-emit the '<' and resume as text.
                self.text_buf.clear();
                self.text_buf.push('<');
                self.text_buf.push(c);
                self.adv();
                self.continue_text()
            }
        }
    }

    fn read_text(&mut self) -> ReaderResult<bool> {
        self.text_buf.clear();
        self.continue_text()
    }

    fn continue_text(&mut self) -> ReaderResult<bool> {
        loop {
            let c = self.cur();
            if c == EOF {
                break;
            }
            if c == '<' {
                let next = self.adv();
                if next == '/' || next == '!' || next == '?' || next == '_' || next.is_alphabetic() {
                    self.lookahead = Some(next);
                    break;
                }
                self.text_buf.push('<');
                continue;
            }
            if c == '&' {
                self.expand_general_entity_in_text()?;
                continue;
            }
            self.text_buf.push(c);
            self.adv();
        }

        if self.text_buf.is_empty() {
            if self.lookahead.is_some() {
                let next = self.lookahead.take().unwrap();
                return self.dispatch_markup(next);
            }
            return self.finish_at_eof();
        }

        let all_ws = self.text_buf.chars().all(|c| c.is_xml_whitespace());
        if all_ws {
            if self.options.whitespace_policy == WhitespacePolicy::Suppress {
                if let Some(next) = self.lookahead.take() {
                    return self.dispatch_markup(next);
                }
                self.text_buf.clear();
                return self.continue_text();
            }
            self.node.reset(NodeType::Whitespace);
        } else {
            self.node.reset(NodeType::Text);
        }
        self.node.value.push_str(&self.text_buf);
        self.node.depth = self.open.depth();
        Ok(true)
    }

    /// Reached true end of input: any elements still open (never matched by
    /// an explicit or auto-closing end tag — e.g. `<p>hello` with no
    /// closing tag at all) are unwound one at a time, each producing its
    /// own `EndElement` event, before the reader finally reports EOF.
    fn finish_at_eof(&mut self) -> ReaderResult<bool> {
        if self.open.is_empty() {
            self.state = ReadState::Eof;
            return Ok(false);
        }
        let depth_before_pop = self.open.depth();
        let popped = self.open.pop();
        self.namespaces.close_to(self.open.depth());
        self.node.reset(NodeType::EndElement);
        self.node.name = popped.map(|e| e.name).unwrap_or_default();
        self.node.depth = depth_before_pop;
        Ok(true)
    }

    fn expand_general_entity_in_text(&mut self) -> ReaderResult<()> {
        let html_mode = self.is_html;
        if let Some(expanded) = self.stack.try_expand_char_entity(html_mode)? {
            self.text_buf.push_str(&expanded);
            return Ok(());
        }

        self.adv(); // consume '&'
        let mut name = String::new();
        while self.cur() != ';' {
            if self.cur() == EOF {
                return Err(ReaderError::UnexpectedEof);
            }
            name.push(self.cur());
            self.adv();
        }
        self.adv(); // consume ';'

        let value = self.dtd.as_ref().and_then(|d| d.general_entity(&name).cloned());
        match value {
            Some(sgml_dtd::EntityValue::Literal(text)) | Some(sgml_dtd::EntityValue::Typed(_, text)) => {
                self.text_buf.push_str(&text);
            }
            Some(sgml_dtd::EntityValue::External { system_id, .. }) => {
                let entity = Entity::external(name, None, system_id);
                self.stack.push_entity(entity, self.byte_source, None)?;
            }
            None => {
                self.logger.warn(&format!("unknown entity '&{};'", name));
                self.text_buf.push('&');
                self.text_buf.push_str(&name);
                self.text_buf.push(';');
            }
        }
        Ok(())
    }

    // ---- markup constructs --------------------------------------------------

    fn read_asp_block(&mut self) -> ReaderResult<bool> {
        self.adv(); // consume '%'
        let body = self
            .stack
            .scan_to_end("ASP block", "%>")
            .map_err(ReaderError::from)?;
        self.node.reset(NodeType::CData);
        self.node.value = format!("<%{}%>", body);
        self.node.depth = self.open.depth();
        Ok(true)
    }

    fn read_bang_markup(&mut self) -> ReaderResult<bool> {
        self.adv(); // consume '!'
        match self.cur() {
            '-' => {
                self.adv();
                self.expect('-')?;
                self.read_comment()
            }
            '[' => self.read_marked_construct(),
            _ => self.read_doctype(),
        }
    }

    fn expect(&mut self, expected: char) -> ReaderResult<()> {
        if self.cur() != expected {
            return Err(ReaderError::InvalidNameStart(self.cur()));
        }
        self.adv();
        Ok(())
    }

    /// Comments collapse internal `--` to a single `-` and pad a trailing
    /// `-` with a space, so the result always satisfies XML's comment
    /// grammar even when the source violated SGML's own rule against `--`.
    fn read_comment(&mut self) -> ReaderResult<bool> {
        let raw = self.stack.scan_to_end("comment", "-->").map_err(ReaderError::from)?;
        let mut collapsed = String::with_capacity(raw.len());
        let mut dashes = 0;
        for c in raw.chars() {
            if c == '-' {
                dashes += 1;
                if dashes > 1 {
                    continue;
                }
            } else {
                dashes = 0;
            }
            collapsed.push(c);
        }
        if collapsed.ends_with('-') {
            collapsed.push(' ');
        }
        self.node.reset(NodeType::Comment);
        self.node.value = collapsed;
        self.node.depth = self.open.depth();
        Ok(true)
    }

    /// `<![CDATA[ … ]]>`, and silently-skipped IE downlevel-revealed
    /// conditional comments (`<![if …]>` and its `<![endif]>` sibling).
    fn read_marked_construct(&mut self) -> ReaderResult<bool> {
        self.adv(); // consume '['
        let keyword_start = self.cur();
        if keyword_start == 'C' {
            let keyword = self.scan_bare_name();
            if keyword.eq_ignore_ascii_case("CDATA") {
                self.expect('[')?;
                let raw = self.stack.scan_to_end("CDATA section", "]]>").map_err(ReaderError::from)?;
                self.node.reset(NodeType::CData);
                self.node.value = strip_nested_cdata_wrappers(&raw);
                self.node.depth = self.open.depth();
                return Ok(true);
            }
        }
        // `if …]` / `endif]` / anything else: skip to the matching `]>`.
        self.stack.scan_to_end("marked section", "]>").map_err(ReaderError::from)?;
        self.read_content()
    }

    fn scan_bare_name(&mut self) -> String {
        let mut buf = String::new();
        while self.cur().is_alphabetic() {
            buf.push(self.cur());
            self.adv();
        }
        buf
    }

    /// `<!DOCTYPE name [PUBLIC pubid] [SYSTEM syslit] [internal subset]>`.
    fn read_doctype(&mut self) -> ReaderResult<bool> {
        self.skip_ws();
        let root_name = self.scan_bare_name();
        self.is_html = self.is_html || root_name.eq_ignore_ascii_case("html");
        self.skip_ws();

        let mut public_id = None;
        let mut system_id = None;
        let keyword = self.scan_bare_name();
        if keyword.eq_ignore_ascii_case("PUBLIC") {
            self.skip_ws();
            public_id = Some(self.scan_quoted()?);
            self.skip_ws();
            if self.cur() == '"' || self.cur() == '\'' {
                system_id = Some(self.scan_quoted()?);
            }
        } else if keyword.eq_ignore_ascii_case("SYSTEM") {
            self.skip_ws();
            system_id = Some(self.scan_quoted()?);
        }
        self.skip_ws();

        if self.cur() == '[' {
            self.adv();
            let internal_subset = self.stack.scan_to_end("internal subset", "]").map_err(ReaderError::from)?;
            self.skip_ws();
            let entry = Entity::internal("internal-subset", internal_subset, LiteralKind::None);
            let mut parser = DtdParser::new(entry, self.byte_source, self.logger)?;
            let mut dtd = self.dtd.take().unwrap_or_else(|| Dtd::new(root_name.to_ascii_uppercase()));
            parser.parse(&mut dtd)?;
            self.dtd = Some(dtd);
        }
        self.expect('>')?;

        self.open_dtd_if_needed()?;
        if let Some(system_id) = &system_id {
            self.load_external_dtd(&root_name, system_id)?;
        }

        if self.options.strip_doc_type {
            return self.read_content();
        }

        self.node.reset(NodeType::DocumentType);
        self.node.name = root_name;
        if let Some(id) = public_id {
            self.node.push_attr(Attr::new("PUBLIC".to_string(), id, '"'));
        }
        if let Some(id) = system_id {
            self.node.push_attr(Attr::new("SYSTEM".to_string(), id, '"'));
        }
        self.node.depth = self.open.depth();
        Ok(true)
    }

    fn scan_quoted(&mut self) -> ReaderResult<String> {
        let quote = self.cur();
        if quote != '"' && quote != '\'' {
            return Err(ReaderError::InvalidNameStart(quote));
        }
        self.adv();
        self.stack.scan_literal(quote, self.is_html).map_err(ReaderError::from)
    }

    fn read_processing_instruction(&mut self) -> ReaderResult<bool> {
        self.adv(); // consume '?'
        let name = self.scan_bare_name();
        let body = self.stack.scan_to_end("processing instruction", "?>").map_err(ReaderError::from)?;
        if name.eq_ignore_ascii_case("xml") {
            // The XML declaration is recognized but regenerated by the
            // serializer, not re-emitted as a node.
            return self.read_content();
        }
        self.node.reset(NodeType::ProcessingInstruction);
        self.node.name = name;
        self.node.value = body.trim_start().to_string();
        self.node.depth = self.open.depth();
        Ok(true)
    }

    // ---- end tags + auto-close --------------------------------------------

    fn read_end_tag(&mut self) -> ReaderResult<bool> {
        self.adv(); // consume '/'
        let raw_name = self.scan_name_token()?;
        self.skip_ws();
        if self.cur() == '>' {
            self.adv();
        }

        match self.open.find_from_top(&raw_name) {
            Some(target_depth) => {
                if target_depth + 1 == self.open.depth() {
                    let depth_before_pop = self.open.depth();
                    let popped = self.open.pop().unwrap();
                    self.namespaces.close_to(self.open.depth());
                    self.node.reset(NodeType::EndElement);
                    self.node.name = popped.name;
                    self.node.depth = depth_before_pop;
                    self.state = ReadState::Text;
                    Ok(true)
                } else {
                    // Close everything above (and including) the matched
                    // ancestor; `new_element` stays empty since there is no
                    // start tag waiting to be pushed once we reach it.
                    self.pending_autoclose = Some(PendingAutoClose {
                        close_until_depth: target_depth,
                        new_element: Node::new(),
                    });
                    self.state = ReadState::AutoClose;
                    self.advance_auto_close_or_continue()
                }
            }
            None => {
                self.logger.warn(&format!("no matching start tag for end tag '{}'", raw_name));
                self.read_content()
            }
        }
    }

    fn advance_auto_close_or_continue(&mut self) -> ReaderResult<bool> {
        if self.advance_auto_close() {
            Ok(true)
        } else {
            self.read_content()
        }
    }

    /// Emits one `EndElement` per call while closing down to the target
    /// depth; when the target is reached either pushes the buffered new
    /// element (start-tag auto-close) or simply resumes text parsing
    /// (explicit end-tag driven close).
    fn advance_auto_close(&mut self) -> bool {
        let pending = match &self.pending_autoclose {
            Some(p) => p,
            None => {
                self.state = ReadState::Text;
                return false;
            }
        };
        let target = pending.close_until_depth;

        if self.open.depth() > target {
            let depth_before_pop = self.open.depth();
            let popped = self.open.pop().unwrap();
            self.namespaces.close_to(self.open.depth());
            self.node.reset(NodeType::EndElement);
            self.node.name = popped.name;
            self.node.depth = depth_before_pop;
            return true;
        }

        let mut pending = self.pending_autoclose.take().unwrap();
        if !pending.new_element.name.is_empty() {
            self.push_open_element(&pending.new_element);
            pending.new_element.depth = self.open.depth();
            self.node = pending.new_element;
            self.node.node_type = NodeType::Element;
            self.state = ReadState::Text;
            true
        } else {
            self.state = ReadState::Text;
            false
        }
    }

    // ---- start tags ----------------------------------------------------------

    fn read_start_tag(&mut self, first: char) -> ReaderResult<bool> {
        let mut raw_name = String::new();
        raw_name.push(first);
        self.adv();
        raw_name.push_str(&self.scan_name_token_rest()?);
        let folded_name = self.fold(&raw_name);

        let mut node = Node::new();
        node.node_type = NodeType::Element;
        node.name = folded_name.clone();

        loop {
            self.skip_ws();
            match self.cur() {
                '>' => {
                    self.adv();
                    break;
                }
                '/' => {
                    self.adv();
                    if self.cur() == '>' {
                        self.adv();
                    }
                    node.empty = true;
                    break;
                }
                EOF => return Err(ReaderError::UnexpectedEof),
                ',' | '=' | ':' | ';' => {
                    self.adv();
                }
                _ => self.read_attribute(&mut node)?,
            }
        }

        if let Some(decl) = self.dtd.as_ref().and_then(|d| d.element(&raw_name)) {
            if decl.content_model.declared_content == sgml_dtd::DeclaredContent::Empty {
                node.empty = true;
            }
        }

        self.apply_attribute_defaults(&raw_name, &mut node);
        self.handle_xmlns_decls(&node);
        self.resolve_namespaces(&mut node);

        if let Some(html_node) = self.handle_root_injection(&mut node) {
            self.pending_start_tag = Some((raw_name, folded_name, node));
            self.state = ReadState::PseudoStartTag;
            self.node = html_node;
            return Ok(true);
        }

        self.finish_start_tag(raw_name, folded_name, node)
    }

    /// The part of start-tag handling that can be deferred behind a
    /// synthesized root `<html>` element (§4.4's root injection): checks
    /// whether an ancestor needs auto-closing, then pushes the element and
    /// sets the next read state (Text or CData-content).
    fn finish_start_tag(
        &mut self,
        raw_name: String,
        folded_name: String,
        mut node: Node,
    ) -> ReaderResult<bool> {
        if let Some(target_depth) = self.find_auto_close_target(&raw_name) {
            self.pending_autoclose = Some(PendingAutoClose {
                close_until_depth: target_depth,
                new_element: node,
            });
            self.state = ReadState::AutoClose;
            return Ok(self.advance_auto_close());
        }

        self.push_open_element(&node);
        node.depth = self.open.depth();
        let is_cdata_content = self
            .dtd
            .as_ref()
            .and_then(|d| d.element(&raw_name))
            .map(|d| d.content_model.declared_content == sgml_dtd::DeclaredContent::Cdata)
            .unwrap_or(false);
        if is_cdata_content && !node.empty {
            self.cdata_element = Some(folded_name);
            self.state = ReadState::CData;
        } else {
            self.state = ReadState::Text;
        }
        self.node = node;
        Ok(true)
    }

    fn push_open_element(&mut self, node: &Node) {
        self.open.push(OpenElement {
            name: node.name.clone(),
            xml_space: node.find_attr("xml:space").map(|a| a.value.clone()),
            xml_lang: node.find_attr("xml:lang").map(|a| a.value.clone()),
            unknown: self.dtd.as_ref().map(|d| d.element(&node.name).is_none()).unwrap_or(true),
        });
    }

    fn handle_xmlns_decls(&mut self, node: &Node) {
        let depth = self.open.depth() + 1;
        for attr in &node.attrs {
            if attr.name.eq_ignore_ascii_case("xmlns") {
                self.namespaces.declare(depth, String::new(), attr.value.clone());
            } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                self.namespaces.declare(depth, prefix.to_string(), attr.value.clone());
            }
        }
    }

    /// Resolves the element's own prefix (if any) and every prefixed,
    /// non-`xmlns` attribute's prefix against the namespace scope that
    /// `handle_xmlns_decls` just pushed — spec's `#unknown`/`#unknownN`
    /// placeholder for an undeclared prefix.
    fn resolve_namespaces(&mut self, node: &mut Node) {
        let (prefix, _) = split_qname(&node.name);
        if !prefix.is_empty() {
            node.namespace_uri = Some(self.namespaces.resolve(prefix));
        }
        for attr in &mut node.attrs {
            if attr.name.eq_ignore_ascii_case("xmlns") || attr.name.to_ascii_lowercase().starts_with("xmlns:") {
                continue;
            }
            let (prefix, _) = split_qname(&attr.name);
            if !prefix.is_empty() {
                attr.namespace_uri = Some(self.namespaces.resolve(prefix));
            }
        }
    }

    /// Synthesizes attributes left out of the source markup but declared
    /// with a `<!ATTLIST …>` default or `#FIXED` literal — spec's "null
    /// means use DTD default".
    fn apply_attribute_defaults(&self, raw_name: &str, node: &mut Node) {
        let decl = match self.dtd.as_ref().and_then(|d| d.element(raw_name)) {
            Some(decl) => decl,
            None => return,
        };
        for attdef in &decl.attlist {
            if !matches!(attdef.presence, Presence::Default | Presence::Fixed) {
                continue;
            }
            let Some(default_value) = &attdef.default_value else {
                continue;
            };
            if node.find_attr(&attdef.name).is_some() {
                continue;
            }
            node.push_attr(Attr::defaulted(attdef.name.clone(), default_value.clone()));
        }
    }

    /// §4.4's "Root injection": the first content node becomes the root
    /// marker; an HTML document whose first element is not `<html>` gets
    /// one synthesized underneath it, returned here so the caller can emit
    /// it as its own `Element` event ahead of the real first element.
    fn handle_root_injection(&mut self, node: &mut Node) -> Option<Node> {
        if self.root_found {
            return None;
        }
        self.root_found = true;
        if self.is_html && !node.name.eq_ignore_ascii_case("html") {
            let mut html = Node::new();
            html.node_type = NodeType::Element;
            html.name = self.fold("html");
            html.simulated = true;
            self.push_open_element(&html);
            html.depth = self.open.depth();
            Some(html)
        } else {
            None
        }
    }

    /// Walks the open-element stack from the top downward, looking for an
    /// ancestor whose content model permits `name` as a child. Returns
    /// `None` if the current top already permits it (no auto-close
    /// needed) or if the walk hits a wall before finding one: an unknown
    /// ancestor, `<body>` at depth 2, the document root, or an ancestor
    /// with a required end tag.
    fn find_auto_close_target(&self, upper_name: &str) -> Option<usize> {
        let dtd = self.dtd.as_ref()?;
        if self.open.is_empty() {
            return None;
        }
        let top_idx = self.open.depth() - 1;
        let mut idx = top_idx;
        loop {
            let ancestor = self.open.at(idx)?;
            if ancestor.unknown {
                return None;
            }
            let decl = dtd.element(&ancestor.name)?;
            if decl.can_contain(upper_name) {
                return if idx == top_idx { None } else { Some(idx + 1) };
            }
            if decl.end_tag == sgml_dtd::TagOmission::Required {
                return None;
            }
            if ancestor.name.eq_ignore_ascii_case(&dtd.name) {
                return None;
            }
            if idx == 1 && ancestor.name.eq_ignore_ascii_case("body") {
                return None;
            }
            if idx == 0 {
                // No ancestor left to absorb the new element as a child;
                // unwind the whole stack and let it start a new root-level
                // sibling.
                return Some(0);
            }
            idx -= 1;
        }
    }

    fn read_attribute(&mut self, node: &mut Node) -> ReaderResult<()> {
        let raw_name = self.scan_attr_name_token()?;
        if raw_name.is_empty() {
            self.adv();
            return Ok(());
        }
        if !sgml_chars::verify_nmtoken(&raw_name) {
            self.logger.warn(&format!("dropping invalid attribute name '{}'", raw_name));
            self.skip_to_attr_boundary();
            return Ok(());
        }

        self.skip_ws();
        let (value, quote) = if self.cur() == '=' {
            self.adv();
            self.skip_ws();
            self.read_attr_value()?
        } else {
            (raw_name.clone(), '\0')
        };

        let name = self.fold(&raw_name);
        if !node.push_attr(Attr::new(name, value, quote)) {
            self.logger.warn(&format!("dropping duplicate attribute '{}'", raw_name));
        }
        Ok(())
    }

    fn read_attr_value(&mut self) -> ReaderResult<(String, char)> {
        let c = self.cur();
        if c == '"' || c == '\'' {
            self.adv();
            let value = self.stack.scan_literal(c, self.is_html).map_err(ReaderError::from)?;
            Ok((value, c))
        } else {
            let value = self.scan_until(AVTERM)?;
            Ok((value, '\0'))
        }
    }

    fn skip_to_attr_boundary(&mut self) {
        while !ATERM.contains(self.cur()) && self.cur() != EOF {
            self.adv();
        }
    }

    fn scan_attr_name_token(&mut self) -> ReaderResult<String> {
        self.scan_until(ATERM)
    }

    fn scan_name_token(&mut self) -> ReaderResult<String> {
        let first = self.cur();
        if !(first == '_' || first.is_alphabetic()) {
            return Err(ReaderError::InvalidNameStart(first));
        }
        let rest = self.scan_name_token_rest()?;
        Ok(format!("{}{}", first, rest))
    }

    fn scan_name_token_rest(&mut self) -> ReaderResult<String> {
        let mut buf = String::new();
        loop {
            let c = self.cur();
            if c == '_' || c == '.' || c == '-' || c == ':' || c.is_alphanumeric() {
                buf.push(c);
                self.adv();
            } else {
                break;
            }
        }
        Ok(buf)
    }

    fn scan_until(&mut self, term: &str) -> ReaderResult<String> {
        let mut buf = String::new();
        loop {
            let c = self.cur();
            if c == EOF {
                return Err(ReaderError::UnexpectedEof);
            }
            if term.contains(c) {
                break;
            }
            buf.push(c);
            self.adv();
        }
        Ok(buf)
    }

    // ---- CDATA content (script/style) --------------------------------------

    fn read_cdata(&mut self) -> ReaderResult<bool> {
        if let Some((name, depth)) = self.pending_cdata_end.take() {
            self.node.reset(NodeType::EndElement);
            self.node.name = name;
            self.node.depth = depth;
            self.state = ReadState::Text;
            return Ok(true);
        }

        let element_name = match self.cdata_element.clone() {
            Some(n) => n,
            None => {
                self.state = ReadState::Text;
                return self.read_content();
            }
        };

        let mut buf = String::new();
        loop {
            let c = self.cur();
            if c == EOF {
                break;
            }
            if c == '<' {
                let next = self.adv();
                if next == '/' {
                    let text_depth = self.open.depth();
                    let name = self.scan_bare_name();
                    if name.eq_ignore_ascii_case(&element_name) {
                        self.skip_ws();
                        if self.cur() == '>' {
                            self.adv();
                        }
                        self.cdata_element = None;
                        let popped = self.open.pop();
                        self.namespaces.close_to(self.open.depth());
                        let popped_name = popped.map(|e| e.name).unwrap_or(element_name);

                        if buf.is_empty() {
                            self.node.reset(NodeType::EndElement);
                            self.node.name = popped_name;
                            self.node.depth = text_depth;
                            self.state = ReadState::Text;
                        } else {
                            self.node.reset(NodeType::CData);
                            self.node.value = strip_nested_cdata_wrappers(&buf);
                            self.node.depth = text_depth;
                            self.pending_cdata_end = Some((popped_name, text_depth));
                            self.state = ReadState::CData;
                        }
                        return Ok(true);
                    }
                    buf.push_str("</");
                    buf.push_str(&name);
                    continue;
                }
                buf.push('<');
                continue;
            }
            buf.push(c);
            self.adv();
        }

        self.cdata_element = None;
        self.state = ReadState::Eof;
        if buf.is_empty() {
            return Ok(false);
        }
        self.node.reset(NodeType::CData);
        self.node.value = strip_nested_cdata_wrappers(&buf);
        self.node.depth = self.open.depth();
        Ok(true)
    }
}

/// Strips nested `<![CDATA[`, `]]>` and `/**/` wrapper literals from CDATA
/// payloads, tolerating the doubly-wrapped `<script>//<![CDATA[ … //]]>`
/// convention common in hand-written HTML.
fn strip_nested_cdata_wrappers(raw: &str) -> String {
    raw.replace("<![CDATA[", "")
        .replace("]]>", "")
        .replace("/**/", "")
}

/// Splits a (possibly prefixed) name into `(prefix, local_name)`; `prefix`
/// is `""` when `name` carries none.
fn split_qname(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", name),
    }
}

/// Appends the current node's own markup (start/end tag, text, comment,
/// etc.) to `out` — used by `read_outer_xml`/`read_inner_xml` to rebuild a
/// subtree one node at a time without a second writer abstraction.
fn append_node_xml(out: &mut String, r: &SgmlReader<'_>) {
    match r.node_type() {
        NodeType::Element => {
            out.push('<');
            out.push_str(r.name());
            for attr in r.attrs() {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                escape_attr_into(&attr.value, out);
                out.push('"');
            }
            if r.is_empty_element() {
                out.push_str("/>");
            } else {
                out.push('>');
            }
        }
        NodeType::EndElement => {
            out.push_str("</");
            out.push_str(r.name());
            out.push('>');
        }
        NodeType::Text | NodeType::Whitespace => escape_text_into(r.value(), out),
        NodeType::CData => {
            out.push_str("<![CDATA[");
            out.push_str(r.value());
            out.push_str("]]>");
        }
        NodeType::Comment => {
            out.push_str("<!--");
            out.push_str(r.value());
            out.push_str("-->");
        }
        NodeType::ProcessingInstruction => {
            out.push_str("<?");
            out.push_str(r.name());
            out.push(' ');
            out.push_str(r.value());
            out.push_str("?>");
        }
        NodeType::DocumentType | NodeType::Eof => {}
    }
}

fn escape_text_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn escape_attr_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgml_entities::{FetchedBytes, NullLogger};
    use std::io;

    struct NullSource;
    impl ByteSource for NullSource {
        fn fetch(&self, _uri: &str) -> io::Result<FetchedBytes> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no fetch in test"))
        }
    }

    struct NoResources;
    impl ResourceLoader for NoResources {
        fn load(&self, name: &str) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, format!("no resource '{}'", name)))
        }
    }

    fn new_reader(text: &str, options: ReaderOptions) -> SgmlReader<'static> {
        let entry = Entity::internal("doc", text.to_string(), LiteralKind::None);
        SgmlReader::new(entry, &NullSource, &NoResources, &NullLogger, options).unwrap()
    }

    #[test]
    fn reads_a_simple_element_with_text() {
        let mut reader = new_reader("<p>hi</p>", ReaderOptions::default());
        assert!(reader.read().unwrap());
        assert_eq!(reader.node_type(), NodeType::Element);
        assert_eq!(reader.name(), "p");

        assert!(reader.read().unwrap());
        assert_eq!(reader.node_type(), NodeType::Text);
        assert_eq!(reader.value(), "hi");

        assert!(reader.read().unwrap());
        assert_eq!(reader.node_type(), NodeType::EndElement);
        assert_eq!(reader.name(), "p");

        assert!(!reader.read().unwrap());
    }

    #[test]
    fn comment_dashes_are_collapsed() {
        let mut reader = new_reader("<!-- a -- b -->", ReaderOptions::default());
        assert!(reader.read().unwrap());
        assert_eq!(reader.node_type(), NodeType::Comment);
        assert_eq!(reader.value(), " a - b ");
    }

    #[test]
    fn unquoted_and_boolean_attributes_are_read() {
        let mut reader = new_reader("<input disabled type=text>", ReaderOptions::default());
        assert!(reader.read().unwrap());
        let disabled = reader.attrs().iter().find(|a| a.name == "disabled").unwrap();
        assert_eq!(disabled.value, "disabled");
        assert_eq!(disabled.quote, '\0');
        let ty = reader.attrs().iter().find(|a| a.name == "type").unwrap();
        assert_eq!(ty.value, "text");
    }

    #[test]
    fn duplicate_attribute_is_dropped() {
        let mut reader = new_reader(r#"<a id="x" id="y">"#, ReaderOptions::default());
        assert!(reader.read().unwrap());
        assert_eq!(reader.attrs().len(), 1);
        assert_eq!(reader.attrs()[0].value, "x");
    }

    #[test]
    fn empty_element_via_self_close() {
        let mut reader = new_reader("<br/>", ReaderOptions::default());
        assert!(reader.read().unwrap());
        assert!(reader.is_empty_element());
    }
}
