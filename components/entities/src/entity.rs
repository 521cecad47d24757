use std::fmt;

use sgml_chars::XmlAsciiChar;
use sgml_encoding::{detect_bom, decode_ucs4, resolve_label, sniff_html_meta, sniff_xml_decl};

use crate::win1252;
use crate::{ByteSource, EntityError};

/// Sentinel returned by [`Entity::read_char`] at end of stream. `char`
/// cannot hold `u+FFFF` as a real XML character (it is a noncharacter), so
/// it is safe to reuse as the EOF marker the way the original C reads `-1`
/// into a wider-than-byte integer.
pub const EOF: char = '\u{FFFF}';

/// Why an internal entity's replacement text should be treated: SGML's
/// `CDATA`/`SDATA`/`PI` declared-value keywords, or "ordinary" (none given).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LiteralKind {
    None,
    CData,
    SData,
    Pi,
}

enum Source {
    /// `<!ENTITY name "literal">` or a parameter entity's replacement text.
    Literal { value: String, kind: LiteralKind },
    /// `<!ENTITY name PUBLIC "pubid" "uri">` / `SYSTEM "uri"`.
    External { public_id: Option<String>, uri: String },
    /// Text handed to the reader directly by the host (e.g. `input_stream`),
    /// already decoded into characters.
    Preloaded { text: String, uri: String },
}

/// A single character source: one frame of the entity stack (C2/C3).
pub struct Entity {
    name: String,
    source: Source,
    resolved_uri: Option<String>,
    is_internal: bool,
    is_html: bool,
    encoding: Option<String>,
    proxy: Option<String>,

    text: Vec<char>,
    pos: usize,
    last_char: char,
    line: u32,
    line_start_offset: usize,
    opened: bool,
    closed: bool,
}

impl Entity {
    pub fn internal(name: impl Into<String>, value: impl Into<String>, kind: LiteralKind) -> Self {
        Self::new(
            name.into(),
            Source::Literal {
                value: value.into(),
                kind,
            },
            true,
        )
    }

    pub fn external(
        name: impl Into<String>,
        public_id: Option<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self::new(
            name.into(),
            Source::External {
                public_id,
                uri: uri.into(),
            },
            false,
        )
    }

    pub fn preloaded(name: impl Into<String>, text: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::new(
            name.into(),
            Source::Preloaded {
                text: text.into(),
                uri: uri.into(),
            },
            false,
        )
    }

    fn new(name: String, source: Source, is_internal: bool) -> Self {
        Self {
            name,
            source,
            resolved_uri: None,
            is_internal,
            is_html: false,
            encoding: None,
            proxy: None,
            text: Vec::new(),
            pos: 0,
            last_char: EOF,
            line: 1,
            line_start_offset: 0,
            opened: false,
            closed: false,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_html(&self) -> bool {
        self.is_html
    }

    pub fn set_is_html(&mut self, is_html: bool) {
        self.is_html = is_html;
    }

    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    pub fn resolved_uri(&self) -> Option<&str> {
        self.resolved_uri.as_deref()
    }

    /// The encoding name this entity was actually decoded with (e.g.
    /// `"UTF-8"`, `"windows-1252"`), set once `open` has run. `None` for an
    /// internal/preloaded entity, which is already decoded characters.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn literal_kind(&self) -> LiteralKind {
        match &self.source {
            Source::Literal { kind, .. } => *kind,
            _ => LiteralKind::None,
        }
    }

    pub fn last_char(&self) -> char {
        self.last_char
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> usize {
        self.pos.saturating_sub(self.line_start_offset)
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Opens the entity exactly once: resolves the URI, opens the byte
    /// stream, detects the encoding, and primes `last_char` with the first
    /// character — per §4.2's open semantics.
    pub fn open(
        &mut self,
        byte_source: &dyn ByteSource,
        default_encoding: Option<&str>,
        parent_is_html: bool,
    ) -> Result<(), EntityError> {
        if self.opened {
            return Ok(());
        }
        self.is_html = self.is_html || parent_is_html;

        match &self.source {
            Source::Literal { value, .. } => {
                self.text = value.chars().collect();
            }
            Source::Preloaded { text, uri } => {
                self.text = text.chars().collect();
                self.resolved_uri = Some(uri.clone());
            }
            Source::External { uri, .. } => {
                let fetched = byte_source
                    .fetch(uri)
                    .map_err(|e| EntityError::Io(uri.clone(), e.to_string()))?;
                let decoded = decode_document(&fetched.bytes, default_encoding)?;
                self.text = decoded.text.chars().collect();
                self.encoding = Some(decoded.encoding_name);
                self.resolved_uri = Some(fetched.resolved_uri);
                if fetched.content_type.as_deref() == Some("text/html") {
                    self.is_html = true;
                }
            }
        }

        self.opened = true;
        self.pos = 0;
        self.line = 1;
        self.line_start_offset = 0;
        self.last_char = self.raw_next();
        log::trace!(
            "opened entity '{}' ({} chars, html={})",
            self.name,
            self.text.len(),
            self.is_html
        );
        Ok(())
    }

    /// Closes the entity exactly once; safe to call redundantly (e.g. from
    /// `Drop`) since a scoped acquisition pattern must guarantee close on
    /// every exit path, including parse errors.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.text = Vec::new();
    }

    fn raw_next(&mut self) -> char {
        if self.pos >= self.text.len() {
            EOF
        } else {
            let c = self.text[self.pos];
            self.pos += 1;
            c
        }
    }

    /// Reads one character, normalizing embedded NUL to space and updating
    /// line/column. `CR LF` is counted as a single line break.
    pub fn read_char(&mut self) -> char {
        let mut ch = self.raw_next();
        if ch == '\u{0}' {
            ch = ' ';
        }

        if self.last_char == '\r' {
            self.line += 1;
            self.line_start_offset = self.pos;
            if ch == '\n' {
                ch = self.raw_next();
                if ch == '\u{0}' {
                    ch = ' ';
                }
            }
        } else if ch == '\n' {
            self.line += 1;
            self.line_start_offset = self.pos;
        }

        self.last_char = ch;
        ch
    }

    pub fn skip_whitespace(&mut self) -> char {
        while self.last_char.is_xml_whitespace() {
            self.read_char();
        }
        self.last_char
    }

    /// Reads into a fresh buffer until `last_char` lies in `term`. When
    /// `nmtoken` is set, the first character must be `_` or a letter and
    /// every character must be a valid NMTOKEN constituent.
    pub fn scan_token(&mut self, term: &str, nmtoken: bool) -> Result<String, EntityError> {
        if nmtoken {
            let c = self.last_char;
            if !(c == '_' || c.is_alphabetic()) {
                return Err(EntityError::InvalidNameStart(c));
            }
        }

        let mut buf = String::new();
        loop {
            let c = self.last_char;
            if c == EOF {
                return Err(EntityError::UnexpectedEof);
            }
            if term.contains(c) {
                break;
            }
            if nmtoken && !(c == '_' || c == '.' || c == '-' || c == ':' || c.is_alphanumeric()) {
                return Err(EntityError::InvalidNameChar(c));
            }
            buf.push(c);
            self.read_char();
        }
        Ok(buf)
    }

    /// Reads until the matching `quote`, expanding numeric character
    /// references in place, then consumes the closing quote. Assumes
    /// `last_char` is already positioned at the first content character
    /// (the caller has consumed the opening quote).
    pub fn scan_literal(&mut self, quote: char, html_mode: bool) -> Result<String, EntityError> {
        let mut buf = String::new();
        loop {
            let c = self.last_char;
            if c == quote {
                self.read_char();
                break;
            }
            if c == EOF {
                return Err(EntityError::UnexpectedEof);
            }
            if c == '&' {
                if let Some(expanded) = self.try_expand_char_entity(html_mode)? {
                    buf.push_str(&expanded);
                    continue;
                }
            }
            buf.push(c);
            self.read_char();
        }
        Ok(buf)
    }

    /// Reads until the literal multi-character `terminator` is matched.
    /// Buffering the whole entity up front (§3's design note) makes the
    /// "KMP-like fallback" from §4.2 unnecessary: a mismatched partial match
    /// is already sitting in `buf`, so checking `buf.ends_with(terminator)`
    /// after every character is correct without any extra bookkeeping.
    pub fn scan_to_end(&mut self, label: &str, terminator: &str) -> Result<String, EntityError> {
        let mut buf = String::new();
        loop {
            let c = self.last_char;
            if c == EOF {
                return Err(EntityError::UnterminatedConstruct(label.to_string()));
            }
            buf.push(c);
            self.read_char();
            if buf.ends_with(terminator) {
                buf.truncate(buf.len() - terminator.len());
                return Ok(buf);
            }
        }
    }

    /// Parses `&#NNN;` or `&#xHHHH;` starting at `last_char == '&'` and
    /// returns the expanded character, remapping `0x80..=0x9F` through the
    /// Windows-1252 table in HTML mode. Returns `Ok(None)` without
    /// consuming anything if `&` is not followed by `#` (a named entity
    /// reference, which this primitive does not resolve).
    pub fn try_expand_char_entity(&mut self, html_mode: bool) -> Result<Option<String>, EntityError> {
        debug_assert_eq!(self.last_char, '&');
        let save_pos = self.pos;
        let save_last = self.last_char;
        let save_line = self.line;
        let save_line_start = self.line_start_offset;

        self.read_char(); // consume '&'
        if self.last_char != '#' {
            self.pos = save_pos;
            self.last_char = save_last;
            self.line = save_line;
            self.line_start_offset = save_line_start;
            return Ok(None);
        }
        self.read_char(); // consume '#'

        let hex = self.last_char == 'x' || self.last_char == 'X';
        if hex {
            self.read_char();
        }

        let mut digits = String::new();
        while self.last_char != ';' {
            if self.last_char == EOF {
                return Err(EntityError::UnexpectedEof);
            }
            digits.push(self.last_char);
            self.read_char();
        }
        self.read_char(); // consume ';'

        let code = if hex {
            u32::from_str_radix(&digits, 16)
                .map_err(|_| EntityError::InvalidCharacterReference(digits.clone()))?
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| EntityError::InvalidCharacterReference(digits.clone()))?
        };

        let code = if html_mode { win1252::remap(code) } else { code };
        let c = char::from_u32(code)
            .ok_or_else(|| EntityError::InvalidCharacterReference(digits.clone()))?;
        Ok(Some(c.to_string()))
    }

    /// Human-readable "file:line:col" style frame used by [`crate::EntityStack::context`].
    pub fn context_line(&self) -> String {
        format!(
            "{} (line {}, col {}){}",
            self.resolved_uri.as_deref().unwrap_or(&self.name),
            self.line,
            self.column(),
            if self.name.is_empty() {
                String::new()
            } else {
                format!(" [entity: {}]", self.name)
            }
        )
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("line", &self.line)
            .field("is_html", &self.is_html)
            .field("is_internal", &self.is_internal)
            .finish()
    }
}

struct DecodedDocument {
    text: String,
    encoding_name: String,
}

/// Implements §4.1's BOM/XML-decl/HTML-meta sniffing cascade. Non-seekable
/// inputs are buffered into memory on open (per the spec), so a
/// sniff-then-restart just means decoding twice against the same byte
/// buffer rather than physically rewinding a stream.
fn decode_document(bytes: &[u8], default_encoding: Option<&str>) -> Result<DecodedDocument, EntityError> {
    if let Some((detected, consumed)) = detect_bom(bytes) {
        let rest = &bytes[consumed..];
        let text = match detected {
            sgml_encoding::DetectedEncoding::Ucs4(variant) => decode_ucs4(rest, variant)
                .map_err(|e| EntityError::Encoding(e.to_string()))?,
            sgml_encoding::DetectedEncoding::Registered(enc) => {
                let (cow, _, _) = enc.decode(rest);
                cow.into_owned()
            }
        };
        return Ok(DecodedDocument {
            text,
            encoding_name: detected.name().to_string(),
        });
    }

    let default = default_encoding.unwrap_or("UTF-8");
    let default_enc =
        resolve_label(default).map_err(|e| EntityError::Encoding(e.to_string()))?;
    let (tentative, _, _) = default_enc.decode(bytes);

    let sniffed_label = sniff_xml_decl(&tentative).or_else(|| sniff_html_meta(&tentative));
    match sniffed_label {
        Some(label) => {
            let enc = resolve_label(&label).map_err(|e| EntityError::Encoding(e.to_string()))?;
            let (text, _, _) = enc.decode(bytes);
            Ok(DecodedDocument {
                text: text.into_owned(),
                encoding_name: enc.name().to_string(),
            })
        }
        None => Ok(DecodedDocument {
            text: tentative.into_owned(),
            encoding_name: default_enc.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteSource, FetchedBytes};
    use std::io;

    struct NullSource;
    impl ByteSource for NullSource {
        fn fetch(&self, _uri: &str) -> io::Result<FetchedBytes> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no fetch in test"))
        }
    }

    fn opened_internal(text: &str) -> Entity {
        let mut e = Entity::internal("x", text, LiteralKind::None);
        e.open(&NullSource, None, false).unwrap();
        e
    }

    #[test]
    fn read_char_basic() {
        let mut e = opened_internal("ab");
        assert_eq!(e.last_char(), 'a');
        assert_eq!(e.read_char(), 'b');
        assert_eq!(e.read_char(), EOF);
    }

    #[test]
    fn nul_normalized_to_space() {
        let mut e = opened_internal("a\u{0}b");
        assert_eq!(e.last_char(), 'a');
        assert_eq!(e.read_char(), ' ');
        assert_eq!(e.read_char(), 'b');
    }

    #[test]
    fn crlf_counts_as_one_line() {
        let mut e = opened_internal("a\r\nb");
        assert_eq!(e.line(), 1);
        e.read_char(); // '\r'
        assert_eq!(e.line(), 1);
        e.read_char(); // consumes the paired '\n', becomes 'b'
        assert_eq!(e.last_char(), 'b');
        assert_eq!(e.line(), 2);
    }

    #[test]
    fn lone_cr_breaks_line() {
        let mut e = opened_internal("a\rb");
        e.read_char(); // '\r'
        let c = e.read_char();
        assert_eq!(c, 'b');
        assert_eq!(e.line(), 2);
    }

    #[test]
    fn skip_whitespace() {
        let mut e = opened_internal("   x");
        assert_eq!(e.skip_whitespace(), 'x');
    }

    #[test]
    fn scan_token_nmtoken() {
        let mut e = opened_internal("foo-bar:baz=");
        let tok = e.scan_token("=", true).unwrap();
        assert_eq!(tok, "foo-bar:baz");
    }

    #[test]
    fn scan_token_rejects_bad_start() {
        let mut e = opened_internal("1abc=");
        assert!(matches!(
            e.scan_token("=", true),
            Err(EntityError::InvalidNameStart('1'))
        ));
    }

    #[test]
    fn scan_literal_expands_numeric_refs() {
        let mut e = opened_internal("A&#66;&#x43;\"");
        let value = e.scan_literal('"', false).unwrap();
        assert_eq!(value, "ABC");
    }

    #[test]
    fn scan_literal_html_remap() {
        let mut e = opened_internal("&#x80;\"");
        let value = e.scan_literal('"', true).unwrap();
        assert_eq!(value, "\u{20AC}");
    }

    #[test]
    fn scan_to_end_matches_terminator() {
        let mut e = opened_internal(" B+, B, or B---->rest");
        let comment = e.scan_to_end("comment", "-->").unwrap();
        assert_eq!(comment, " B+, B, or B--");
        assert_eq!(e.last_char(), 'r');
    }

    #[test]
    fn scan_literal_leaves_named_refs_untouched() {
        let mut e = opened_internal("&amp;\"");
        let value = e.scan_literal('"', false).unwrap();
        assert_eq!(value, "&amp;");
    }

    #[test]
    fn scan_to_end_unterminated_is_error() {
        let mut e = opened_internal("no terminator here");
        assert!(matches!(
            e.scan_to_end("x", "-->"),
            Err(EntityError::UnterminatedConstruct(_))
        ));
    }
}
