//! C5: recursive-descent parse of SGML DTD text into the element,
//! attribute and entity tables of a [`Dtd`].

use sgml_chars::XmlAsciiChar;
use sgml_entities::{ByteSource, Entity, EntityStack, LiteralKind, Logger};

use crate::attdef::{AttDef, AttType, Presence};
use crate::dtd::{Dtd, EntityValue};
use crate::element::{ElementDecl, TagOmission};
use crate::error::{DtdError, DtdErrorReason, DtdResult};
use crate::model::{ContentModel, DeclaredContent, GroupType, Member, Occurrence};

const NGTERM: &str = " \r\n\t|,)";
const DCTERM: &str = " \r\n\t>";
const PETERM: &str = " \t\r\n>";

pub struct DtdParser<'a> {
    stack: EntityStack,
    byte_source: &'a dyn ByteSource,
    logger: &'a dyn Logger,
}

impl<'a> DtdParser<'a> {
    pub fn new(entry: Entity, byte_source: &'a dyn ByteSource, logger: &'a dyn Logger) -> DtdResult<Self> {
        let mut stack = EntityStack::new();
        stack
            .push_entity(entry, byte_source, None)
            .map_err(|e| DtdError::new(DtdErrorReason::Entity(e), String::new()))?;
        Ok(Self {
            stack,
            byte_source,
            logger,
        })
    }

    fn err(&self, reason: DtdErrorReason) -> DtdError {
        DtdError::new(reason, self.stack.context())
    }

    /// Current character, transparently popping entity frames pushed for
    /// parameter-entity expansion once exhausted — the innermost frame is
    /// never popped here, since hitting EOF on the outermost entity is the
    /// main loop's own termination signal (§4.3).
    fn peek(&mut self) -> char {
        loop {
            let c = self.stack.last_char();
            if c != sgml_entities::EOF || self.stack.depth() <= 1 {
                return c;
            }
            self.stack.pop_entity();
        }
    }

    fn bump(&mut self) -> char {
        self.stack.read_char();
        self.peek()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_xml_whitespace() {
            self.bump();
        }
    }

    /// Expands every parameter entity reference sitting at the cursor.
    /// Called at every point the grammar allows one: §4.3 — "the parser
    /// supports a parameter entity reference appearing anywhere a name,
    /// name group, or model fragment is expected".
    fn expand_pe(&mut self, dtd: &Dtd) -> DtdResult<()> {
        while self.peek() == '%' {
            self.bump(); // consume '%'
            let name = self.scan_name_chars()?;
            if self.peek() != ';' {
                return Err(self.err(DtdErrorReason::UnexpectedMarkup(self.peek())));
            }
            self.bump(); // consume ';'

            let value = dtd
                .parameter_entity(&name)
                .cloned()
                .ok_or_else(|| self.err(DtdErrorReason::UndeclaredParameterEntity(name.clone())))?;
            let entity = match value {
                EntityValue::Literal(text) => Entity::internal(name, text, LiteralKind::None),
                EntityValue::Typed(kind, text) => Entity::internal(name, text, kind),
                EntityValue::External { .. } => {
                    return Err(self.err(DtdErrorReason::ExternalParameterEntity(name)));
                }
            };
            self.stack
                .push_entity(entity, self.byte_source, None)
                .map_err(|e| self.err(DtdErrorReason::Entity(e)))?;
        }
        Ok(())
    }

    /// Scans a bare run of NMTOKEN-constituent characters. Used for names,
    /// keywords and declared-content tokens alike — the effective stopping
    /// rule is the same whichever terminator set (`Ngterm`/`Cmterm`/
    /// `Dcterm`/`Peterm`) the surrounding grammar names, since none of them
    /// include a character that is itself valid inside a name.
    fn scan_name_chars(&mut self) -> DtdResult<String> {
        let start = self.peek();
        if !(start == '_' || start.is_alphabetic()) {
            return Err(self.err(DtdErrorReason::UnexpectedMarkup(start)));
        }
        let mut buf = String::new();
        loop {
            let c = self.peek();
            if c == '_' || c == '.' || c == '-' || c == ':' || c.is_alphanumeric() {
                buf.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(buf)
    }

    fn scan_name(&mut self, dtd: &Dtd) -> DtdResult<String> {
        self.expand_pe(dtd)?;
        self.scan_name_chars()
    }

    /// Consumes the opening quote at the cursor and returns the literal
    /// body, with numeric character references expanded by the entity
    /// frame the literal started in (parameter-entity expansion is not
    /// recognized inside quoted literals, matching the grammar which only
    /// allows `%name;` where a name/model fragment is expected).
    fn scan_literal(&mut self) -> DtdResult<String> {
        let quote = self.peek();
        if quote != '"' && quote != '\'' {
            return Err(self.err(DtdErrorReason::UnexpectedMarkup(quote)));
        }
        self.stack.read_char();
        self.stack
            .scan_literal(quote, false)
            .map_err(|e| self.err(DtdErrorReason::Entity(e)))
    }

    /// Runs the DTD parser's main loop (§4.3) to completion, adding every
    /// declaration it encounters to `dtd`.
    pub fn parse(&mut self, dtd: &mut Dtd) -> DtdResult<()> {
        loop {
            let c = self.stack.last_char();
            if c == sgml_entities::EOF {
                self.stack.pop_entity();
                if self.stack.is_empty() {
                    return Ok(());
                }
                continue;
            }
            if c.is_xml_whitespace() {
                self.stack.skip_whitespace();
                continue;
            }
            if c == '<' {
                self.parse_markup(dtd)?;
                continue;
            }
            if c == '%' {
                self.expand_pe(dtd)?;
                continue;
            }
            return Err(self.err(DtdErrorReason::UnexpectedMarkup(c)));
        }
    }

    fn parse_markup(&mut self, dtd: &mut Dtd) -> DtdResult<()> {
        self.bump(); // consume '<'
        if self.peek() != '!' {
            return Err(self.err(DtdErrorReason::UnexpectedMarkup(self.peek())));
        }
        self.bump(); // consume '!'

        match self.peek() {
            '-' => {
                self.bump();
                if self.peek() != '-' {
                    return Err(self.err(DtdErrorReason::UnexpectedMarkup(self.peek())));
                }
                self.bump();
                self.stack
                    .scan_to_end("comment", "-->")
                    .map_err(|e| self.err(DtdErrorReason::Entity(e)))?;
                Ok(())
            }
            '[' => self.parse_marked_section(dtd),
            _ => {
                self.skip_ws();
                let keyword = self.scan_name_chars()?.to_ascii_uppercase();
                self.skip_ws();
                match keyword.as_str() {
                    "ENTITY" => self.parse_entity_decl(dtd),
                    "ELEMENT" => self.parse_element_decl(dtd),
                    "ATTLIST" => self.parse_attlist_decl(dtd),
                    _ => Err(self.err(DtdErrorReason::ExpectedKeyword(
                        "ENTITY, ELEMENT or ATTLIST",
                    ))),
                }
            }
        }
    }

    fn parse_marked_section(&mut self, _dtd: &Dtd) -> DtdResult<()> {
        self.bump(); // consume '['
        self.skip_ws();
        let keyword = self.scan_name_chars()?.to_ascii_uppercase();
        self.skip_ws();
        if self.peek() != '[' {
            return Err(self.err(DtdErrorReason::UnexpectedMarkup(self.peek())));
        }
        self.bump(); // consume the section's '['

        match keyword.as_str() {
            "IGNORE" => {
                self.stack
                    .scan_to_end("marked section", "]]>")
                    .map_err(|e| self.err(DtdErrorReason::Entity(e)))?;
                Ok(())
            }
            "INCLUDE" => {
                log::debug!("rejecting unsupported INCLUDE marked section");
                Err(self.err(DtdErrorReason::UnsupportedMarkedSection(keyword)))
            }
            other => {
                log::debug!("rejecting unsupported marked section keyword '{}'", other);
                Err(self.err(DtdErrorReason::UnsupportedMarkedSection(other.to_string())))
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> DtdResult<()> {
        if self.peek() != expected {
            return Err(self.err(DtdErrorReason::UnexpectedMarkup(self.peek())));
        }
        self.bump();
        Ok(())
    }

    // ---- <!ENTITY …> -----------------------------------------------------

    fn parse_entity_decl(&mut self, dtd: &mut Dtd) -> DtdResult<()> {
        let is_parameter = self.peek() == '%';
        if is_parameter {
            self.bump();
            self.skip_ws();
        }

        let name = self.scan_name(dtd)?;
        self.skip_ws();
        let value = self.parse_entity_value(dtd)?;
        self.skip_ws();
        self.expect_char('>')?;

        if is_parameter {
            dtd.declare_parameter_entity(name, value);
        } else {
            dtd.declare_general_entity(name, value);
        }
        Ok(())
    }

    fn parse_entity_value(&mut self, dtd: &Dtd) -> DtdResult<EntityValue> {
        let c = self.peek();
        if c == '"' || c == '\'' {
            return Ok(EntityValue::Literal(self.scan_literal()?));
        }

        let keyword = self.scan_name(dtd)?.to_ascii_uppercase();
        self.skip_ws();
        match keyword.as_str() {
            "CDATA" => Ok(EntityValue::Typed(LiteralKind::CData, self.scan_literal()?)),
            "SDATA" => Ok(EntityValue::Typed(LiteralKind::SData, self.scan_literal()?)),
            "PI" => Ok(EntityValue::Typed(LiteralKind::Pi, self.scan_literal()?)),
            "PUBLIC" => {
                let public_id = self.scan_literal()?;
                self.skip_ws();
                let system_id = self.scan_literal()?;
                Ok(EntityValue::External {
                    public_id: Some(public_id),
                    system_id,
                })
            }
            "SYSTEM" => {
                let system_id = self.scan_literal()?;
                Ok(EntityValue::External {
                    public_id: None,
                    system_id,
                })
            }
            _ => Err(self.err(DtdErrorReason::ExpectedKeyword(
                "CDATA, SDATA, PI, PUBLIC or SYSTEM",
            ))),
        }
    }

    // ---- <!ELEMENT …> -----------------------------------------------------

    fn parse_element_decl(&mut self, dtd: &mut Dtd) -> DtdResult<()> {
        let names = self.parse_name_group_or_name(dtd)?;
        self.skip_ws();

        let start_tag = self.parse_tag_omission()?;
        self.skip_ws();
        let end_tag = self.parse_tag_omission()?;
        self.skip_ws();

        let model = self.parse_content_spec(dtd)?;
        self.skip_ws();

        let (exclusions, inclusions) = self.parse_exceptions(dtd)?;
        self.skip_ws();
        self.expect_char('>')?;

        for name in names {
            log::debug!("declaring element '{}'", name);
            let mut decl = ElementDecl::new(name, start_tag, end_tag, model.clone());
            decl.exclusions = exclusions.clone();
            decl.inclusions = inclusions.clone();
            dtd.declare_element(decl);
        }
        Ok(())
    }

    fn parse_tag_omission(&mut self) -> DtdResult<TagOmission> {
        match self.peek() {
            '-' => {
                self.bump();
                Ok(TagOmission::Required)
            }
            'O' | 'o' => {
                self.bump();
                Ok(TagOmission::Omissible)
            }
            c => Err(self.err(DtdErrorReason::UnexpectedMarkup(c))),
        }
    }

    /// `names` ::= name | "(" name ("|" name)* ")"
    fn parse_name_group_or_name(&mut self, dtd: &Dtd) -> DtdResult<Vec<String>> {
        self.expand_pe(dtd)?;
        if self.peek() == '(' {
            self.bump();
            let mut names = Vec::new();
            loop {
                self.skip_ws();
                self.expand_pe(dtd)?;
                names.push(self.scan_name_chars()?.to_ascii_uppercase());
                self.skip_ws();
                match self.peek() {
                    '|' | ',' => {
                        self.bump();
                    }
                    ')' => {
                        self.bump();
                        break;
                    }
                    c => return Err(self.err(DtdErrorReason::UnexpectedMarkup(c))),
                }
            }
            Ok(names)
        } else {
            Ok(vec![self.scan_name_chars()?.to_ascii_uppercase()])
        }
    }

    fn parse_content_spec(&mut self, dtd: &Dtd) -> DtdResult<ContentModel> {
        self.expand_pe(dtd)?;
        if self.peek() == '(' {
            let mut model = ContentModel::with_root_group();
            let root = model.root().unwrap();
            self.parse_group_body(dtd, &mut model, root)?;
            if let Some(occ) = self.parse_occurrence() {
                model.group_mut(root).occurrence = occ;
            }
            return Ok(model);
        }

        let keyword = self.scan_name_chars()?.to_ascii_uppercase();
        let declared = match keyword.as_str() {
            "CDATA" => DeclaredContent::Cdata,
            "RCDATA" => DeclaredContent::Rcdata,
            "EMPTY" => DeclaredContent::Empty,
            "ANY" => DeclaredContent::Any,
            _ => return Err(self.err(DtdErrorReason::ExpectedKeyword("CDATA, RCDATA, EMPTY or ANY"))),
        };
        Ok(ContentModel::declared(declared))
    }

    /// Parses the members of the group whose opening `(` has already been
    /// consumed by the caller when entered from a nested reference, or is
    /// consumed here when entered from the top. Closes on the matching `)`.
    /// §4.3's "a model group opened inside a pushed entity must also close
    /// inside that entity" is enforced by comparing the entity-stack depth
    /// at open and at close.
    fn parse_group_body(&mut self, dtd: &Dtd, model: &mut ContentModel, group: usize) -> DtdResult<()> {
        self.expect_char('(')?;
        let depth_at_open = self.stack.depth();

        loop {
            self.skip_ws();
            self.expand_pe(dtd)?;
            self.skip_ws();

            if self.peek() == '#' {
                self.bump();
                let word = self.scan_name_chars()?.to_ascii_uppercase();
                if word != "PCDATA" {
                    return Err(self.err(DtdErrorReason::ExpectedKeyword("#PCDATA")));
                }
                model.group_mut(group).mixed = true;
            } else if self.peek() == '(' {
                let child = model.new_group(Some(group));
                self.parse_group_body(dtd, model, child)?;
                if let Some(occ) = self.parse_occurrence() {
                    model.group_mut(child).occurrence = occ;
                }
                model.push_member(group, Member::Group(child));
            } else {
                let name = self.scan_name_chars()?.to_ascii_uppercase();
                model.push_member(group, Member::Name(name));
            }

            self.skip_ws();
            match self.peek() {
                ',' => {
                    model
                        .group_mut(group)
                        .set_connector(GroupType::Sequence)
                        .map_err(|_| self.err(DtdErrorReason::MixedConnectors))?;
                    self.bump();
                }
                '|' => {
                    model
                        .group_mut(group)
                        .set_connector(GroupType::Or)
                        .map_err(|_| self.err(DtdErrorReason::MixedConnectors))?;
                    self.bump();
                }
                '&' => {
                    model
                        .group_mut(group)
                        .set_connector(GroupType::And)
                        .map_err(|_| self.err(DtdErrorReason::MixedConnectors))?;
                    self.bump();
                }
                ')' => {
                    self.bump();
                    break;
                }
                c => return Err(self.err(DtdErrorReason::UnexpectedMarkup(c))),
            }
        }

        if model.group(group).members.is_empty() && !model.group(group).mixed {
            return Err(self.err(DtdErrorReason::EmptyModelGroup));
        }
        if self.stack.depth() != depth_at_open {
            return Err(self.err(DtdErrorReason::UnexpectedMarkup(')')));
        }
        Ok(())
    }

    fn parse_occurrence(&mut self) -> Option<Occurrence> {
        match self.peek() {
            '?' => {
                self.bump();
                Some(Occurrence::Optional)
            }
            '+' => {
                self.bump();
                Some(Occurrence::OneOrMore)
            }
            '*' => {
                self.bump();
                Some(Occurrence::ZeroOrMore)
            }
            _ => None,
        }
    }

    fn parse_exceptions(&mut self, dtd: &Dtd) -> DtdResult<(Vec<String>, Vec<String>)> {
        let mut exclusions = Vec::new();
        let mut inclusions = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                '-' => {
                    self.bump();
                    self.expect_char('(')?;
                    exclusions.extend(self.parse_name_list(dtd)?);
                }
                '+' => {
                    self.bump();
                    self.expect_char('(')?;
                    inclusions.extend(self.parse_name_list(dtd)?);
                }
                _ => break,
            }
        }
        Ok((exclusions, inclusions))
    }

    fn parse_name_list(&mut self, dtd: &Dtd) -> DtdResult<Vec<String>> {
        let mut names = Vec::new();
        loop {
            self.skip_ws();
            self.expand_pe(dtd)?;
            names.push(self.scan_name_chars()?.to_ascii_uppercase());
            self.skip_ws();
            match self.peek() {
                '|' => {
                    self.bump();
                }
                ')' => {
                    self.bump();
                    break;
                }
                c => return Err(self.err(DtdErrorReason::UnexpectedMarkup(c))),
            }
        }
        Ok(names)
    }

    // ---- <!ATTLIST …> -----------------------------------------------------

    fn parse_attlist_decl(&mut self, dtd: &mut Dtd) -> DtdResult<()> {
        let names = self.parse_name_group_or_name(dtd)?;
        for name in &names {
            if dtd.element(name).is_none() {
                return Err(self.err(DtdErrorReason::AttlistForUndeclaredElement(name.clone())));
            }
        }

        let mut attdefs = Vec::new();
        loop {
            self.skip_ws();
            self.expand_pe(dtd)?;
            if self.peek() == '>' {
                self.bump();
                break;
            }
            attdefs.push(self.parse_attdef(dtd)?);
        }

        for name in names {
            // `element()` is keyed by upper-cased name and was checked to
            // exist above; `or_insert` on `declare_element` never fires for
            // an already-declared element, so attdefs are merged in place.
            if let Some(existing) = dtd.element(&name) {
                let mut merged = existing.clone();
                for def in &attdefs {
                    if merged.find_attdef(&def.name).is_none() {
                        merged.attlist.push(def.clone());
                    } else {
                        self.logger
                            .warn(&format!("duplicate ATTLIST entry for '{}' on '{}'", def.name, name));
                    }
                }
                dtd.declare_element_overwrite(merged);
            }
        }
        Ok(())
    }

    fn parse_attdef(&mut self, dtd: &Dtd) -> DtdResult<AttDef> {
        let name = self.scan_name(dtd)?.to_ascii_uppercase();
        self.skip_ws();

        let (att_type, enum_values) = self.parse_att_type(dtd)?;
        self.skip_ws();

        let (presence, default_value) = self.parse_att_default(dtd)?;
        Ok(AttDef::new(name, att_type, enum_values, presence, default_value))
    }

    fn parse_att_type(&mut self, dtd: &Dtd) -> DtdResult<(AttType, Vec<String>)> {
        self.expand_pe(dtd)?;
        if self.peek() == '(' {
            self.bump();
            let values = self.parse_name_list(dtd)?;
            return Ok((AttType::Enumeration, values));
        }

        let keyword = self.scan_name_chars()?.to_ascii_uppercase();
        if keyword == "NOTATION" {
            self.skip_ws();
            self.expect_char('(')?;
            let values = self.parse_name_list(dtd)?;
            return Ok((AttType::Notation, values));
        }

        let ty = AttType::from_keyword(&keyword)
            .ok_or_else(|| self.err(DtdErrorReason::UnknownAttributeType(keyword)))?;
        Ok((ty, Vec::new()))
    }

    fn parse_att_default(&mut self, dtd: &Dtd) -> DtdResult<(Presence, Option<String>)> {
        self.expand_pe(dtd)?;
        if self.peek() == '#' {
            self.bump();
            let keyword = self.scan_name_chars()?.to_ascii_uppercase();
            return match keyword.as_str() {
                "REQUIRED" => Ok((Presence::Required, None)),
                "IMPLIED" => Ok((Presence::Implied, None)),
                "CURRENT" => Ok((Presence::Current, None)),
                "CONREF" => Ok((Presence::Conref, None)),
                "FIXED" => {
                    self.skip_ws();
                    let value = self.parse_att_value(dtd)?;
                    Ok((Presence::Fixed, Some(value)))
                }
                _ => Err(self.err(DtdErrorReason::ExpectedKeyword(
                    "#REQUIRED, #IMPLIED, #FIXED, #CURRENT or #CONREF",
                ))),
            };
        }

        let value = self.parse_att_value(dtd)?;
        Ok((Presence::Default, Some(value)))
    }

    fn parse_att_value(&mut self, dtd: &Dtd) -> DtdResult<String> {
        self.expand_pe(dtd)?;
        if self.peek() == '"' || self.peek() == '\'' {
            self.scan_literal()
        } else {
            self.scan_name(dtd)
        }
    }

    pub fn into_context(self) -> String {
        self.stack.context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgml_entities::NullLogger;
    use std::io;

    struct NullSource;
    impl ByteSource for NullSource {
        fn fetch(&self, _uri: &str) -> io::Result<sgml_entities::FetchedBytes> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no fetch in test"))
        }
    }

    fn parse_fragment(text: &str) -> DtdResult<Dtd> {
        let entry = Entity::internal("doctype", text, LiteralKind::None);
        let mut parser = DtdParser::new(entry, &NullSource, &NullLogger)?;
        let mut dtd = Dtd::new("TEST".to_string());
        parser.parse(&mut dtd)?;
        Ok(dtd)
    }

    #[test]
    fn parses_simple_element_and_attlist() {
        let dtd = parse_fragment(
            r#"<!ELEMENT BR - O EMPTY>
               <!ELEMENT P - O (#PCDATA|B|I)*>
               <!ATTLIST P id ID #IMPLIED class CDATA #IMPLIED>"#,
        )
        .unwrap();

        let br = dtd.element("br").unwrap();
        assert!(!br.can_contain("B"));

        let p = dtd.element("P").unwrap();
        assert!(p.can_contain("B"));
        assert!(p.content_model.is_mixed());
        assert_eq!(p.attlist.len(), 2);
        assert_eq!(p.find_attdef("ID").unwrap().att_type, AttType::Id);
    }

    #[test]
    fn parses_general_and_parameter_entities() {
        let dtd = parse_fragment(
            r#"<!ENTITY amp CDATA "&#38;">
               <!ENTITY % coreattrs "id CDATA #IMPLIED">
               <!ELEMENT HR - O EMPTY>
               <!ATTLIST HR %coreattrs;>"#,
        )
        .unwrap();

        assert_eq!(
            dtd.general_entity("amp"),
            Some(&EntityValue::Typed(LiteralKind::CData, "&#38;".to_string()))
        );
        let hr = dtd.element("HR").unwrap();
        assert!(hr.find_attdef("id").is_some());
    }

    #[test]
    fn attlist_for_undeclared_element_is_an_error() {
        let result = parse_fragment(r#"<!ATTLIST FOO id ID #IMPLIED>"#);
        assert!(matches!(
            result,
            Err(DtdError {
                reason: DtdErrorReason::AttlistForUndeclaredElement(_),
                ..
            })
        ));
    }

    #[test]
    fn ignore_marked_section_is_discarded() {
        let dtd = parse_fragment(
            r#"<![IGNORE[ <!ELEMENT FOO - O EMPTY> ]]>
               <!ELEMENT BAR - O EMPTY>"#,
        )
        .unwrap();
        assert!(dtd.element("FOO").is_none());
        assert!(dtd.element("BAR").is_some());
    }

    #[test]
    fn include_marked_section_is_unsupported() {
        let result = parse_fragment(r#"<![INCLUDE[ <!ELEMENT FOO - O EMPTY> ]]>"#);
        assert!(matches!(
            result,
            Err(DtdError {
                reason: DtdErrorReason::UnsupportedMarkedSection(_),
                ..
            })
        ));
    }

    #[test]
    fn external_parameter_entity_reference_is_fatal() {
        let result = parse_fragment(
            r#"<!ENTITY % ext SYSTEM "other.dtd">
               <!ELEMENT FOO - O (%ext;)>"#,
        );
        assert!(matches!(
            result,
            Err(DtdError {
                reason: DtdErrorReason::ExternalParameterEntity(_),
                ..
            })
        ));
    }
}
