//! C5's output tables: declared elements and entities.

use std::collections::HashMap;

use sgml_entities::LiteralKind;

use crate::element::ElementDecl;

/// The right-hand side of an `<!ENTITY …>` declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    Literal(String),
    Typed(LiteralKind, String),
    External {
        public_id: Option<String>,
        system_id: String,
    },
}

/// Tables produced by parsing one DTD: element declarations keyed by
/// upper-cased name, general entities keyed by verbatim name, parameter
/// entities keyed by verbatim name.
#[derive(Debug, Clone, Default)]
pub struct Dtd {
    pub name: String,
    elements: HashMap<String, ElementDecl>,
    general_entities: HashMap<String, EntityValue>,
    parameter_entities: HashMap<String, EntityValue>,
}

impl Dtd {
    pub fn new(name: String) -> Self {
        Self {
            name,
            elements: HashMap::new(),
            general_entities: HashMap::new(),
            parameter_entities: HashMap::new(),
        }
    }

    pub fn element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.get(&name.to_ascii_uppercase())
    }

    /// First-writer-wins: a redeclaration of an already-declared element is
    /// silently ignored, matching standard SGML dictionary semantics.
    pub fn declare_element(&mut self, decl: ElementDecl) {
        let key = decl.name.to_ascii_uppercase();
        self.elements.entry(key).or_insert(decl);
    }

    /// Unlike `declare_element`, replaces any existing entry outright.
    /// Used by ATTLIST processing to merge freshly-parsed attribute
    /// definitions into an element already declared by an ELEMENT decl.
    pub fn declare_element_overwrite(&mut self, decl: ElementDecl) {
        let key = decl.name.to_ascii_uppercase();
        self.elements.insert(key, decl);
    }

    pub fn general_entity(&self, name: &str) -> Option<&EntityValue> {
        self.general_entities.get(name)
    }

    pub fn declare_general_entity(&mut self, name: String, value: EntityValue) {
        self.general_entities.entry(name).or_insert(value);
    }

    pub fn parameter_entity(&self, name: &str) -> Option<&EntityValue> {
        self.parameter_entities.get(name)
    }

    pub fn declare_parameter_entity(&mut self, name: String, value: EntityValue) {
        self.parameter_entities.entry(name).or_insert(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::TagOmission;
    use crate::model::ContentModel;

    #[test]
    fn first_writer_wins_on_redeclaration() {
        let mut dtd = Dtd::new("HTML".to_string());
        dtd.declare_general_entity("amp".to_string(), EntityValue::Literal("&#38;".to_string()));
        dtd.declare_general_entity("amp".to_string(), EntityValue::Literal("second".to_string()));
        assert_eq!(
            dtd.general_entity("amp"),
            Some(&EntityValue::Literal("&#38;".to_string()))
        );
    }

    #[test]
    fn element_lookup_is_case_insensitive_on_the_key() {
        let mut dtd = Dtd::new("HTML".to_string());
        let model = ContentModel::declared(crate::model::DeclaredContent::Empty);
        dtd.declare_element(ElementDecl::new(
            "BR".to_string(),
            TagOmission::Required,
            TagOmission::Required,
            model,
        ));
        assert!(dtd.element("br").is_some());
        assert!(dtd.element("Br").is_some());
    }
}
