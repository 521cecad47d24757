//! Part of C5's output: element declarations (`<!ELEMENT …>`) and their
//! attribute lists.

use crate::attdef::AttDef;
use crate::model::ContentModel;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TagOmission {
    Required,
    Omissible,
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: String,
    pub start_tag: TagOmission,
    pub end_tag: TagOmission,
    pub content_model: ContentModel,
    pub exclusions: Vec<String>,
    pub inclusions: Vec<String>,
    pub attlist: Vec<AttDef>,
}

impl ElementDecl {
    pub fn new(name: String, start_tag: TagOmission, end_tag: TagOmission, content_model: ContentModel) -> Self {
        Self {
            name,
            start_tag,
            end_tag,
            content_model,
            exclusions: Vec::new(),
            inclusions: Vec::new(),
            attlist: Vec::new(),
        }
    }

    /// Containment query used by the reader's auto-close walk: can this
    /// element's content model accept `name` (upper-cased) as a child,
    /// taking the `-(excl)` exclusion list into account.
    pub fn can_contain(&self, name: &str) -> bool {
        if self.exclusions.iter().any(|e| e.eq_ignore_ascii_case(name)) {
            return false;
        }
        if self.inclusions.iter().any(|i| i.eq_ignore_ascii_case(name)) {
            return true;
        }
        self.content_model.can_contain(name)
    }

    /// Case-insensitive attribute lookup, since ATTLIST names are stored
    /// upper-cased but the reader may be matching against source spelling.
    pub fn find_attdef(&self, name: &str) -> Option<&AttDef> {
        self.attlist.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeclaredContent, Member};

    #[test]
    fn exclusion_overrides_model_permission() {
        let mut model = ContentModel::with_root_group();
        let root = model.root().unwrap();
        model.push_member(root, Member::Name("SPAN".to_string()));
        let mut decl = ElementDecl::new(
            "P".to_string(),
            TagOmission::Required,
            TagOmission::Omissible,
            model,
        );
        decl.exclusions.push("SPAN".to_string());
        assert!(!decl.can_contain("SPAN"));
    }

    #[test]
    fn inclusion_adds_to_model_permission() {
        let model = ContentModel::declared(DeclaredContent::Empty);
        let mut decl = ElementDecl::new(
            "IMG".to_string(),
            TagOmission::Required,
            TagOmission::Required,
            model,
        );
        decl.inclusions.push("A".to_string());
        assert!(decl.can_contain("A"));
        assert!(!decl.can_contain("B"));
    }
}
