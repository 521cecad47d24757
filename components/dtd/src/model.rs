//! C4: element content structure (groups, connectors, occurrences,
//! `#PCDATA`, declared content kinds) and containment queries.

/// A member of a `Group`: either a plain element name or a nested group,
/// referenced by its arena index.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Name(String),
    Group(usize),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GroupType {
    None,
    Sequence,
    Or,
    And,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Occurrence {
    Required,
    Optional,
    OneOrMore,
    ZeroOrMore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub parent: Option<usize>,
    pub members: Vec<Member>,
    pub group_type: GroupType,
    pub occurrence: Occurrence,
    pub mixed: bool,
}

impl Group {
    fn new(parent: Option<usize>) -> Self {
        Self {
            parent,
            members: Vec::new(),
            group_type: GroupType::None,
            occurrence: Occurrence::Required,
            mixed: false,
        }
    }

    /// Records `group_type` on the first connector seen; a later connector
    /// in the same group disagreeing is a caller-level parse error, since
    /// SGML requires a single connector kind per group.
    pub fn set_connector(&mut self, connector: GroupType) -> Result<(), String> {
        if self.group_type == GroupType::None || self.group_type == connector {
            self.group_type = connector;
            Ok(())
        } else {
            Err(format!(
                "mixed connectors in one group: {:?} and {:?}",
                self.group_type, connector
            ))
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeclaredContent {
    Default,
    Cdata,
    Rcdata,
    Empty,
    Any,
}

/// Owns the arena of `Group`s that make up one element's content model.
/// `root` is `Some` only when `declared_content` is `Default` — per the
/// invariant that a non-default declared content has no members.
#[derive(Debug, Clone)]
pub struct ContentModel {
    groups: Vec<Group>,
    root: Option<usize>,
    pub declared_content: DeclaredContent,
}

impl ContentModel {
    pub fn declared(declared_content: DeclaredContent) -> Self {
        Self {
            groups: Vec::new(),
            root: None,
            declared_content,
        }
    }

    pub fn with_root_group() -> Self {
        let mut model = Self {
            groups: Vec::new(),
            root: None,
            declared_content: DeclaredContent::Default,
        };
        let root = model.new_group(None);
        model.root = Some(root);
        model
    }

    pub fn new_group(&mut self, parent: Option<usize>) -> usize {
        let idx = self.groups.len();
        self.groups.push(Group::new(parent));
        idx
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn group(&self, idx: usize) -> &Group {
        &self.groups[idx]
    }

    pub fn group_mut(&mut self, idx: usize) -> &mut Group {
        &mut self.groups[idx]
    }

    pub fn push_member(&mut self, group: usize, member: Member) {
        self.groups[group].members.push(member);
    }

    /// Whether `name` (already upper-cased) appears anywhere in the model,
    /// recursing through nested groups. Used by the reader's auto-close
    /// walk to ask "does this ancestor's content model permit the new
    /// element".
    pub fn can_contain(&self, name: &str) -> bool {
        match self.declared_content {
            DeclaredContent::Any => true,
            DeclaredContent::Empty | DeclaredContent::Cdata | DeclaredContent::Rcdata => false,
            DeclaredContent::Default => match self.root {
                Some(root) => self.group_contains(root, name),
                None => false,
            },
        }
    }

    fn group_contains(&self, idx: usize, name: &str) -> bool {
        self.groups[idx].members.iter().any(|m| match m {
            Member::Name(n) => n.eq_ignore_ascii_case(name),
            Member::Group(g) => self.group_contains(*g, name),
        })
    }

    /// Whether `#PCDATA` is a permitted member anywhere at the top of this
    /// model (i.e. the root group is mixed content).
    pub fn is_mixed(&self) -> bool {
        match self.root {
            Some(root) => self.groups[root].mixed,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_and_empty_are_terminal() {
        let any = ContentModel::declared(DeclaredContent::Any);
        assert!(any.can_contain("P"));
        let empty = ContentModel::declared(DeclaredContent::Empty);
        assert!(!empty.can_contain("P"));
    }

    #[test]
    fn flat_sequence_contains_its_members() {
        let mut model = ContentModel::with_root_group();
        let root = model.root().unwrap();
        model.group_mut(root).set_connector(GroupType::Sequence).unwrap();
        model.push_member(root, Member::Name("TR".to_string()));
        assert!(model.can_contain("tr"));
        assert!(!model.can_contain("TD"));
    }

    #[test]
    fn nested_group_is_searched_recursively() {
        let mut model = ContentModel::with_root_group();
        let root = model.root().unwrap();
        let inner = model.new_group(Some(root));
        model.push_member(root, Member::Group(inner));
        model.push_member(inner, Member::Name("LI".to_string()));
        assert!(model.can_contain("LI"));
    }

    #[test]
    fn mismatched_connectors_in_one_group_error() {
        let mut model = ContentModel::with_root_group();
        let root = model.root().unwrap();
        model.group_mut(root).set_connector(GroupType::Sequence).unwrap();
        assert!(model.group_mut(root).set_connector(GroupType::Or).is_err());
    }

    #[test]
    fn mixed_flag_marks_pcdata_groups() {
        let mut model = ContentModel::with_root_group();
        let root = model.root().unwrap();
        model.group_mut(root).mixed = true;
        assert!(model.is_mixed());
    }
}
