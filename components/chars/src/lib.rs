use std::cmp::Ordering::{Equal, Greater, Less};

fn binary_search_table(c: char, table: &[(char, char)]) -> bool {
    table
        .binary_search_by(|&(low, high)| {
            if c < low {
                Greater
            } else if c > high {
                Less
            } else {
                Equal
            }
        })
        .is_ok()
}

const XML_START_CHAR_TABLE: &[(char, char)] = &[
    (':', ':'),
    ('A', 'Z'),
    ('_', '_'),
    ('a', 'z'),
    ('\u{c0}', '\u{d6}'),
    ('\u{d8}', '\u{f6}'),
    ('\u{f8}', '\u{2ff}'),
    ('\u{370}', '\u{37d}'),
    ('\u{37f}', '\u{1fff}'),
    ('\u{200c}', '\u{200d}'),
    ('\u{2070}', '\u{218f}'),
    ('\u{2C00}', '\u{2FEF}'),
    ('\u{3001}', '\u{D7FF}'),
    ('\u{F900}', '\u{FDCF}'),
    ('\u{FDF0}', '\u{FFFD}'),
    ('\u{10000}', '\u{EFFFF}'),
];

const XML_CONTINUE_CHAR_TABLE: &[(char, char)] = &[
    ('-', '.'),
    ('0', '9'),
    (':', ':'),
    ('A', 'Z'),
    ('_', '_'),
    ('a', 'z'),
    ('\u{b7}', '\u{b7}'),
    ('\u{c0}', '\u{d6}'),
    ('\u{d8}', '\u{f6}'),
    ('\u{f8}', '\u{37d}'),
    ('\u{37f}', '\u{1fff}'),
    ('\u{200c}', '\u{200d}'),
    ('\u{203f}', '\u{2040}'),
    ('\u{2070}', '\u{218f}'),
    ('\u{2C00}', '\u{2FEF}'),
    ('\u{3001}', '\u{D7FF}'),
    ('\u{F900}', '\u{FDCF}'),
    ('\u{FDF0}', '\u{FFFD}'),
    ('\u{10000}', '\u{EFFFF}'),
];

const XML_CHAR: &[(char, char)] = &[
    ('\u{9}', '\u{9}'),
    ('\u{a}', '\u{a}'),
    ('\u{d}', '\u{d}'),
    ('\u{20}', '\u{D7FF}'),
    ('\u{E000}', '\u{FFFD}'),
    ('\u{10000}', '\u{10FFFF}'),
];

pub trait XmlAsciiChar {
    /// https://www.w3.org/TR/REC-xml/#NT-S
    fn is_xml_whitespace(&self) -> bool;

    fn is_xml_punct(&self) -> bool;
}

pub trait XmlChar: XmlAsciiChar {
    /// https://www.w3.org/TR/REC-xml/#NT-NameStartChar
    fn is_xml_name_start_char(&self) -> bool;

    /// https://www.w3.org/TR/REC-xml/#NT-NameChar
    fn is_xml_name_char(&self) -> bool;

    /// https://www.w3.org/TR/REC-xml/#NT-Char
    fn is_xml_char(&self) -> bool;
}

impl XmlAsciiChar for u8 {
    #[inline]
    fn is_xml_whitespace(&self) -> bool {
        *self == b'\x20' || *self == b'\x09' || *self == b'\x0D' || *self == b'\x0A'
    }

    #[inline]
    fn is_xml_punct(&self) -> bool {
        b"/()[].@,:*+-=!<>$".contains(self)
    }
}

impl XmlAsciiChar for char {
    #[inline]
    fn is_xml_whitespace(&self) -> bool {
        *self == '\x20' || *self == '\x09' || *self == '\x0D' || *self == '\x0A'
    }

    #[inline]
    fn is_xml_punct(&self) -> bool {
        "/()[].@,:*+-=!<>$".contains(*self)
    }
}

impl XmlChar for char {
    #[inline]
    fn is_xml_name_start_char(&self) -> bool {
        binary_search_table(*self, XML_START_CHAR_TABLE)
    }

    #[inline]
    fn is_xml_name_char(&self) -> bool {
        binary_search_table(*self, XML_CONTINUE_CHAR_TABLE)
    }

    #[inline]
    fn is_xml_char(&self) -> bool {
        binary_search_table(*self, XML_CHAR)
    }
}

/// Name casing policy applied to element and attribute names by the reader.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CaseFolding {
    /// Preserve the spelling found in the source.
    None,
    ToUpper,
    ToLower,
}

impl CaseFolding {
    pub fn fold(&self, name: &str) -> String {
        match self {
            CaseFolding::None => name.to_string(),
            CaseFolding::ToUpper => name.to_uppercase(),
            CaseFolding::ToLower => name.to_lowercase(),
        }
    }
}

/// `Name ::= NameStartChar (NameChar)*`
pub fn verify_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_xml_name_start_char() => {}
        _ => return false,
    }
    chars.all(|c| c.is_xml_name_char())
}

/// `Nmtoken ::= (NameChar)+`
pub fn verify_nmtoken(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_xml_name_char())
}

/// `NCName ::= NCNameStartChar NCNameChar*`, i.e. [`verify_name`] without `:`.
pub fn verify_ncname(name: &str) -> bool {
    verify_name(name) && !name.contains(':')
}

/// Splits `prefix:local` and verifies both halves are valid NCNames.
/// Returns false for a bare name without a colon.
pub fn verify_prefixed_name(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => verify_ncname(prefix) && verify_ncname(local),
        None => false,
    }
}

#[cfg(test)]
mod case_folding_tests {
    use super::*;

    #[test]
    fn none_preserves_spelling() {
        assert_eq!(CaseFolding::None.fold("DiV"), "DiV");
    }

    #[test]
    fn to_upper_and_lower() {
        assert_eq!(CaseFolding::ToUpper.fold("Div"), "DIV");
        assert_eq!(CaseFolding::ToLower.fold("DIV"), "div");
    }

    #[test]
    fn name_validity() {
        assert!(verify_name("a"));
        assert!(verify_name("_a.b-c:d"));
        assert!(!verify_name("1a"));
        assert!(!verify_name(""));
        assert!(!verify_name("a b"));
    }

    #[test]
    fn nmtoken_validity() {
        assert!(verify_nmtoken("123"));
        assert!(verify_nmtoken("-foo"));
        assert!(!verify_nmtoken(""));
        assert!(!verify_nmtoken("a b"));
    }

    #[test]
    fn prefixed_name_validity() {
        assert!(verify_prefixed_name("xlink:href"));
        assert!(!verify_prefixed_name("href"));
        assert!(!verify_prefixed_name("xlink:"));
        assert!(!verify_prefixed_name(":href"));
    }
}
