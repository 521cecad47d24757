//! External collaborator (§6): resolving a DTD by logical name, and the
//! bundled fallback used for bare `<!DOCTYPE html>` / `-html` input with no
//! explicit `SYSTEM`/`PUBLIC` identifier.

use std::io;

/// The subset of HTML's element/attribute/entity declarations the reader
/// ships with, used whenever the document declares itself HTML but does
/// not point at an external subset the host can fetch.
pub const DEFAULT_HTML_DTD: &str = include_str!("../resources/html.dtd");

/// External collaborator: resolves a DTD referenced by logical name (e.g.
/// `"HTML"`) to its text, without going through `ByteSource`/a URI — this
/// is for DTDs the host keeps on hand (bundled resources, a local catalog),
/// as distinct from fetching an external subset named by a `SYSTEM` literal
/// in the document.
pub trait ResourceLoader {
    fn load(&self, logical_name: &str) -> io::Result<String>;
}

/// Serves only the bundled HTML subset under the name `"HTML"`; the
/// default when the host does not configure a catalog of its own.
pub struct DefaultResourceLoader;

impl ResourceLoader for DefaultResourceLoader {
    fn load(&self, logical_name: &str) -> io::Result<String> {
        if logical_name.eq_ignore_ascii_case("HTML") {
            Ok(DEFAULT_HTML_DTD.to_string())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no bundled resource named '{}'", logical_name),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loader_serves_html_case_insensitively() {
        let loader = DefaultResourceLoader;
        assert!(loader.load("html").is_ok());
        assert!(loader.load("HTML").is_ok());
        assert!(loader.load("MATHML").is_err());
    }
}
