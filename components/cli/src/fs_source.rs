//! `ByteSource` over local files (§6): accepts both bare paths and `file:`
//! URIs, since that is what the positional `input-uri` argument and a
//! `SYSTEM` identifier in a `<!DOCTYPE>` both hand the reader. No HTTP
//! client is implemented — fetching external DTDs or documents over the
//! network is out of scope for this demo collaborator.

use std::fs;
use std::io;
use std::path::Path;

use sgml_entities::{ByteSource, FetchedBytes};

pub struct FsByteSource;

impl FsByteSource {
    fn resolve_path(uri: &str) -> &str {
        uri.strip_prefix("file://").unwrap_or(uri)
    }

    fn guess_content_type(path: &str) -> Option<String> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "htm" | "html" => Some("text/html".to_string()),
            "xml" | "xhtml" => Some("text/xml".to_string()),
            _ => None,
        }
    }
}

impl ByteSource for FsByteSource {
    fn fetch(&self, uri: &str) -> io::Result<FetchedBytes> {
        let path = Self::resolve_path(uri);
        let bytes = fs::read(path)?;
        Ok(FetchedBytes {
            bytes,
            resolved_uri: format!("file://{}", path),
            content_type: Self::guess_content_type(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_file_scheme_prefix() {
        assert_eq!(FsByteSource::resolve_path("file:///tmp/x.html"), "/tmp/x.html");
        assert_eq!(FsByteSource::resolve_path("/tmp/x.html"), "/tmp/x.html");
    }

    #[test]
    fn guesses_html_content_type_from_extension() {
        assert_eq!(
            FsByteSource::guess_content_type("page.html").as_deref(),
            Some("text/html")
        );
        assert_eq!(FsByteSource::guess_content_type("data.dtd"), None);
    }
}
