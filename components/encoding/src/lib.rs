//! Encoding detection (C1): BOM sniffing, in-stream `<?xml ... encoding=...?>`
//! and HTML `<meta http-equiv=content-type>` sniffing, and UCS-4 decoding
//! (which `encoding_rs` does not provide at all).

use std::fmt;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// An encoding the detector can hand back to the caller. `encoding_rs` covers
/// everything except the four UCS-4 byte orders, which XML still permits via
/// BOM and which we decode by hand.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectedEncoding {
    Registered(&'static Encoding),
    Ucs4(Ucs4Variant),
}

impl DetectedEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            DetectedEncoding::Registered(enc) => enc.name(),
            DetectedEncoding::Ucs4(Ucs4Variant::BigEndian) => "UCS-4BE",
            DetectedEncoding::Ucs4(Ucs4Variant::LittleEndian) => "UCS-4LE",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Ucs4Variant {
    BigEndian,
    LittleEndian,
}

#[derive(Debug)]
pub enum EncodingError {
    UnsupportedEncoding(String),
    MalformedUcs4CodePoint(u32),
    TruncatedUcs4Sequence,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingError::UnsupportedEncoding(name) => {
                write!(f, "unsupported encoding: {}", name)
            }
            EncodingError::MalformedUcs4CodePoint(cp) => {
                write!(f, "code point U+{:X} is not a valid XML character", cp)
            }
            EncodingError::TruncatedUcs4Sequence => {
                write!(f, "input ends mid-way through a 4-byte UCS-4 sequence")
            }
        }
    }
}

impl std::error::Error for EncodingError {}

/// BOM table from §4.1: examined against the first 2-4 bytes.
///
/// UCS-4 byte orders are checked before UTF-16 ones since `00 00 FE FF`
/// (UCS-4BE) and `FE FF` (UTF-16BE) share a prefix only in the degenerate
/// all-zero case, which cannot occur for a real BOM.
pub fn detect_bom(bytes: &[u8]) -> Option<(DetectedEncoding, usize)> {
    if bytes.starts_with(&[0x00, 0x00, 0x00, 0x3C]) || bytes.starts_with(&[0xFF, 0xFE, 0xFF, 0xFE])
    {
        return Some((DetectedEncoding::Ucs4(Ucs4Variant::LittleEndian), 4));
    }
    if bytes.starts_with(&[0x3C, 0x00, 0x00, 0x00]) || bytes.starts_with(&[0xFE, 0xFF, 0xFE, 0xFF])
    {
        return Some((DetectedEncoding::Ucs4(Ucs4Variant::BigEndian), 4));
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some((DetectedEncoding::Registered(UTF_8), 3));
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some((DetectedEncoding::Registered(UTF_16BE), 2));
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some((DetectedEncoding::Registered(UTF_16LE), 2));
    }
    None
}

/// Decode a 4-byte-per-codepoint UCS-4 buffer (after any BOM has been
/// stripped) into a `String`, synthesizing UTF-16 surrogate pairs for
/// supra-BMP code points and rejecting values outside the XML `Char` range.
pub fn decode_ucs4(bytes: &[u8], variant: Ucs4Variant) -> Result<String, EncodingError> {
    if bytes.len() % 4 != 0 {
        return Err(EncodingError::TruncatedUcs4Sequence);
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let raw = match variant {
            Ucs4Variant::BigEndian => u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            Ucs4Variant::LittleEndian => {
                u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
            }
        };
        if raw > 0x10FFFF || (0xD800..=0xDFFF).contains(&raw) {
            return Err(EncodingError::MalformedUcs4CodePoint(raw));
        }
        let c = char::from_u32(raw).ok_or(EncodingError::MalformedUcs4CodePoint(raw))?;
        out.push(c);
    }
    Ok(out)
}

/// Scan a decoded text window for a leading `<?xml version=... encoding=...?>`
/// declaration and return the declared encoding name, if any.
pub fn sniff_xml_decl(text: &str) -> Option<String> {
    let trimmed = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let decl_start = trimmed.find("<?xml")?;
    // Must be the very first thing (modulo BOM already stripped).
    if trimmed[..decl_start].chars().any(|c| !c.is_whitespace()) {
        return None;
    }
    let rest = &trimmed[decl_start..];
    let decl_end = rest.find("?>")?;
    let decl = &rest[..decl_end];
    extract_attr(decl, "encoding")
}

/// Scan for an HTML `<meta http-equiv="content-type" content="...charset=NAME...">`
/// appearing before any content characters, per §4.1.
pub fn sniff_html_meta(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(rel_pos) = lower[search_from..].find("<meta") {
        let pos = search_from + rel_pos;
        let tag_end = lower[pos..].find('>')? + pos;
        let tag = &lower[pos..=tag_end];
        if tag.contains("http-equiv") && tag.contains("content-type") {
            if let Some(content) = extract_attr(tag, "content") {
                if let Some(charset_pos) = content.find("charset=") {
                    let after = &content[charset_pos + "charset=".len()..];
                    let name: String = after
                        .trim()
                        .trim_matches(|c: char| c == '"' || c == '\'')
                        .chars()
                        .take_while(|&c| c != ';' && c != '"' && c != '\'' && !c.is_whitespace())
                        .collect();
                    if !name.is_empty() {
                        return Some(name);
                    }
                }
            }
        }
        search_from = tag_end + 1;
    }
    None
}

fn extract_attr(haystack: &str, attr: &str) -> Option<String> {
    let lower = haystack.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(rel) = lower[search_from..].find(attr) {
        let pos = search_from + rel;
        let after_name = pos + attr.len();
        let mut rest = haystack[after_name..].trim_start();
        if let Some(stripped) = rest.strip_prefix('=') {
            rest = stripped.trim_start();
            let quote = rest.chars().next()?;
            if quote == '"' || quote == '\'' {
                let body = &rest[1..];
                let end = body.find(quote)?;
                return Some(body[..end].to_string());
            }
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '>' || c == '?')
                .unwrap_or(rest.len());
            return Some(rest[..end].to_string());
        }
        search_from = after_name;
    }
    None
}

/// Resolve an encoding label (from an XML declaration, HTML meta tag, or HTTP
/// header) to an `encoding_rs` encoding.
pub fn resolve_label(label: &str) -> Result<&'static Encoding, EncodingError> {
    match Encoding::for_label(label.as_bytes()) {
        Some(enc) => {
            log::debug!("resolved encoding label '{}' to {}", label, enc.name());
            Ok(enc)
        }
        None => {
            log::warn!("unrecognized encoding label '{}'", label);
            Err(EncodingError::UnsupportedEncoding(label.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod bom {
        use super::*;

        #[test]
        fn utf8_bom() {
            let (enc, n) = detect_bom(&[0xEF, 0xBB, 0xBF, b'<']).unwrap();
            assert_eq!(enc, DetectedEncoding::Registered(UTF_8));
            assert_eq!(n, 3);
        }

        #[test]
        fn utf16_be_bom() {
            let (enc, n) = detect_bom(&[0xFE, 0xFF, 0x00, b'<']).unwrap();
            assert_eq!(enc, DetectedEncoding::Registered(UTF_16BE));
            assert_eq!(n, 2);
        }

        #[test]
        fn ucs4_le_bom() {
            let (enc, n) = detect_bom(&[0x3C, 0x00, 0x00, 0x00]).unwrap();
            assert_eq!(enc, DetectedEncoding::Ucs4(Ucs4Variant::LittleEndian));
            assert_eq!(n, 4);
        }

        #[test]
        fn ucs4_be_bom() {
            let (enc, n) = detect_bom(&[0x00, 0x00, 0x00, 0x3C]).unwrap();
            assert_eq!(enc, DetectedEncoding::Ucs4(Ucs4Variant::BigEndian));
            assert_eq!(n, 4);
        }

        #[test]
        fn no_bom() {
            assert_eq!(detect_bom(b"<a/>"), None);
        }
    }

    mod ucs4 {
        use super::*;

        #[test]
        fn decode_ascii() {
            let bytes = [0, 0, 0, b'a', 0, 0, 0, b'b'];
            assert_eq!(decode_ucs4(&bytes, Ucs4Variant::BigEndian).unwrap(), "ab");
        }

        #[test]
        fn decode_supra_bmp() {
            let cp: u32 = 0x1F600;
            let bytes = cp.to_le_bytes();
            let decoded = decode_ucs4(&bytes, Ucs4Variant::LittleEndian).unwrap();
            assert_eq!(decoded.chars().next().unwrap() as u32, cp);
        }

        #[test]
        fn rejects_surrogate_range() {
            let bytes = 0xD800u32.to_be_bytes();
            assert!(matches!(
                decode_ucs4(&bytes, Ucs4Variant::BigEndian),
                Err(EncodingError::MalformedUcs4CodePoint(0xD800))
            ));
        }

        #[test]
        fn rejects_truncated() {
            assert!(matches!(
                decode_ucs4(&[0, 0, 0], Ucs4Variant::BigEndian),
                Err(EncodingError::TruncatedUcs4Sequence)
            ));
        }
    }

    mod sniff {
        use super::*;

        #[test]
        fn xml_decl_encoding() {
            let text = "<?xml version=\"1.0\" encoding=\"Windows-1252\"?><a/>";
            assert_eq!(sniff_xml_decl(text).as_deref(), Some("Windows-1252"));
        }

        #[test]
        fn xml_decl_missing_encoding() {
            assert_eq!(sniff_xml_decl("<?xml version=\"1.0\"?><a/>"), None);
        }

        #[test]
        fn xml_decl_not_leading() {
            assert_eq!(sniff_xml_decl("  x<?xml encoding=\"x\"?>"), None);
        }

        #[test]
        fn html_meta_charset() {
            let html =
                "<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=iso-8859-1\"></head>";
            assert_eq!(sniff_html_meta(html).as_deref(), Some("iso-8859-1"));
        }

        #[test]
        fn html_meta_no_charset() {
            let html = "<html><head><title>x</title></head>";
            assert_eq!(sniff_html_meta(html), None);
        }
    }
}
