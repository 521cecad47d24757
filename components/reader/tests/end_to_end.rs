//! Crate-level integration tests for the end-to-end scenarios in
//! SPEC_FULL.md §8 (S1-S6), run against the public API only.

use std::io;

use sgml_chars::CaseFolding;
use sgml_entities::{ByteSource, Entity, FetchedBytes, LiteralKind, Logger, NullLogger};
use sgml_reader::{DefaultResourceLoader, NodeType, ReaderOptions, ResourceLoader, SgmlReader};

struct NullSource;
impl ByteSource for NullSource {
    fn fetch(&self, _uri: &str) -> io::Result<FetchedBytes> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no fetch in test"))
    }
}

/// Serves one fixed DTD body under any URI, used to exercise `-dtd url`
/// (`forced_dtd_uri`) without a real filesystem or network fetch.
struct FixedDtdSource(&'static str);
impl ByteSource for FixedDtdSource {
    fn fetch(&self, uri: &str) -> io::Result<FetchedBytes> {
        Ok(FetchedBytes {
            bytes: self.0.as_bytes().to_vec(),
            resolved_uri: uri.to_string(),
            content_type: None,
        })
    }
}

fn reader_for<'a>(
    text: &str,
    byte_source: &'a dyn ByteSource,
    resource_loader: &'a dyn ResourceLoader,
    logger: &'a dyn Logger,
    options: ReaderOptions,
) -> SgmlReader<'a> {
    let entry = Entity::internal("doc", text.to_string(), LiteralKind::None);
    SgmlReader::new(entry, byte_source, resource_loader, logger, options).unwrap()
}

fn collect(mut reader: SgmlReader) -> Vec<(NodeType, String, String, usize, bool, bool)> {
    let mut events = Vec::new();
    while reader.read().unwrap() {
        events.push((
            reader.node_type(),
            reader.name().to_string(),
            reader.value().to_string(),
            reader.depth(),
            reader.is_empty_element(),
            reader.is_simulated(),
        ));
    }
    events
}

#[test]
fn s1_unclosed_element_gets_a_synthesized_end_tag() {
    let resources = DefaultResourceLoader;
    let events = collect(reader_for(
        "<p>hello",
        &NullSource,
        &resources,
        &NullLogger,
        ReaderOptions::default(),
    ));

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].0, NodeType::Element);
    assert_eq!(events[0].1, "p");
    assert_eq!(events[1].0, NodeType::Text);
    assert_eq!(events[1].2, "hello");
    assert_eq!(events[2].0, NodeType::EndElement);
    assert_eq!(events[2].1, "p");
    assert_eq!(events[0].3, events[2].3, "start and end depth must match");
}

#[test]
fn s2_sibling_elements_auto_close_when_dtd_forbids_nesting() {
    const P_DTD: &str = "<!ELEMENT P - O (#PCDATA)>";
    let byte_source = FixedDtdSource(P_DTD);
    let resources = DefaultResourceLoader;
    let options = ReaderOptions {
        forced_dtd_uri: Some("test:p.dtd".to_string()),
        ..ReaderOptions::default()
    };
    let events = collect(reader_for("<p>a<p>b", &byte_source, &resources, &NullLogger, options));

    let kinds: Vec<NodeType> = events.iter().map(|e| e.0).collect();
    assert_eq!(
        kinds,
        vec![
            NodeType::Element,
            NodeType::Text,
            NodeType::EndElement,
            NodeType::Element,
            NodeType::Text,
            NodeType::EndElement,
        ]
    );
    assert_eq!(events[1].2, "a");
    assert_eq!(events[4].2, "b");
    for e in &events {
        assert_eq!(e.1, "p");
    }
    // Both <p>s are siblings at the same depth, not nested.
    assert_eq!(events[0].3, events[3].3);
}

#[test]
fn s3_bare_body_gets_a_simulated_html_root() {
    let resources = DefaultResourceLoader;
    let options = ReaderOptions {
        case_folding: CaseFolding::ToLower,
        force_html: true,
        ..ReaderOptions::default()
    };
    let events = collect(reader_for(
        "<BODY><IMG SRC=x.gif>",
        &NullSource,
        &resources,
        &NullLogger,
        options,
    ));

    let names: Vec<&str> = events.iter().map(|e| e.1.as_str()).collect();
    assert_eq!(names, vec!["html", "body", "img", "img", "body", "html"]);
    assert!(events[0].5, "synthesized <html> must be marked simulated");
    assert!(!events[1].5);
    assert_eq!(events[2].0, NodeType::Element);
    assert!(events[2].4, "img is declared EMPTY");
    assert_eq!(events[3].0, NodeType::EndElement);
}

#[test]
fn s4_end_tag_mirrors_start_tag_casing() {
    let resources = DefaultResourceLoader;
    let events = collect(reader_for(
        "<a href=foo>ok</A>",
        &NullSource,
        &resources,
        &NullLogger,
        ReaderOptions::default(),
    ));

    assert_eq!(events[0].1, "a");
    assert_eq!(events.last().unwrap().1, "a");
}

#[test]
fn s5_script_content_is_read_as_cdata_under_the_html_dtd() {
    let resources = DefaultResourceLoader;
    let options = ReaderOptions {
        force_html: true,
        ..ReaderOptions::default()
    };
    let events = collect(reader_for(
        "<html><body><script>if (a<b) { }</script></body></html>",
        &NullSource,
        &resources,
        &NullLogger,
        options,
    ));

    let script = events
        .iter()
        .find(|e| e.0 == NodeType::CData)
        .expect("script body must be read as a CData node");
    assert_eq!(script.2, "if (a<b) { }");

    let script_end = events
        .iter()
        .find(|e| e.0 == NodeType::EndElement && e.1 == "script")
        .expect("script must get a matching end element");
    assert!(script_end.1 == "script");
}

#[test]
fn s6_character_references_expand_including_the_windows1252_remap() {
    let resources = DefaultResourceLoader;
    let options = ReaderOptions {
        force_html: true,
        ..ReaderOptions::default()
    };
    let events = collect(reader_for(
        "<p>&amp;&#65;&#x42;&#x80;</p>",
        &NullSource,
        &resources,
        &NullLogger,
        options,
    ));

    let text = events
        .iter()
        .find(|e| e.0 == NodeType::Text)
        .expect("expanded entities must produce a text node");
    assert_eq!(text.2, "&AB\u{20AC}");
}

#[test]
fn s7_read_outer_xml_round_trips_the_document() {
    let resources = DefaultResourceLoader;
    let mut reader = reader_for(
        r#"<a id="x">one<b>two</b>three</a>"#,
        &NullSource,
        &resources,
        &NullLogger,
        ReaderOptions::default(),
    );

    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::Element);
    let xml = reader.read_outer_xml().unwrap();
    assert_eq!(xml, r#"<a id="x">one<b>two</b>three</a>"#);
    assert!(!reader.read().unwrap(), "read_outer_xml must consume the whole subtree");
}
