//! The one piece of the output side the reader leaves to an external
//! collaborator (§6): a minimal indented-XML text writer, just enough to
//! drive the event stream end-to-end and prove it round-trips into
//! well-formed markup. Not a general-purpose serializer.

use std::io::{self, Write};

use sgml_reader::{NodeType, SgmlReader};

pub struct XmlWriter<W: Write> {
    out: W,
    pretty: bool,
    open_tags: Vec<String>,
    pending_start: bool,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        Self {
            out,
            pretty,
            open_tags: Vec::new(),
            pending_start: false,
        }
    }

    pub fn write_xml_decl(&mut self) -> io::Result<()> {
        writeln!(self.out, "<?xml version=\"1.0\"?>")
    }

    fn indent(&mut self, depth: usize) -> io::Result<()> {
        if self.pretty {
            for _ in 0..depth {
                write!(self.out, "  ")?;
            }
        }
        Ok(())
    }

    fn close_pending_start(&mut self) -> io::Result<()> {
        if self.pending_start {
            write!(self.out, ">")?;
            if self.pretty {
                writeln!(self.out)?;
            }
            self.pending_start = false;
        }
        Ok(())
    }

    pub fn write_node(&mut self, reader: &SgmlReader) -> io::Result<()> {
        match reader.node_type() {
            NodeType::Element => {
                self.close_pending_start()?;
                self.indent(reader.depth())?;
                write!(self.out, "<{}", reader.name())?;
                for attr in reader.attrs() {
                    write!(self.out, " {}=\"{}\"", attr.name, escape_attr(&attr.value))?;
                }
                if reader.is_empty_element() {
                    write!(self.out, "/>")?;
                    if self.pretty {
                        writeln!(self.out)?;
                    }
                } else {
                    self.open_tags.push(reader.name().to_string());
                    self.pending_start = true;
                }
            }
            NodeType::EndElement => {
                if self.pending_start {
                    write!(self.out, "/>")?;
                    if self.pretty {
                        writeln!(self.out)?;
                    }
                    self.pending_start = false;
                    self.open_tags.pop();
                } else {
                    self.open_tags.pop();
                    self.indent(reader.depth())?;
                    writeln!(self.out, "</{}>", reader.name())?;
                }
            }
            NodeType::Text | NodeType::Whitespace => {
                self.close_pending_start()?;
                write!(self.out, "{}", escape_text(reader.value()))?;
                if self.pretty {
                    writeln!(self.out)?;
                }
            }
            NodeType::CData => {
                self.close_pending_start()?;
                write!(self.out, "<![CDATA[{}]]>", reader.value())?;
                if self.pretty {
                    writeln!(self.out)?;
                }
            }
            NodeType::Comment => {
                self.close_pending_start()?;
                self.indent(reader.depth())?;
                write!(self.out, "<!--{}-->", reader.value())?;
                if self.pretty {
                    writeln!(self.out)?;
                }
            }
            NodeType::ProcessingInstruction => {
                self.close_pending_start()?;
                self.indent(reader.depth())?;
                write!(self.out, "<?{} {}?>", reader.name(), reader.value())?;
                if self.pretty {
                    writeln!(self.out)?;
                }
            }
            NodeType::DocumentType => {
                self.close_pending_start()?;
                write!(self.out, "<!DOCTYPE {}", reader.name())?;
                if let Some(public) = reader.attrs().iter().find(|a| a.name == "PUBLIC") {
                    write!(self.out, " PUBLIC \"{}\"", public.value)?;
                }
                if let Some(system) = reader.attrs().iter().find(|a| a.name == "SYSTEM") {
                    write!(self.out, " SYSTEM \"{}\"", system.value)?;
                }
                write!(self.out, ">")?;
                if self.pretty {
                    writeln!(self.out)?;
                }
            }
            NodeType::Eof => {}
        }
        Ok(())
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.close_pending_start()?;
        self.out.flush()
    }
}

fn escape_text(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_attr("\"quoted\""), "&quot;quoted&quot;");
    }
}
