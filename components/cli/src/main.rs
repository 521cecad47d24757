//! `sgml-cli`: a thin demo driver (§6) proving the reader works end-to-end.
//! Reads one document (or a wildcard set of local files), runs it through
//! [`sgml_reader::SgmlReader`], and writes the resulting event stream back
//! out as indented XML text.

mod args;
mod fs_source;
mod logger;
mod writer;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use sgml_entities::{Entity, Logger, NullLogger};
use sgml_reader::{DefaultResourceLoader, ReaderOptions, SgmlReader, WhitespacePolicy};

use args::{CliArgs, LogTarget};
use fs_source::FsByteSource;
use logger::{FileLogger, StderrLogger};
use writer::XmlWriter;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sgml-cli: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(raw_args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = args::parse(raw_args.into_iter())?;

    let logger_owned = build_logger(&cli)?;
    let logger: &dyn Logger = logger_owned.as_ref().map(|l| l.as_ref()).unwrap_or(&NullLogger);

    let byte_source = FsByteSource;
    let resource_loader = DefaultResourceLoader;

    let options = ReaderOptions {
        case_folding: cli.case_folding.clone(),
        whitespace_policy: if cli.pretty {
            WhitespacePolicy::Suppress
        } else {
            WhitespacePolicy::Report
        },
        strip_doc_type: !cli.keep_doctype,
        force_html: cli.force_html,
        default_encoding: cli.encoding.clone(),
        forced_dtd_uri: cli.dtd_url.clone(),
    };

    for input in expand_inputs(&cli.input)? {
        process_one(&input, &cli, &byte_source, &resource_loader, logger, options.clone())?;
    }

    Ok(())
}

fn build_logger(cli: &CliArgs) -> io::Result<Option<Box<dyn Logger>>> {
    match &cli.log_target {
        None => Ok(None),
        Some(LogTarget::Stderr) => Ok(Some(Box::new(StderrLogger))),
        Some(LogTarget::File(path)) => Ok(Some(Box::new(FileLogger::create(path)?))),
    }
}

/// Local-file wildcard expansion (§6): no external globbing crate is
/// pulled in since the patterns the CLI needs to support are limited to a
/// single trailing or embedded `*` in the final path component.
fn expand_inputs(input: &str) -> io::Result<Vec<String>> {
    if !input.contains('*') {
        return Ok(vec![input.to_string()]);
    }
    let path = std::path::Path::new(input);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
    let pattern = path.file_name().and_then(|n| n.to_str()).unwrap_or("*");
    let (prefix, suffix) = pattern.split_once('*').unwrap_or((pattern, ""));

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if name.starts_with(prefix) && name.ends_with(suffix) {
            matches.push(entry.path().to_string_lossy().into_owned());
        }
    }
    matches.sort();
    Ok(matches)
}

fn process_one(
    input: &str,
    cli: &CliArgs,
    byte_source: &FsByteSource,
    resource_loader: &DefaultResourceLoader,
    logger: &dyn Logger,
    options: ReaderOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let entry = Entity::external("doc", None, input.to_string()).with_proxy(cli.proxy.clone());
    let mut reader = SgmlReader::new(entry, byte_source, resource_loader, logger, options)?;

    let mut out_file;
    let mut out_stdout;
    let mut writer: XmlWriter<&mut dyn Write> = if let Some(path) = &cli.output {
        out_file = BufWriter::new(File::create(path)?);
        XmlWriter::new(&mut out_file, cli.pretty)
    } else {
        out_stdout = BufWriter::new(io::stdout());
        XmlWriter::new(&mut out_stdout, cli.pretty)
    };

    if !cli.no_xml_decl {
        writer.write_xml_decl()?;
    }
    while reader.read()? {
        writer.write_node(&reader)?;
    }
    writer.finish()?;
    Ok(())
}
