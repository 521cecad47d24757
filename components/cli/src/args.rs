//! Manual flag parsing for the CLI surface in SPEC_FULL.md §6. No argument
//! parsing crate is pulled in — none of the example repos this workspace
//! is grounded on carries one, and the flag set here is small and fixed.

use std::fmt;

use sgml_chars::CaseFolding;

#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    File(String),
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub log_target: Option<LogTarget>,
    pub pretty: bool,
    pub force_html: bool,
    pub dtd_url: Option<String>,
    pub no_xml_decl: bool,
    pub keep_doctype: bool,
    pub case_folding: CaseFolding,
    pub proxy: Option<String>,
    pub encoding: Option<String>,
    pub input: String,
    pub output: Option<String>,
}

#[derive(Debug)]
pub enum ArgsError {
    MissingValue(&'static str),
    MissingInput,
    UnknownFlag(String),
    ConflictingCaseFolding,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue(flag) => write!(f, "{} requires a value", flag),
            ArgsError::MissingInput => write!(f, "missing input-uri argument"),
            ArgsError::UnknownFlag(flag) => write!(f, "unknown flag '{}'", flag),
            ArgsError::ConflictingCaseFolding => {
                write!(f, "-lower and -upper are mutually exclusive")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

pub fn parse(mut args: impl Iterator<Item = String>) -> Result<CliArgs, ArgsError> {
    let mut log_target = None;
    let mut pretty = false;
    let mut force_html = false;
    let mut dtd_url = None;
    let mut no_xml_decl = false;
    let mut keep_doctype = false;
    let mut case_folding = CaseFolding::None;
    let mut proxy = None;
    let mut encoding = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-e" => {
                let value = args.next().ok_or(ArgsError::MissingValue("-e"))?;
                log_target = Some(if value == "$STDERR" {
                    LogTarget::Stderr
                } else {
                    LogTarget::File(value)
                });
            }
            "-f" => pretty = true,
            "-html" => force_html = true,
            "-dtd" => {
                dtd_url = Some(args.next().ok_or(ArgsError::MissingValue("-dtd"))?);
            }
            "-noxml" => no_xml_decl = true,
            "-doctype" => keep_doctype = true,
            "-lower" => {
                if matches!(case_folding, CaseFolding::ToUpper) {
                    return Err(ArgsError::ConflictingCaseFolding);
                }
                case_folding = CaseFolding::ToLower;
            }
            "-upper" => {
                if matches!(case_folding, CaseFolding::ToLower) {
                    return Err(ArgsError::ConflictingCaseFolding);
                }
                case_folding = CaseFolding::ToUpper;
            }
            "-proxy" => {
                proxy = Some(args.next().ok_or(ArgsError::MissingValue("-proxy"))?);
            }
            "-encoding" => {
                encoding = Some(args.next().ok_or(ArgsError::MissingValue("-encoding"))?);
            }
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(ArgsError::UnknownFlag(other.to_string()));
            }
            other => positional.push(other.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    let input = positional.next().ok_or(ArgsError::MissingInput)?;
    let output = positional.next();

    Ok(CliArgs {
        log_target,
        pretty,
        force_html,
        dtd_url,
        no_xml_decl,
        keep_doctype,
        case_folding,
        proxy,
        encoding,
        input,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> Result<CliArgs, ArgsError> {
        parse(s.split_whitespace().map(String::from))
    }

    #[test]
    fn parses_flags_and_positional_input() {
        let args = parse_str("-html -f input.html").unwrap();
        assert!(args.force_html);
        assert!(args.pretty);
        assert_eq!(args.input, "input.html");
        assert_eq!(args.output, None);
    }

    #[test]
    fn parses_e_with_stderr_target() {
        let args = parse_str("-e $STDERR doc.sgml").unwrap();
        assert!(matches!(args.log_target, Some(LogTarget::Stderr)));
    }

    #[test]
    fn parses_e_with_file_target() {
        let args = parse_str("-e errors.log doc.sgml").unwrap();
        assert!(matches!(args.log_target, Some(LogTarget::File(ref f)) if f == "errors.log"));
    }

    #[test]
    fn rejects_conflicting_case_folding() {
        assert!(matches!(
            parse_str("-lower -upper doc.sgml"),
            Err(ArgsError::ConflictingCaseFolding)
        ));
    }

    #[test]
    fn requires_input_positional() {
        assert!(matches!(parse_str("-html"), Err(ArgsError::MissingInput)));
    }

    #[test]
    fn captures_output_positional() {
        let args = parse_str("doc.sgml out.xml").unwrap();
        assert_eq!(args.input, "doc.sgml");
        assert_eq!(args.output.as_deref(), Some("out.xml"));
    }
}
