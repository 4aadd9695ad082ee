use pest::Parser;

use super::{
    Assignment, CmdParser, DeobfError, DeobfuscationResult, Dialect, Pair, ParserResult,
    ResolutionResult, Resolver, Rule, SymbolTable, check_rule,
    render::{Renderer, Separator},
    unexpected_token,
};
use crate::Config;

#[derive(Debug, Clone, PartialEq)]
enum StatementKind {
    /// `set NAME=VALUE` or `set "NAME=VALUE"`
    Assignment(String, String),
    /// `for %g in (...) do set ...`, one definition per instantiated body
    ForLoop(Vec<(String, String)>),
    Command,
}

#[derive(Debug, Clone, PartialEq)]
struct Statement {
    text: String,
    kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
enum ScriptItem {
    Separator(Separator),
    Statement(Statement),
}

impl Statement {
    fn command(text: &str) -> Self {
        Self {
            text: text.to_string(),
            kind: StatementKind::Command,
        }
    }

    fn from_pair(token: Pair) -> Self {
        let text = token.as_str();
        let kind = match token.as_rule() {
            Rule::command => StatementKind::Command,
            Rule::assignment => match parse_assignment(token) {
                Some((name, value)) => StatementKind::Assignment(name, value),
                None => StatementKind::Command,
            },
            Rule::for_statement => {
                let definitions = parse_for(token);
                if definitions.is_empty() {
                    StatementKind::Command
                } else {
                    StatementKind::ForLoop(definitions)
                }
            }
            _ => unexpected_token!(token),
        };
        Self {
            text: text.to_string(),
            kind,
        }
    }

    fn definitions(self) -> Vec<(String, String)> {
        match self.kind {
            StatementKind::Assignment(name, value) => vec![(name, value)],
            StatementKind::ForLoop(definitions) => definitions,
            StatementKind::Command => Vec::new(),
        }
    }
}

fn scan_script(input: &str) -> ParserResult<Vec<ScriptItem>> {
    let mut pairs = CmdParser::parse(Rule::script, input)?;
    let Some(script) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut items = Vec::new();
    for token in script.into_inner() {
        let item = match token.as_rule() {
            Rule::EOI => break,
            Rule::separator => ScriptItem::Separator(Separator::from(token.as_str())),
            _ => ScriptItem::Statement(Statement::from_pair(token)),
        };
        items.push(item);
    }
    Ok(items)
}

/// Scans text that should hold exactly one statement.
fn scan_single(input: &str) -> Option<Statement> {
    let mut pairs = CmdParser::parse(Rule::single_statement, input).ok()?;
    let token = pairs.next()?.into_inner().next()?;
    match token.as_rule() {
        Rule::EOI => None,
        _ => Some(Statement::from_pair(token)),
    }
}

fn parse_assignment(token: Pair) -> Option<(String, String)> {
    check_rule!(token, Rule::assignment);
    let mut grouped = false;
    let mut definition = None;

    for part in token.into_inner() {
        match part.as_rule() {
            Rule::statement_lead => grouped = part.as_str().contains('('),
            Rule::quoted_assign | Rule::bare_assign => {
                let quoted = part.as_rule() == Rule::quoted_assign;
                let mut name = "";
                let mut value = "";
                for arg in part.into_inner() {
                    match arg.as_rule() {
                        Rule::assign_name => name = arg.as_str(),
                        Rule::quoted_value | Rule::bare_value => value = arg.as_str(),
                        _ => unexpected_token!(arg),
                    }
                }
                if !quoted {
                    value = value.trim();
                    if grouped {
                        value = value.strip_suffix(')').unwrap_or(value).trim_end();
                    }
                }
                definition = Some((name.trim().to_string(), value.to_string()));
            }
            _ => unexpected_token!(part),
        }
    }
    definition
}

/// Instantiates the body of a FOR loop once per item and keeps the
/// instances that are assignments.
fn parse_for(token: Pair) -> Vec<(String, String)> {
    check_rule!(token, Rule::for_statement);
    let mut grouped = false;
    let mut variable = "";
    let mut items = "";
    let mut body = "";
    for part in token.into_inner() {
        match part.as_rule() {
            Rule::statement_lead => grouped = part.as_str().contains('('),
            Rule::for_variable => variable = part.as_str(),
            Rule::for_items => items = part.as_str(),
            Rule::for_body => body = part.as_str(),
            _ => unexpected_token!(part),
        }
    }

    let mut body = body.trim_end();
    if grouped {
        body = body.strip_suffix(')').unwrap_or(body);
    }
    let Some((prefix, letter)) = variable.split_at_checked(variable.len().saturating_sub(1)) else {
        return Vec::new();
    };
    let unquoting = format!("{}~{}", prefix, letter);

    let mut definitions = Vec::new();
    for item in split_for_items(items) {
        let instance = body
            .replace(&unquoting, unquote(item))
            .replace(variable, item);
        log::trace!("for {} in ({}): {:?}", variable, item, instance);
        if let Some(statement) = scan_single(&instance) {
            definitions.extend(statement.definitions());
        }
    }
    definitions
}

/// Splits a FOR item list on blanks, `,`, `;` and `=` outside quotes.
fn split_for_items(items: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = None;
    let mut quoted = false;
    for (i, c) in items.char_indices() {
        match c {
            '"' => {
                quoted = !quoted;
                start.get_or_insert(i);
            }
            c if !quoted && (c.is_whitespace() || matches!(c, ',' | ';' | '=')) => {
                if let Some(start) = start.take() {
                    result.push(&items[start..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(start) = start {
        result.push(&items[start..]);
    }
    result
}

/// A `/v:on` (or bare `/v`) switch among the leading words of a statement
/// turns on delayed expansion for the rest of the command line.
fn enables_delayed_expansion(text: &str) -> bool {
    for word in text.split_whitespace() {
        let word = word.trim_start_matches(['(', '@']).to_ascii_lowercase();
        if word.is_empty() || word.ends_with("cmd") || word.ends_with("cmd.exe") {
            continue;
        }
        match word.strip_prefix('/') {
            Some("v" | "v:on") => return true,
            Some(_) => continue,
            None => return false,
        }
    }
    false
}

fn unquote(item: &str) -> &str {
    item.strip_prefix('"')
        .and_then(|item| item.strip_suffix('"'))
        .unwrap_or(item)
}

/// Deobfuscates command lines in the cmd.exe dialect.
///
/// Statements are processed in order. Assignments go into a fresh symbol
/// table, every other statement is expanded against the table as it stands
/// at that point and becomes part of the output.
#[derive(Debug, Clone, Default)]
pub struct BatchSession {
    config: Config,
}

impl BatchSession {
    /// Creates a session with the default [`Config`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lnk_deobf::BatchSession;
    ///
    /// let session = BatchSession::new();
    /// assert_eq!(session.safe_eval("set X=cmd & %X%"), "cmd");
    /// ```
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

    fn dialect(delayed: bool) -> Dialect {
        if delayed {
            Dialect::BatchDelayed
        } else {
            Dialect::Batch
        }
    }

    /// Reconstructed command only.
    pub fn safe_eval(&self, input: &str) -> String {
        self.deobfuscate(input).output().to_string()
    }

    /// Deobfuscates one command line and reports what was found on the way.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lnk_deobf::BatchSession;
    ///
    /// let result = BatchSession::new().deobfuscate(
    ///     r#"/c set "xS=ie4" && set "yT=uinit" && call %xS%%yT%.exe -BaseSettings"#,
    /// );
    /// assert_eq!(result.output(), "call ie4uinit.exe -BaseSettings");
    /// assert_eq!(result.assignments().len(), 2);
    /// assert!(result.errors().is_empty());
    /// ```
    pub fn deobfuscate(&self, input: &str) -> DeobfuscationResult {
        let mut delayed = self.config.delayed_expansion;
        let mut table = if self.config.well_known {
            SymbolTable::well_known(Dialect::Batch)
        } else {
            SymbolTable::new()
        };
        let mut assignments = Vec::new();
        let mut errors = Vec::new();
        let mut cyclic = false;
        let mut renderer = Renderer::new();

        let items = match scan_script(input) {
            Ok(items) => items,
            Err(err) => {
                log::warn!("{err}");
                errors.push(err);
                vec![ScriptItem::Statement(Statement::command(input))]
            }
        };

        for item in items {
            let statement = match item {
                ScriptItem::Separator(separator) => {
                    renderer.separator(separator);
                    continue;
                }
                ScriptItem::Statement(statement) => statement,
            };
            if !delayed && enables_delayed_expansion(&statement.text) {
                log::debug!("Delayed expansion enabled by {:?}", statement.text.trim());
                delayed = true;
            }
            let dialect = Self::dialect(delayed);

            let (statement, rendered) = match statement.kind {
                StatementKind::Command => {
                    let expanded = self.expand(&table, dialect, &statement.text, &mut errors);
                    cyclic |= expanded.cyclic;
                    let dynamic = if expanded.value != statement.text {
                        scan_single(&expanded.value)
                            .filter(|scanned| scanned.kind != StatementKind::Command)
                    } else {
                        None
                    };
                    match dynamic {
                        Some(scanned) => {
                            log::debug!("Expanded statement is an assignment: {}", expanded.value);
                            (scanned, expanded.value)
                        }
                        None => (statement, expanded.value),
                    }
                }
                StatementKind::Assignment(..) if self.config.keep_assignments => {
                    let expanded = self.expand(&table, dialect, &statement.text, &mut errors);
                    cyclic |= expanded.cyclic;
                    (statement, expanded.value)
                }
                _ => {
                    let text = statement.text.clone();
                    (statement, text)
                }
            };

            if statement.kind == StatementKind::Command {
                renderer.emit(&rendered);
                continue;
            }
            if self.config.keep_assignments {
                renderer.emit(&rendered);
            }
            for (name, value) in statement.definitions() {
                let assignment = Assignment::new(&name, &value, assignments.len());
                log::debug!("Assignment #{}: {}", assignment.source_order, assignment);
                table.define(&assignment);
                assignments.push(assignment);
            }
        }

        let output = renderer.finish(&self.config);
        for token in Resolver::new(&table, Self::dialect(delayed)).pending_references(&output) {
            log::warn!("Output still references a defined variable: {}", token);
            push_unique(&mut errors, DeobfError::AmbiguousExpansion(token));
        }

        DeobfuscationResult::new(output, assignments, errors, cyclic)
    }

    fn expand(
        &self,
        table: &SymbolTable,
        dialect: Dialect,
        text: &str,
        errors: &mut Vec<DeobfError>,
    ) -> ResolutionResult {
        let mut resolver = Resolver::new(table, dialect).with_undefined(self.config.undefined);
        let result = resolver.expand_str(text);
        for err in resolver.take_errors() {
            push_unique(errors, err);
        }
        result
    }
}

pub(crate) fn push_unique(errors: &mut Vec<DeobfError>, error: DeobfError) {
    if !errors.contains(&error) {
        errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UndefinedPolicy;

    fn statements(input: &str) -> Vec<(String, StatementKind)> {
        scan_script(input)
            .unwrap()
            .into_iter()
            .filter_map(|item| match item {
                ScriptItem::Statement(statement) => Some((statement.text, statement.kind)),
                ScriptItem::Separator(_) => None,
            })
            .collect()
    }

    fn assignment(name: &str, value: &str) -> StatementKind {
        StatementKind::Assignment(name.to_string(), value.to_string())
    }

    #[test]
    fn statement_split() {
        assert_eq!(
            statements(r#"echo "a & b" & set X=1^&2&&set "Y=3 | 4" |more"#),
            vec![
                (r#"echo "a & b" "#.to_string(), StatementKind::Command),
                (" set X=1^&2".to_string(), assignment("X", "1^&2")),
                (r#"set "Y=3 | 4" "#.to_string(), assignment("Y", "3 | 4")),
                ("more".to_string(), StatementKind::Command),
            ]
        );
    }

    #[test]
    fn assignment_forms() {
        assert_eq!(
            statements("/v:on /c @set A=1\nSET \"B= 2 \"ignored\n(set C=3)\nset /a D=4"),
            vec![
                ("/v:on /c @set A=1".to_string(), assignment("A", "1")),
                ("SET \"B= 2 \"ignored".to_string(), assignment("B", " 2 ")),
                ("(set C=3)".to_string(), assignment("C", "3")),
                ("set /a D=4".to_string(), StatementKind::Command),
            ]
        );
        assert_eq!(
            statements(r#"set "A=say "hi"" & settings=1"#),
            vec![
                (r#"set "A=say "hi"" "#.to_string(), assignment("A", r#"say "hi""#)),
                (" settings=1".to_string(), StatementKind::Command),
            ]
        );
    }

    #[test]
    fn for_loops() {
        let scanned = statements(
            r#"(for %g in ("aa=ie4" "bb=uinit") do @set %~g) && (for %%z in ("s") do @set "Outlip=%%~z")"#,
        );
        assert_eq!(
            scanned[0].1,
            StatementKind::ForLoop(vec![
                ("aa".to_string(), "ie4".to_string()),
                ("bb".to_string(), "uinit".to_string()),
            ])
        );
        assert_eq!(
            scanned[1].1,
            StatementKind::ForLoop(vec![("Outlip".to_string(), "s".to_string())])
        );
        assert_eq!(
            statements("for %a in (x y) do echo %a")[0].1,
            StatementKind::Command
        );
    }

    #[test]
    fn for_items() {
        assert_eq!(
            split_for_items(r#""a=1" b,c;"d e"  f=g"#),
            vec![r#""a=1""#, "b", "c", r#""d e""#, "f", "g"]
        );
        assert_eq!(unquote(r#""a=1""#), "a=1");
        assert_eq!(unquote("b"), "b");
    }

    #[test]
    fn chained() {
        let session = BatchSession::new();
        assert_eq!(session.safe_eval("set A=foo & set B=%A%bar & echo %B%"), "echo foobar");
        assert_eq!(session.safe_eval("set A=1 & set A=2 & echo %A%"), "echo 2");
        assert_eq!(session.safe_eval("set X=cmd & %X%"), "cmd");
    }

    #[test]
    fn point_of_use() {
        let session = BatchSession::new().with_config(Config::default().with_raw(true));
        assert_eq!(
            session.safe_eval("set A=1 & echo %A% & set A=2 & echo %A%"),
            "echo 1 & echo 2"
        );
        assert_eq!(
            session.safe_eval("set A=ie4&& set A=%A%uinit&& call %A%"),
            "call ie4uinit"
        );
    }

    #[test]
    fn dynamic_assignment() {
        let result = BatchSession::new().deobfuscate("set A=se&& %A%t B=ie4uinit&& call %B%");
        assert_eq!(result.output(), "call ie4uinit");
        assert_eq!(
            result.assignments(),
            &[Assignment::new("A", "se", 0), Assignment::new("B", "ie4uinit", 1)]
        );
    }

    #[test]
    fn delayed_expansion() {
        let input = "set A=ie4&&set B=!A!uinit&&call !B!.exe";
        assert_eq!(BatchSession::new().safe_eval(input), "call !B!.exe");

        let session = BatchSession::new().with_config(Config::default().with_delayed_expansion(true));
        assert_eq!(session.safe_eval(input), "call ie4uinit.exe");

        let switched = format!("/v:on /c {}", input);
        assert_eq!(BatchSession::new().safe_eval(&switched), "call ie4uinit.exe");
        assert_eq!(
            BatchSession::new().safe_eval("/V /C set A=1&& echo !A!"),
            "echo 1"
        );
        assert_eq!(
            BatchSession::new().safe_eval("/v:off /c set A=1&& echo !A!"),
            "echo !A!"
        );
    }

    #[test]
    fn bangs_stay_literal() {
        let session = BatchSession::new();
        let input = r#"/c start "" "https://x.test/a!b!c" && mshta "javascript:alert('hi!');close('bye!')""#;
        let result = session.deobfuscate(input);
        assert_eq!(result.output(), input);
        assert!(result.errors().is_empty());

        let input = r#"mshta "javascript:alert('hi!');close('bye!')""#;
        assert_eq!(session.safe_eval(input), input);
    }

    #[test]
    fn delayed_switch_detection() {
        assert!(enables_delayed_expansion("/v:on /c set A=1"));
        assert!(enables_delayed_expansion("@CMD.EXE /Q /V:ON /C echo"));
        assert!(enables_delayed_expansion(r"C:\Windows\System32\cmd.exe /v /c"));
        assert!(!enables_delayed_expansion("/v:off /c set A=1"));
        assert!(!enables_delayed_expansion("echo /v:on"));
        assert!(!enables_delayed_expansion(""));
    }

    #[test]
    fn nested_cmd() {
        let session = BatchSession::new();
        assert_eq!(session.safe_eval("cmd.exe /c set A=ie4&& call %A%"), "call ie4");
        assert_eq!(session.safe_eval("CMD /C set A=ie4&& call %A%uinit"), "call ie4uinit");
        assert_eq!(
            session.safe_eval(r"C:\Windows\System32\cmd.exe /v:on /c set A=ie4&& call !A!"),
            "call ie4"
        );
        assert_eq!(
            statements("cmd /c set A=1 & cmdkey /list & cmd /c echo")
                .into_iter()
                .map(|(_, kind)| kind)
                .collect::<Vec<_>>(),
            vec![
                assignment("A", "1"),
                StatementKind::Command,
                StatementKind::Command,
            ]
        );
    }

    #[test]
    fn cycle() {
        let result = BatchSession::new().deobfuscate("set A=%B% & set B=%A% & echo [%A%]");
        assert_eq!(result.output(), "echo []");
        assert!(result.is_cyclic());
        assert_eq!(
            result.errors(),
            &[DeobfError::CyclicReference("A".to_string())]
        );
    }

    #[test]
    fn keep_assignments() {
        let session = BatchSession::new().with_config(Config::default().with_keep_assignments(true));
        assert_eq!(
            session.safe_eval("set A=ie4&&set B=%A%uinit&&%B%"),
            "set A=ie4 && set B=ie4uinit && ie4uinit"
        );
    }

    #[test]
    fn undefined_policy() {
        let result = BatchSession::new().deobfuscate("echo [%NOPE%]");
        assert_eq!(result.output(), "echo []");
        assert_eq!(
            result.errors(),
            &[DeobfError::UnresolvedReference("NOPE".to_string())]
        );

        let session =
            BatchSession::new().with_config(Config::default().with_undefined(UndefinedPolicy::Keep));
        assert_eq!(session.safe_eval("echo [%NOPE%]"), "echo [%NOPE%]");
    }

    #[test]
    fn well_known() {
        let input = "%COMSPEC:~-7,3% /c echo %public%";
        assert_eq!(BatchSession::new().safe_eval(input), "/c echo");

        let session = BatchSession::new().with_config(Config::default().with_well_known(true));
        assert_eq!(session.safe_eval(input), r"cmd /c echo C:\Users\Public");
        assert_eq!(
            session.safe_eval("set ComSpec=%ComSpec:cmd=powershell%&& %comspec%"),
            r"C:\Windows\system32\powershell.exe"
        );
    }

    #[test]
    fn ambiguous_expansion() {
        let result = BatchSession::new().deobfuscate("set P=%&& set B=x&& echo %P%B%P%");
        assert_eq!(result.output(), "echo %B%");
        assert!(result.needs_review());
    }
}
