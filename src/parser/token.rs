use pest::Parser;

use super::{CmdParser, Pair, ParserResult, Rule, check_rule, unexpected_token};

/// Which substitution syntax a piece of text uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// cmd.exe, `%NAME%` sites only.
    Batch,
    /// cmd.exe with delayed expansion, `!NAME!` sites as well.
    BatchDelayed,
    /// INF files: plain `%KEY%` sites and `%%` escapes.
    Inf,
}

impl Dialect {
    fn rule(self) -> Rule {
        match self {
            Dialect::Batch => Rule::percent_expansion,
            Dialect::BatchDelayed => Rule::expansion,
            Dialect::Inf => Rule::inf_expansion,
        }
    }
}

/// One piece of a template: passthrough text or a variable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum SubstitutionExpr {
    Literal(String),
    /// `%NAME%`
    DirectRef { name: String },
    /// `%NAME:~START%` and `%NAME:~START,LENGTH%`
    SlicedRef {
        name: String,
        start: i64,
        length: Option<i64>,
    },
    /// `%NAME:-FALLBACK%`
    DefaultRef { name: String, fallback: String },
    /// `%NAME:SEARCH=REPLACEMENT%`, `SEARCH` may start with `*`
    ReplaceRef {
        name: String,
        search: String,
        replacement: String,
    },
}

impl SubstitutionExpr {
    pub fn name(&self) -> Option<&str> {
        match self {
            SubstitutionExpr::Literal(_) => None,
            SubstitutionExpr::DirectRef { name }
            | SubstitutionExpr::SlicedRef { name, .. }
            | SubstitutionExpr::DefaultRef { name, .. }
            | SubstitutionExpr::ReplaceRef { name, .. } => Some(name),
        }
    }
}

/// A parsed expression together with the source text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    token: String,
    expr: SubstitutionExpr,
}

impl Substitution {
    pub fn new(token: &str, expr: SubstitutionExpr) -> Self {
        Self {
            token: token.to_string(),
            expr,
        }
    }

    fn literal(text: &str) -> Self {
        Self::new(text, SubstitutionExpr::Literal(text.to_string()))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expr(&self) -> &SubstitutionExpr {
        &self.expr
    }
}

/// Text split into literal runs and substitution sites, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template(Vec<Substitution>);

impl Template {
    /// Tokenizes `input`. Never fails: malformed or unterminated markers come
    /// back as literal text.
    pub fn parse(input: &str, dialect: Dialect) -> Self {
        match Self::try_parse(input, dialect) {
            Ok(template) => template,
            Err(err) => {
                log::warn!("{err}");
                Self(vec![Substitution::literal(input)])
            }
        }
    }

    fn try_parse(input: &str, dialect: Dialect) -> ParserResult<Self> {
        let mut pairs = CmdParser::parse(dialect.rule(), input)?;
        let Some(root) = pairs.next() else {
            return Ok(Self::default());
        };

        let mut parts = Vec::new();
        for token in root.into_inner() {
            let part = match token.as_rule() {
                Rule::EOI => break,
                Rule::literal | Rule::percent_literal => Substitution::literal(token.as_str()),
                Rule::escaped_percent => Substitution::new(
                    token.as_str(),
                    SubstitutionExpr::Literal("%".to_string()),
                ),
                Rule::percent_ref | Rule::bang_ref | Rule::inf_ref => {
                    let text = token.as_str();
                    Substitution::new(text, parse_reference(token))
                }
                _ => unexpected_token!(token),
            };
            parts.push(part);
        }
        log::trace!("Template::parse({:?}) -> {:?}", input, parts);
        Ok(Self(parts))
    }

    pub fn parts(&self) -> &[Substitution] {
        &self.0
    }

    /// True when nothing in the template needs resolving.
    pub fn is_literal(&self) -> bool {
        self.references().next().is_none()
    }

    pub fn references(&self) -> impl Iterator<Item = &Substitution> {
        self.0
            .iter()
            .filter(|part| !matches!(part.expr, SubstitutionExpr::Literal(_)))
    }
}

fn parse_reference(token: Pair) -> SubstitutionExpr {
    let text = token.as_str();
    let mut inner = token.into_inner();
    let Some(name_token) = inner.next() else {
        return SubstitutionExpr::Literal(text.to_string());
    };
    check_rule!(name_token, Rule::var_name | Rule::bang_name | Rule::inf_name);
    let name = name_token.as_str().to_string();

    let Some(modifier) = inner.next() else {
        return SubstitutionExpr::DirectRef { name };
    };
    check_rule!(modifier, Rule::modifier | Rule::bang_modifier);
    let Some(kind) = modifier.into_inner().next() else {
        return SubstitutionExpr::DirectRef { name };
    };

    match kind.as_rule() {
        Rule::slice | Rule::bang_slice => {
            let mut start = None;
            let mut length = None;
            for arg in kind.into_inner() {
                match arg.as_rule() {
                    Rule::slice_start | Rule::bang_slice_start => start = Some(arg.as_str()),
                    Rule::slice_length | Rule::bang_slice_length => length = Some(arg.as_str()),
                    _ => unexpected_token!(arg),
                }
            }

            let start = start.and_then(parse_offset);
            let length = length.map(parse_offset);
            match (start, length) {
                (Some(start), None) => SubstitutionExpr::SlicedRef {
                    name,
                    start,
                    length: None,
                },
                (Some(start), Some(Some(length))) => SubstitutionExpr::SlicedRef {
                    name,
                    start,
                    length: Some(length),
                },
                _ => {
                    log::debug!("Malformed offsets in {:?}, whole value is used", text);
                    SubstitutionExpr::DirectRef { name }
                }
            }
        }
        Rule::replace | Rule::bang_replace => {
            let mut search = String::new();
            let mut replacement = String::new();
            for arg in kind.into_inner() {
                match arg.as_rule() {
                    Rule::search | Rule::bang_search => search = arg.as_str().to_string(),
                    Rule::replacement | Rule::bang_replacement => {
                        replacement = arg.as_str().to_string()
                    }
                    _ => unexpected_token!(arg),
                }
            }
            SubstitutionExpr::ReplaceRef {
                name,
                search,
                replacement,
            }
        }
        Rule::default_value | Rule::bang_default_value => {
            let fallback = kind
                .into_inner()
                .next()
                .map(|pair| pair.as_str().to_string())
                .unwrap_or_default();
            SubstitutionExpr::DefaultRef { name, fallback }
        }
        _ => unexpected_token!(kind),
    }
}

/// Parses a slice offset the way cmd.exe does (`strtol` with base 0): an
/// optional sign followed by decimal, `0x` hex or leading-zero octal digits.
pub(crate) fn parse_offset(input: &str) -> Option<i64> {
    let trimmed = input.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };

    Some(if negative { -value } else { value })
}
