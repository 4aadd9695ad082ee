mod replace;
mod substring;

use std::collections::HashMap;

use super::{DeobfError, Dialect, SubstitutionExpr, SymbolTable, Template};
use crate::config::UndefinedPolicy;

/// Longest value an expansion may produce, the cmd.exe command line limit.
pub const MAX_EXPANSION: usize = 8191;

/// Literal value of a substitution. `cyclic` is set when some reference on
/// the way refers back to a definition that is still being resolved; that
/// reference contributed an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolutionResult {
    pub value: String,
    pub cyclic: bool,
}

impl ResolutionResult {
    pub fn literal(value: &str) -> Self {
        Self {
            value: value.to_string(),
            cyclic: false,
        }
    }

    fn cycle() -> Self {
        Self {
            value: String::new(),
            cyclic: true,
        }
    }
}

/// Expands substitution sites against one symbol table.
///
/// A resolver owns the set of definitions currently being expanded. Each
/// name maps to the generation of its definition that is in progress; when
/// the name shows up again resolution moves on to the older definition, and
/// when there is none left the reference is a cycle. Every (name,
/// generation) pair is entered at most once per chain, so expansion always
/// terminates.
///
/// Definitions whose value does not depend on the enclosing chain are
/// resolved once per resolver, and no expansion grows past
/// [`MAX_EXPANSION`] characters.
pub struct Resolver<'a> {
    table: &'a SymbolTable,
    dialect: Dialect,
    undefined: UndefinedPolicy,
    in_progress: HashMap<String, usize>,
    /// Names met while already in progress, in order.
    hits: Vec<String>,
    memo: HashMap<(String, usize), ResolutionResult>,
    truncated: bool,
    errors: Vec<DeobfError>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a SymbolTable, dialect: Dialect) -> Self {
        Self {
            table,
            dialect,
            undefined: UndefinedPolicy::default(),
            in_progress: HashMap::new(),
            hits: Vec::new(),
            memo: HashMap::new(),
            truncated: false,
            errors: Vec::new(),
        }
    }

    pub fn with_undefined(mut self, policy: UndefinedPolicy) -> Self {
        self.undefined = policy;
        self
    }

    /// Tokenizes and expands `text`.
    pub fn expand_str(&mut self, text: &str) -> ResolutionResult {
        let template = Template::parse(text, self.dialect);
        self.expand(&template)
    }

    /// Replaces every reference of `template` with its value and keeps the
    /// literal runs as they are.
    pub fn expand(&mut self, template: &Template) -> ResolutionResult {
        let mut result = ResolutionResult::default();
        for part in template.parts() {
            let resolved = match part.expr() {
                SubstitutionExpr::Literal(text) => ResolutionResult::literal(text),
                expr => self.resolve_reference(part.token(), expr),
            };
            result.value.push_str(&resolved.value);
            result.cyclic |= resolved.cyclic;
            if result.value.len() > MAX_EXPANSION {
                self.truncate(&mut result.value);
                break;
            }
        }
        result
    }

    fn truncate(&mut self, value: &mut String) {
        let end = (0..=MAX_EXPANSION)
            .rev()
            .find(|end| value.is_char_boundary(*end))
            .unwrap_or_default();
        value.truncate(end);
        if !self.truncated {
            log::warn!("Expansion longer than {} characters, truncated", MAX_EXPANSION);
            self.truncated = true;
        }
    }

    pub fn resolve(&mut self, expr: &SubstitutionExpr) -> ResolutionResult {
        let token = expr.to_string();
        self.resolve_reference(&token, expr)
    }

    fn resolve_reference(&mut self, token: &str, expr: &SubstitutionExpr) -> ResolutionResult {
        match expr {
            SubstitutionExpr::Literal(text) => ResolutionResult::literal(text),
            SubstitutionExpr::DirectRef { name } => match self.resolve_name(name) {
                Some(resolved) => resolved,
                None => self.undefined(name, token),
            },
            SubstitutionExpr::SlicedRef {
                name,
                start,
                length,
            } => match self.resolve_name(name) {
                Some(mut resolved) => {
                    resolved.value = substring::slice(&resolved.value, *start, *length);
                    resolved
                }
                None => self.undefined(name, token),
            },
            SubstitutionExpr::DefaultRef { name, fallback } => match self.resolve_name(name) {
                Some(resolved) if !resolved.value.is_empty() => resolved,
                Some(resolved) => ResolutionResult {
                    value: fallback.clone(),
                    cyclic: resolved.cyclic,
                },
                None => ResolutionResult::literal(fallback),
            },
            SubstitutionExpr::ReplaceRef {
                name,
                search,
                replacement,
            } => match self.resolve_name(name) {
                Some(mut resolved) => {
                    resolved.value = replace::replace(&resolved.value, search, replacement);
                    resolved
                }
                None => self.undefined(name, token),
            },
        }
    }

    /// Fully expanded value of `name`, `None` if it was never defined.
    fn resolve_name(&mut self, name: &str) -> Option<ResolutionResult> {
        let table = self.table;
        let generations = table.generations(name);
        if generations == 0 {
            return None;
        }

        let key = name.to_lowercase();
        let generation = match self.in_progress.get(&key).copied() {
            Some(0) => {
                log::debug!("Cyclic reference to \"{}\"", name);
                self.hits.push(key);
                self.push_error(DeobfError::CyclicReference(name.to_string()));
                return Some(ResolutionResult::cycle());
            }
            Some(generation) => {
                self.hits.push(key.clone());
                generation - 1
            }
            None => generations - 1,
        };
        if let Some(known) = self.memo.get(&(key.clone(), generation)) {
            return Some(known.clone());
        }
        let raw = table.definition(name, generation)?;

        let first_hit = self.hits.len();
        let previous = self.in_progress.insert(key.clone(), generation);
        let result = self.expand_str(raw);
        match previous {
            Some(previous) => {
                self.in_progress.insert(key.clone(), previous);
            }
            None => {
                self.in_progress.remove(&key);
            }
        }

        // Hits on names of the enclosing chain make the value depend on it.
        let depends_on_chain = self.hits[first_hit..]
            .iter()
            .any(|hit| *hit != key && self.in_progress.contains_key(hit));
        if !depends_on_chain {
            self.memo.insert((key, generation), result.clone());
        }

        log::trace!("{}#{} = {:?} -> {:?}", name, generation, raw, result);
        Some(result)
    }

    fn undefined(&mut self, name: &str, token: &str) -> ResolutionResult {
        log::debug!("Variable \"{}\" is not defined", name);
        self.push_error(DeobfError::UnresolvedReference(name.to_string()));
        match self.undefined {
            UndefinedPolicy::Empty => ResolutionResult::default(),
            UndefinedPolicy::Keep => ResolutionResult::literal(token),
        }
    }

    /// Substitution sites left in already expanded `text` that name a defined
    /// variable, i.e. text that would change if it were expanded once more.
    pub fn pending_references(&self, text: &str) -> Vec<String> {
        Template::parse(text, self.dialect)
            .references()
            .filter(|part| part.expr().name().is_some_and(|name| self.table.contains(name)))
            .map(|part| part.token().to_string())
            .collect()
    }

    fn push_error(&mut self, error: DeobfError) {
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    pub fn take_errors(&mut self) -> Vec<DeobfError> {
        std::mem::take(&mut self.errors)
    }
}

impl std::fmt::Display for SubstitutionExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubstitutionExpr::Literal(text) => write!(f, "{}", text),
            SubstitutionExpr::DirectRef { name } => write!(f, "%{}%", name),
            SubstitutionExpr::SlicedRef {
                name,
                start,
                length: None,
            } => write!(f, "%{}:~{}%", name, start),
            SubstitutionExpr::SlicedRef {
                name,
                start,
                length: Some(length),
            } => write!(f, "%{}:~{},{}%", name, start, length),
            SubstitutionExpr::DefaultRef { name, fallback } => write!(f, "%{}:-{}%", name, fallback),
            SubstitutionExpr::ReplaceRef {
                name,
                search,
                replacement,
            } => write!(f, "%{}:{}={}%", name, search, replacement),
        }
    }
}
