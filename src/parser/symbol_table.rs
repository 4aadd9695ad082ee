mod well_known;

use std::collections::HashMap;

use super::Dialect;

/// One observed `NAME=VALUE` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub raw_expression: String,
    pub source_order: usize,
}

impl Assignment {
    pub fn new(name: &str, raw_expression: &str, source_order: usize) -> Self {
        Self {
            name: name.to_string(),
            raw_expression: raw_expression.to_string(),
            source_order,
        }
    }
}

impl std::fmt::Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.raw_expression)
    }
}

/// Variable definitions of one run, looked up case-insensitively.
///
/// Values are stored unresolved. Every definition of a name is kept so that a
/// definition which refers to its own name can fall back to the one it
/// shadowed; `lookup` always sees the newest.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable(HashMap<String, Vec<String>>);

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the values a typical Windows host would expose:
    /// environment variables for cmd.exe, directory ids for INF files.
    pub fn well_known(dialect: Dialect) -> Self {
        let mut table = Self::new();
        let seeds = match dialect {
            Dialect::Batch | Dialect::BatchDelayed => &well_known::ENVIRONMENT,
            Dialect::Inf => &well_known::INF_DIRIDS,
        };
        for (name, value) in seeds.entries() {
            table.set(name, value);
        }
        table
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    pub fn define(&mut self, assignment: &Assignment) {
        self.set(&assignment.name, &assignment.raw_expression);
    }

    pub fn set(&mut self, name: &str, raw_expression: &str) {
        self.0
            .entry(Self::key(name))
            .or_default()
            .push(raw_expression.to_string());
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.0
            .get(&Self::key(name))
            .and_then(|history| history.last())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Number of definitions recorded for `name`.
    pub(crate) fn generations(&self, name: &str) -> usize {
        self.0.get(&Self::key(name)).map_or(0, Vec::len)
    }

    /// The `generation`-th definition of `name`, oldest first.
    pub(crate) fn definition(&self, name: &str, generation: usize) -> Option<&str> {
        self.0
            .get(&Self::key(name))
            .and_then(|history| history.get(generation))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
