mod batch;
mod error;
mod inf;
mod render;
mod resolver;
mod script_result;
mod symbol_table;
mod token;

pub use batch::BatchSession;
pub use error::DeobfError;
pub use inf::InfSession;
pub use resolver::{ResolutionResult, Resolver};
pub use script_result::DeobfuscationResult;
pub use symbol_table::{Assignment, SymbolTable};
pub use token::{Dialect, Substitution, SubstitutionExpr, Template};

type ParserResult<T> = core::result::Result<T, DeobfError>;
type PestError = pest::error::Error<Rule>;
use pest_derive::Parser;

type Pair<'i> = ::pest::iterators::Pair<'i, Rule>;

pub(crate) const NEWLINE: &str = "\n";

macro_rules! unexpected_token {
    ($pair:expr) => {
        panic!("Unexpected token: {:?}", $pair.as_rule())
    };
}
pub(crate) use unexpected_token;

macro_rules! check_rule {
    ($pair:expr, $rule:pat) => {
        if !matches!($pair.as_rule(), $rule) {
            panic!(
                "Unexpected token: {:?}, instead of {}",
                $pair.as_rule(),
                stringify!($rule)
            );
        }
    };
}
pub(crate) use check_rule;

/// Grammar for both dialects: the substitution sites they share, the cmd.exe
/// statement layer and the INF line layer.
#[derive(Parser)]
#[grammar = "substitution.pest"]
#[grammar = "batch.pest"]
#[grammar = "inf.pest"]
pub(crate) struct CmdParser;
