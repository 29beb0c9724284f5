//! Filtering predicates over deterministic tags
//!
//! A predicate compares variables and string literals with `==` and `!=`,
//! combined with `&&`, `||`, `!` and parentheses, e.g.
//! `(v0 == v1 || v2 == v3) && v4 == v5`.

use crate::{Error, Result};
use std::collections::BTreeMap;

/// Evaluates a predicate for a set of variable values
pub trait PredicateEvaluator: Send + Sync {
    /// Whether `predicate` holds for `vars`
    fn evaluate(&self, predicate: &str, vars: &BTreeMap<String, String>) -> Result<bool>;
}

/// Evaluator for the comparison language above
///
/// The empty predicate holds for everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct TagPredicateEvaluator;

impl PredicateEvaluator for TagPredicateEvaluator {
    fn evaluate(&self, predicate: &str, vars: &BTreeMap<String, String>) -> Result<bool> {
        if predicate.trim().is_empty() {
            return Ok(true);
        }
        Predicate::parse(predicate)?.eval(vars)
    }
}

/// A parsed predicate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate(grammar::Expr);

impl Predicate {
    /// Parses a predicate
    pub fn parse(input: &str) -> Result<Self> {
        grammar::Expr::parse(input)
            .map(Self)
            .map_err(|_| Error::Predicate(input.to_string()))
    }

    /// Evaluates the predicate; unknown variables are errors
    pub fn eval(&self, vars: &BTreeMap<String, String>) -> Result<bool> {
        self.0.eval(vars)
    }
}

mod grammar {
    use crate::{Error, Result};
    use nom::{alpha1, alphanumeric0, types::CompleteStr};
    use std::collections::BTreeMap;

    #[derive(Debug)]
    pub struct ParseError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Operand {
        Var(String),
        Literal(String),
    }

    impl Operand {
        fn value<'a>(&'a self, vars: &'a BTreeMap<String, String>) -> Result<&'a str> {
            match self {
                Operand::Var(v) => vars
                    .get(v)
                    .map(String::as_str)
                    .ok_or_else(|| Error::Predicate(format!("unknown variable {}", v))),
                Operand::Literal(s) => Ok(s.as_str()),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Expr {
        Cmp { left: Operand, eq: bool, right: Operand },
        Not(Box<Expr>),
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
    }

    impl Expr {
        pub fn parse(input: &str) -> std::result::Result<Self, ParseError> {
            match disjunction(CompleteStr(input)) {
                Ok((rest, x)) if rest.0.trim().is_empty() => Ok(x),
                _ => Err(ParseError),
            }
        }

        pub fn eval(&self, vars: &BTreeMap<String, String>) -> Result<bool> {
            Ok(match self {
                Expr::Cmp { left, eq, right } => (left.value(vars)? == right.value(vars)?) == *eq,
                Expr::Not(e) => !e.eval(vars)?,
                Expr::And(l, r) => l.eval(vars)? && r.eval(vars)?,
                Expr::Or(l, r) => l.eval(vars)? || r.eval(vars)?,
            })
        }
    }

    fn and(l: Expr, r: Expr) -> Expr {
        Expr::And(Box::new(l), Box::new(r))
    }

    fn or(l: Expr, r: Expr) -> Expr {
        Expr::Or(Box::new(l), Box::new(r))
    }

    named!(variable(CompleteStr) -> Operand,
        map!(
            recognize!(pair!(alpha1, alphanumeric0)),
            |s: CompleteStr| Operand::Var(s.0.to_string())
        )
    );
    named!(literal(CompleteStr) -> Operand,
        map!(
            delimited!(char!('"'), take_until!("\""), char!('"')),
            |s: CompleteStr| Operand::Literal(s.0.to_string())
        )
    );
    named!(operand(CompleteStr) -> Operand,
        alt!(variable | literal)
    );
    named!(comparison(CompleteStr) -> Expr,
        ws!(do_parse!(
            left: operand >>
            eq: alt!(value!(true, tag!("==")) | value!(false, tag!("!="))) >>
            right: operand >>
            (Expr::Cmp { left, eq, right })
        ))
    );
    named!(primary(CompleteStr) -> Expr,
        ws!(alt!(
            delimited!(char!('('), disjunction, char!(')')) |
            map!(preceded!(char!('!'), primary), |e| Expr::Not(Box::new(e))) |
            comparison
        ))
    );
    named!(conjunction(CompleteStr) -> Expr,
        ws!(do_parse!(
            first: primary >>
            rest: many0!(ws!(preceded!(tag!("&&"), primary))) >>
            (rest.into_iter().fold(first, and))
        ))
    );
    named!(disjunction(CompleteStr) -> Expr,
        ws!(do_parse!(
            first: conjunction >>
            rest: many0!(ws!(preceded!(tag!("||"), conjunction))) >>
            (rest.into_iter().fold(first, or))
        ))
    );
}

/// Names the tags the way predicates refer to them
///
/// The query's value for the `i`-th where attribute is `v{2i}` and the
/// record's is `v{2i+1}`.
pub fn tag_variables(query: &[String], record: &[String]) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for (i, (q, r)) in query.iter().zip(record.iter()).enumerate() {
        vars.insert(format!("v{}", 2 * i), q.clone());
        vars.insert(format!("v{}", 2 * i + 1), r.clone());
    }
    vars
}
