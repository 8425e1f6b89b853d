//! Attribute filter expressions.
//!
//! Filters are SQL `WHERE` predicates parsed with `sqlparser` and compiled
//! into a small predicate tree. The supported subset is `AND`/`OR`/`NOT`,
//! parentheses, `= <> != < <= > >=`, `IN (...)`, `IS [NOT] NULL` and
//! `[NOT] LIKE '...'`, with a field on the left and a literal on the right.
//! Field names are case-insensitive; `OBJECTID` and `FID` refer to the
//! feature identifier.

use regex::Regex;
use spatialcheck_core::{Feature, FieldValue};
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised while parsing a filter expression.
#[derive(Error, Debug)]
pub enum FilterError {
    /// The text is not a SQL expression
    #[error("Syntax error: {0}")]
    Syntax(#[from] ParserError),

    /// Input left over after a complete expression
    #[error("Unexpected '{0}' after expression")]
    Trailing(String),

    /// Valid SQL outside the supported subset
    #[error("Unsupported filter construct: {0}")]
    Unsupported(String),

    /// A LIKE pattern could not be compiled
    #[error("Invalid LIKE pattern: {0}")]
    Like(#[from] regex::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn from_operator(op: &BinaryOperator) -> Option<Self> {
        Some(match op {
            BinaryOperator::Eq => Comparison::Eq,
            BinaryOperator::NotEq => Comparison::Ne,
            BinaryOperator::Lt => Comparison::Lt,
            BinaryOperator::LtEq => Comparison::Le,
            BinaryOperator::Gt => Comparison::Gt,
            BinaryOperator::GtEq => Comparison::Ge,
            _ => return None,
        })
    }

    fn holds(&self, ord: Ordering) -> bool {
        match self {
            Comparison::Eq => ord == Ordering::Equal,
            Comparison::Ne => ord != Ordering::Equal,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Le => ord != Ordering::Greater,
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone)]
enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare {
        field: String,
        op: Comparison,
        value: Literal,
    },
    In {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    Like {
        field: String,
        pattern: Regex,
        negated: bool,
    },
}

/// A parsed attribute filter.
#[derive(Debug, Clone)]
pub struct FilterExpr {
    source: String,
    root: Predicate,
}

impl FilterExpr {
    /// Parses an expression.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect).try_with_sql(input)?;
        let expr = parser.parse_expr()?;
        let rest = parser.peek_token();
        if rest.token != Token::EOF {
            return Err(FilterError::Trailing(rest.token.to_string()));
        }
        Ok(Self {
            source: input.to_string(),
            root: compile(&expr)?,
        })
    }

    /// The expression as given.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the feature satisfies the expression.
    pub fn matches(&self, feature: &Feature) -> bool {
        eval(&self.root, feature)
    }
}

fn unsupported(expr: &Expr) -> FilterError {
    FilterError::Unsupported(expr.to_string())
}

fn compile(expr: &Expr) -> Result<Predicate, FilterError> {
    match expr {
        Expr::Nested(inner) => compile(inner),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: inner,
        } => Ok(Predicate::Not(Box::new(compile(inner)?))),
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => Ok(Predicate::And(
                Box::new(compile(left)?),
                Box::new(compile(right)?),
            )),
            BinaryOperator::Or => Ok(Predicate::Or(
                Box::new(compile(left)?),
                Box::new(compile(right)?),
            )),
            other => Ok(Predicate::Compare {
                field: field_name(left)?,
                op: Comparison::from_operator(other).ok_or_else(|| unsupported(expr))?,
                value: literal(right)?,
            }),
        },
        Expr::IsNull(inner) => Ok(Predicate::IsNull {
            field: field_name(inner)?,
            negated: false,
        }),
        Expr::IsNotNull(inner) => Ok(Predicate::IsNull {
            field: field_name(inner)?,
            negated: true,
        }),
        Expr::InList {
            expr: inner,
            list,
            negated,
        } => Ok(Predicate::In {
            field: field_name(inner)?,
            values: list.iter().map(literal).collect::<Result<_, _>>()?,
            negated: *negated,
        }),
        Expr::Like {
            negated,
            expr: inner,
            pattern,
            ..
        } => {
            let Literal::Text(text) = literal(pattern)? else {
                return Err(unsupported(pattern));
            };
            Ok(Predicate::Like {
                field: field_name(inner)?,
                pattern: like_to_regex(&text)?,
                negated: *negated,
            })
        }
        other => Err(unsupported(other)),
    }
}

fn field_name(expr: &Expr) -> Result<String, FilterError> {
    match expr {
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        Expr::Nested(inner) => field_name(inner),
        other => Err(unsupported(other)),
    }
}

fn literal(expr: &Expr) -> Result<Literal, FilterError> {
    match expr {
        Expr::Value(v) => match &v.value {
            Value::Number(n, _) => n
                .to_string()
                .parse()
                .map(Literal::Number)
                .map_err(|_| unsupported(expr)),
            Value::SingleQuotedString(s) => Ok(Literal::Text(s.clone())),
            _ => Err(unsupported(expr)),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: inner,
        } => match literal(inner)? {
            Literal::Number(n) => Ok(Literal::Number(-n)),
            Literal::Text(_) => Err(unsupported(expr)),
        },
        Expr::Nested(inner) => literal(inner),
        other => Err(unsupported(other)),
    }
}

fn like_to_regex(pattern: &str) -> Result<Regex, FilterError> {
    let mut re = String::from("(?is)^");
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}

fn lookup(feature: &Feature, field: &str) -> FieldValue {
    if field.eq_ignore_ascii_case("OBJECTID") || field.eq_ignore_ascii_case("FID") {
        return FieldValue::Integer(feature.fid);
    }
    feature.get(field).cloned().unwrap_or(FieldValue::Null)
}

fn compare(value: &FieldValue, literal: &Literal) -> Option<Ordering> {
    match literal {
        Literal::Number(n) => match value {
            FieldValue::String(s) | FieldValue::Date(s) => s.trim().parse::<f64>().ok()?.partial_cmp(n),
            FieldValue::Boolean(b) => f64::from(u8::from(*b)).partial_cmp(n),
            other => other.as_real()?.partial_cmp(n),
        },
        Literal::Text(t) => match value {
            FieldValue::Null => None,
            other => Some(other.to_string().as_str().cmp(t.as_str())),
        },
    }
}

fn eval(predicate: &Predicate, feature: &Feature) -> bool {
    match predicate {
        Predicate::And(a, b) => eval(a, feature) && eval(b, feature),
        Predicate::Or(a, b) => eval(a, feature) || eval(b, feature),
        Predicate::Not(inner) => !eval(inner, feature),
        Predicate::Compare { field, op, value } => {
            compare(&lookup(feature, field), value).is_some_and(|ord| op.holds(ord))
        }
        Predicate::In {
            field,
            values,
            negated,
        } => {
            let v = lookup(feature, field);
            if v.is_null() {
                return false;
            }
            let found = values
                .iter()
                .any(|lit| compare(&v, lit) == Some(Ordering::Equal));
            found != *negated
        }
        Predicate::IsNull { field, negated } => lookup(feature, field).is_null() != *negated,
        Predicate::Like {
            field,
            pattern,
            negated,
        } => {
            let v = lookup(feature, field);
            if v.is_null() {
                return false;
            }
            pattern.is_match(&v.to_string()) != *negated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature() -> Feature {
        Feature::new(42, None)
            .with_attribute("KIND", "RDS001")
            .with_attribute("LANES", 4)
            .with_attribute("DRIFT", -2.5)
            .with_attribute("NAME", "Main St.")
            .with_attribute("NOTE", FieldValue::Null)
    }

    fn check(expr: &str) -> bool {
        FilterExpr::parse(expr).unwrap().matches(&feature())
    }

    #[test]
    fn test_comparisons() {
        assert!(check("KIND = 'RDS001'"));
        assert!(check("kind <> 'RDS002'"));
        assert!(check("LANES >= 4"));
        assert!(!check("LANES > 4"));
        assert!(check("OBJECTID = 42"));
        assert!(check("FID != 7"));
        assert!(check("DRIFT < -2"));
        assert!(check("\"Lanes\" = 4"));
    }

    #[test]
    fn test_boolean_logic() {
        assert!(check("KIND = 'RDS001' AND (LANES = 2 OR LANES = 4)"));
        assert!(!check("NOT KIND = 'RDS001'"));
        assert!(check("LANES = 2 OR NAME = 'Main St.'"));
        assert!(!check("LANES = 2 OR LANES = 3 AND KIND = 'RDS001'"));
    }

    #[test]
    fn test_in_null_like() {
        assert!(check("KIND IN ('RDS001', 'RDS002')"));
        assert!(check("LANES NOT IN (1, 2)"));
        assert!(check("NOTE IS NULL"));
        assert!(check("NAME IS NOT NULL"));
        assert!(check("MISSING_FIELD IS NULL"));
        assert!(check("NAME LIKE 'main%'"));
        assert!(check("KIND NOT LIKE 'BLD_'"));
        assert!(!check("NOTE = 'x'"));
        assert!(!check("NOTE IN ('x')"));
        assert!(!check("NOTE NOT LIKE 'x%'"));
    }

    #[test]
    fn test_quoted_quote() {
        let f = Feature::new(1, None).with_attribute("NAME", "O'Hare");
        assert!(FilterExpr::parse("NAME = 'O''Hare'").unwrap().matches(&f));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            FilterExpr::parse("KIND = "),
            Err(FilterError::Syntax(_))
        ));
        assert!(matches!(
            FilterExpr::parse("KIND = 'A' LANES = 4"),
            Err(FilterError::Trailing(_))
        ));
        assert!(FilterExpr::parse("(KIND = 'A'").is_err());
        assert!(FilterExpr::parse("LANES >> 1").is_err());
    }

    #[test]
    fn test_unsupported_constructs() {
        for expr in [
            "LANES + 1 = 5",
            "KIND = NAME",
            "UPPER(KIND) = 'RDS001'",
            "KIND LIKE NAME",
            "LANES BETWEEN 1 AND 5",
        ] {
            assert!(
                matches!(FilterExpr::parse(expr), Err(FilterError::Unsupported(_))),
                "{expr}"
            );
        }
    }
}
