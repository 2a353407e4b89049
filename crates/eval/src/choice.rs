//! Choice rule evaluator.
//!
//! Evaluates a [`ChoiceRule`] tree against a Choice state's effective input.
//! A variable or path operand that selects nothing makes the comparison
//! false rather than failing the state; only malformed paths are errors.

use std::cmp::Ordering;

use serde_json::Value;

use crate::datapath::{lookup, DataPathError};
use crate::types::choice::parse_timestamp;
use crate::types::{ChoiceBranch, ChoiceRule, CompareOp, Operand, TypeTest, ValueKind};

/// Return the `Next` of the first branch whose rule holds.
pub fn first_match<'a>(
    choices: &'a [ChoiceBranch],
    input: &Value,
    context: &Value,
) -> Result<Option<&'a str>, DataPathError> {
    for branch in choices {
        if eval_rule(&branch.rule, input, context)? {
            return Ok(Some(&branch.next));
        }
    }
    Ok(None)
}

/// Evaluate a single rule.
pub fn eval_rule(rule: &ChoiceRule, input: &Value, context: &Value) -> Result<bool, DataPathError> {
    match rule {
        ChoiceRule::And(rules) => {
            for r in rules {
                if !eval_rule(r, input, context)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ChoiceRule::Or(rules) => {
            for r in rules {
                if eval_rule(r, input, context)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ChoiceRule::Not(inner) => Ok(!eval_rule(inner, input, context)?),

        ChoiceRule::Test {
            variable,
            test,
            expected,
        } => {
            let value = lookup(variable, input, context)?;
            let actual = match test {
                TypeTest::IsPresent => value.is_some(),
                TypeTest::IsNull => matches!(value, Some(Value::Null)),
                TypeTest::IsNumeric => matches!(value, Some(Value::Number(_))),
                TypeTest::IsString => matches!(value, Some(Value::String(_))),
                TypeTest::IsBoolean => matches!(value, Some(Value::Bool(_))),
                TypeTest::IsTimestamp => value
                    .and_then(|v| v.as_str())
                    .and_then(parse_timestamp)
                    .is_some(),
            };
            Ok(actual == *expected)
        }

        ChoiceRule::Compare {
            variable,
            kind,
            op,
            operand,
        } => {
            let Some(left) = lookup(variable, input, context)? else {
                return Ok(false);
            };
            let right = match operand {
                Operand::Literal(v) => v,
                Operand::Path(p) => match lookup(p, input, context)? {
                    Some(v) => v,
                    None => return Ok(false),
                },
            };
            Ok(compare(*kind, *op, left, right))
        }
    }
}

/// Compare two values within an operator family. Values of the wrong type
/// never match.
fn compare(kind: ValueKind, op: CompareOp, left: &Value, right: &Value) -> bool {
    if op == CompareOp::Matches {
        return match (left.as_str(), right.as_str()) {
            (Some(l), Some(pattern)) => wildcard_match(pattern, l),
            _ => false,
        };
    }

    let ordering = match kind {
        ValueKind::String => match (left.as_str(), right.as_str()) {
            (Some(l), Some(r)) => Some(l.cmp(r)),
            _ => None,
        },
        ValueKind::Numeric => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
        ValueKind::Boolean => match (left.as_bool(), right.as_bool()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => None,
        },
        ValueKind::Timestamp => {
            match (
                left.as_str().and_then(parse_timestamp),
                right.as_str().and_then(parse_timestamp),
            ) {
                (Some(l), Some(r)) => Some(l.cmp(&r)),
                _ => None,
            }
        }
    };

    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        CompareOp::Equals => ordering == Ordering::Equal,
        CompareOp::LessThan => ordering == Ordering::Less,
        CompareOp::GreaterThan => ordering == Ordering::Greater,
        CompareOp::LessThanEquals => ordering != Ordering::Greater,
        CompareOp::GreaterThanEquals => ordering != Ordering::Less,
        CompareOp::Matches => false,
    }
}

/// `StringMatches` semantics: `*` matches any run of characters, `\*` is a
/// literal star and `\\` a literal backslash.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    // Tokenize: Some(c) is a literal char, None is a wildcard.
    let mut tokens: Vec<Option<char>> = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => tokens.push(Some(escaped)),
                None => tokens.push(Some('\\')),
            },
            '*' => tokens.push(None),
            other => tokens.push(Some(other)),
        }
    }

    let text: Vec<char> = text.chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(Some(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            Some(None) => {
                backtrack = Some((p, t));
                p += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    p = bp + 1;
                    t = bt + 1;
                    backtrack = Some((bp, bt + 1));
                }
                None => return false,
            },
        }
    }
    tokens[p..].iter().all(|tok| tok.is_none())
}
