//! Choice rule representation and parsing.

use serde_json::Value;

/// A top-level choice: a rule plus the state it routes to.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceBranch {
    pub rule: ChoiceRule,
    pub next: String,
}

/// A boolean expression over the state's effective input.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceRule {
    And(Vec<ChoiceRule>),
    Or(Vec<ChoiceRule>),
    Not(Box<ChoiceRule>),
    Compare {
        variable: String,
        kind: ValueKind,
        op: CompareOp,
        operand: Operand,
    },
    Test {
        variable: String,
        test: TypeTest,
        expected: bool,
    },
}

/// Which family a comparison operator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Numeric,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    LessThan,
    GreaterThan,
    LessThanEquals,
    GreaterThanEquals,
    /// `StringMatches`: `*` wildcard, `\*` for a literal star.
    Matches,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// `…Path` operators compare against another location in the input.
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTest {
    IsNull,
    IsPresent,
    IsNumeric,
    IsString,
    IsBoolean,
    IsTimestamp,
}

/// Keys on a rule object that are not operators.
const NON_OPERATOR_KEYS: &[&str] = &["Variable", "Next", "Comment"];

/// Parse one entry of a Choice state's `Choices` array.
pub fn parse_choice_branch(v: &Value) -> Result<ChoiceBranch, String> {
    let next = v
        .get("Next")
        .and_then(|n| n.as_str())
        .ok_or_else(|| "choice rule missing 'Next'".to_string())?
        .to_string();
    let rule = parse_rule(v)?;
    Ok(ChoiceBranch { rule, next })
}

/// Parse a (possibly nested) choice rule.
pub fn parse_rule(v: &Value) -> Result<ChoiceRule, String> {
    let obj = v
        .as_object()
        .ok_or_else(|| "choice rule must be a JSON object".to_string())?;

    if let Some(rules) = obj.get("And") {
        return Ok(ChoiceRule::And(parse_rule_list("And", rules)?));
    }
    if let Some(rules) = obj.get("Or") {
        return Ok(ChoiceRule::Or(parse_rule_list("Or", rules)?));
    }
    if let Some(inner) = obj.get("Not") {
        if inner.get("Next").is_some() {
            return Err("nested rule under 'Not' cannot declare 'Next'".to_string());
        }
        return Ok(ChoiceRule::Not(Box::new(parse_rule(inner)?)));
    }

    let variable = obj
        .get("Variable")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "choice rule missing 'Variable'".to_string())?
        .to_string();
    if !variable.starts_with('$') {
        return Err(format!("'Variable' must be a path, got '{}'", variable));
    }

    let mut operators = obj
        .iter()
        .filter(|(k, _)| !NON_OPERATOR_KEYS.contains(&k.as_str()));
    let (key, operand) = operators
        .next()
        .ok_or_else(|| format!("choice rule on '{}' has no comparison operator", variable))?;
    if let Some((extra, _)) = operators.next() {
        return Err(format!(
            "choice rule on '{}' has more than one operator ('{}', '{}')",
            variable, key, extra
        ));
    }

    if let Some(test) = parse_type_test(key) {
        let expected = operand
            .as_bool()
            .ok_or_else(|| format!("'{}' expects a boolean", key))?;
        return Ok(ChoiceRule::Test {
            variable,
            test,
            expected,
        });
    }

    let (kind, op, is_path) =
        parse_operator(key).ok_or_else(|| format!("unknown comparison operator '{}'", key))?;

    let operand = if is_path {
        let path = operand
            .as_str()
            .filter(|p| p.starts_with('$'))
            .ok_or_else(|| format!("'{}' expects a path string", key))?;
        Operand::Path(path.to_string())
    } else {
        check_literal(key, kind, operand)?;
        Operand::Literal(operand.clone())
    };

    Ok(ChoiceRule::Compare {
        variable,
        kind,
        op,
        operand,
    })
}

fn parse_rule_list(key: &str, v: &Value) -> Result<Vec<ChoiceRule>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("'{}' must be an array of rules", key))?;
    if arr.is_empty() {
        return Err(format!("'{}' must contain at least one rule", key));
    }
    arr.iter()
        .map(|r| {
            if r.get("Next").is_some() {
                return Err(format!("nested rule under '{}' cannot declare 'Next'", key));
            }
            parse_rule(r)
        })
        .collect()
}

fn parse_type_test(key: &str) -> Option<TypeTest> {
    match key {
        "IsNull" => Some(TypeTest::IsNull),
        "IsPresent" => Some(TypeTest::IsPresent),
        "IsNumeric" => Some(TypeTest::IsNumeric),
        "IsString" => Some(TypeTest::IsString),
        "IsBoolean" => Some(TypeTest::IsBoolean),
        "IsTimestamp" => Some(TypeTest::IsTimestamp),
        _ => None,
    }
}

/// Split an operator key like `NumericGreaterThanEqualsPath` into its parts.
fn parse_operator(key: &str) -> Option<(ValueKind, CompareOp, bool)> {
    let (base, is_path) = match key.strip_suffix("Path") {
        Some(base) => (base, true),
        None => (key, false),
    };

    let families = [
        ("String", ValueKind::String),
        ("Numeric", ValueKind::Numeric),
        ("Boolean", ValueKind::Boolean),
        ("Timestamp", ValueKind::Timestamp),
    ];
    let (kind, rest) = families
        .iter()
        .find_map(|(prefix, kind)| base.strip_prefix(prefix).map(|rest| (*kind, rest)))?;

    let op = match rest {
        "Equals" => CompareOp::Equals,
        "LessThan" => CompareOp::LessThan,
        "GreaterThan" => CompareOp::GreaterThan,
        "LessThanEquals" => CompareOp::LessThanEquals,
        "GreaterThanEquals" => CompareOp::GreaterThanEquals,
        "Matches" => CompareOp::Matches,
        _ => return None,
    };

    match (kind, op) {
        (ValueKind::String, CompareOp::Matches) if !is_path => Some((kind, op, is_path)),
        (_, CompareOp::Matches) => None,
        (ValueKind::Boolean, CompareOp::Equals) => Some((kind, op, is_path)),
        (ValueKind::Boolean, _) => None,
        _ => Some((kind, op, is_path)),
    }
}

fn check_literal(key: &str, kind: ValueKind, v: &Value) -> Result<(), String> {
    let ok = match kind {
        ValueKind::String => v.is_string(),
        ValueKind::Numeric => v.is_number(),
        ValueKind::Boolean => v.is_boolean(),
        ValueKind::Timestamp => v.as_str().and_then(parse_timestamp).is_some(),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("'{}' has an operand of the wrong type: {}", key, v))
    }
}

/// Parse an RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok()
}
