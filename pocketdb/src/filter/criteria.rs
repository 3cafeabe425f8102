use crate::common::{numeric_value, Document};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A predicate over a whole document, used by `$where`.
pub type DocumentPredicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// A predicate over a single field value, used by `$func`, `$fn` and `$f`.
pub type ValuePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub(crate) const DEFAULT_FUZZY_DISTANCE: usize = 3;
pub(crate) const DEFAULT_FUZZY_MIN_SCORE: f64 = 0.7;

/// A parsed query expression.
///
/// Criteria are a conjunction of clauses evaluated in order. A clause is
/// either a composition (`$and`, `$or`), a document predicate (`$where`) or a
/// condition on a field path. An empty criteria matches every document.
///
/// Criteria can be built from the JSON grammar:
///
/// ```rust,ignore
/// use pocketdb::filter::Criteria;
/// use serde_json::json;
///
/// let criteria = Criteria::from_json(&json!({
///     "age": { "$gte": 18 },
///     "$or": [{ "city": "Boston" }, { "tags": { "$has": "vip" } }]
/// }))?;
/// ```
///
/// or with the fluent builder in [`crate::filter::field`]. Operators that
/// need a closure (`$where`, `$func`) are only available through the builder.
#[derive(Clone, Default)]
pub struct Criteria {
    clauses: Vec<Clause>,
}

#[derive(Clone)]
pub(crate) enum Clause {
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Where(DocumentPredicate),
    Field { path: String, condition: Condition },
}

#[derive(Clone)]
pub(crate) enum Condition {
    /// A bare value: loose equality, or membership when the field is an array.
    Equals(Value),
    /// An operator object such as `{"$gt": 1, "$lt": 5}`.
    Operators(Vec<Operator>),
}

#[derive(Clone)]
pub(crate) enum Operator {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Value),
    Nin(Value),
    Has(Value),
    All(Vec<Value>),
    Regex(Regex),
    NotRegex(Regex),
    Size(i64),
    Mod { divisor: i64, remainder: i64 },
    Func(ValuePredicate),
    Exists(bool),
    Fuzzy {
        search: String,
        distance: usize,
        min_score: f64,
    },
}

impl Criteria {
    /// Criteria that match every document.
    pub fn new() -> Self {
        Criteria { clauses: Vec::new() }
    }

    /// Parses criteria from the JSON query grammar.
    ///
    /// `null` and `{}` match everything.
    ///
    /// # Errors
    ///
    /// * `UnsupportedOperator` for an operator name that does not exist
    /// * `FilterError` for malformed operands, such as a `$has` needle that is
    ///   an array, a `$mod` that is not a pair, or an invalid pattern
    pub fn from_json(value: &Value) -> PocketResult<Self> {
        match value {
            Value::Null => Ok(Criteria::new()),
            Value::Object(map) => parse_criteria(map),
            other => {
                log::error!("Criteria must be a JSON object, found {}", other);
                Err(PocketError::new(
                    "Criteria must be a JSON object",
                    ErrorKind::FilterError,
                ))
            }
        }
    }

    /// Returns true if these criteria match every document.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Combines two criteria so that both must match.
    pub fn and(mut self, other: Criteria) -> Criteria {
        self.clauses.extend(other.clauses);
        self
    }

    /// Combines two criteria so that either may match.
    pub fn or(self, other: Criteria) -> Criteria {
        Criteria::from_clause(Clause::Or(vec![self, other]))
    }

    pub(crate) fn from_clause(clause: Clause) -> Self {
        Criteria {
            clauses: vec![clause],
        }
    }

    pub(crate) fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
}

impl Debug for Criteria {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.clauses.iter()).finish()
    }
}

impl Debug for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Clause::And(items) => f.debug_tuple("$and").field(items).finish(),
            Clause::Or(items) => f.debug_tuple("$or").field(items).finish(),
            Clause::Where(_) => write!(f, "$where(<predicate>)"),
            Clause::Field { path, condition } => match condition {
                Condition::Equals(value) => write!(f, "{} == {}", path, value),
                Condition::Operators(ops) => write!(f, "{} {:?}", path, ops),
            },
        }
    }
}

impl Debug for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Eq(v) => write!(f, "$eq {}", v),
            Operator::Ne(v) => write!(f, "$ne {}", v),
            Operator::Gt(v) => write!(f, "$gt {}", v),
            Operator::Gte(v) => write!(f, "$gte {}", v),
            Operator::Lt(v) => write!(f, "$lt {}", v),
            Operator::Lte(v) => write!(f, "$lte {}", v),
            Operator::In(v) => write!(f, "$in {}", v),
            Operator::Nin(v) => write!(f, "$nin {}", v),
            Operator::Has(v) => write!(f, "$has {}", v),
            Operator::All(v) => write!(f, "$all {:?}", v),
            Operator::Regex(re) => write!(f, "$regex {}", re),
            Operator::NotRegex(re) => write!(f, "$not {}", re),
            Operator::Size(n) => write!(f, "$size {}", n),
            Operator::Mod { divisor, remainder } => write!(f, "$mod [{}, {}]", divisor, remainder),
            Operator::Func(_) => write!(f, "$func(<predicate>)"),
            Operator::Exists(b) => write!(f, "$exists {}", b),
            Operator::Fuzzy {
                search,
                distance,
                min_score,
            } => write!(f, "$fuzzy {} ({}, {})", search, distance, min_score),
        }
    }
}

fn parse_criteria(map: &Map<String, Value>) -> PocketResult<Criteria> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Clause::And(parse_list(key, value)?),
            "$or" => Clause::Or(parse_list(key, value)?),
            "$where" => {
                log::error!("$where requires a predicate, build it with filter::where_fn");
                return Err(PocketError::new(
                    "$where requires a predicate function",
                    ErrorKind::FilterError,
                ));
            }
            op if op.starts_with('$') => return Err(unsupported(op)),
            path => Clause::Field {
                path: path.to_string(),
                condition: parse_condition(value)?,
            },
        };
        clauses.push(clause);
    }
    Ok(Criteria { clauses })
}

fn parse_list(key: &str, value: &Value) -> PocketResult<Vec<Criteria>> {
    let Value::Array(items) = value else {
        log::error!("{} expects an array of criteria, found {}", key, value);
        return Err(PocketError::new(
            &format!("{} expects an array of criteria", key),
            ErrorKind::FilterError,
        ));
    };
    items.iter().map(Criteria::from_json).collect()
}

fn parse_condition(value: &Value) -> PocketResult<Condition> {
    let Value::Object(map) = value else {
        return Ok(Condition::Equals(value.clone()));
    };

    let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 && !map.is_empty() {
        return Ok(Condition::Equals(value.clone()));
    }
    if operator_keys != map.len() {
        log::error!("Cannot mix operators and plain keys in {}", value);
        return Err(PocketError::new(
            "Cannot mix operators and plain keys in a field condition",
            ErrorKind::FilterError,
        ));
    }

    let mut operators = Vec::with_capacity(map.len());
    for (name, operand) in map {
        if name == "$options" {
            continue;
        }
        operators.push(parse_operator(name, operand)?);
    }
    Ok(Condition::Operators(operators))
}

pub(crate) fn parse_operator(name: &str, operand: &Value) -> PocketResult<Operator> {
    let operator = match name {
        "$eq" => Operator::Eq(operand.clone()),
        "$ne" => Operator::Ne(operand.clone()),
        "$gt" => Operator::Gt(operand.clone()),
        "$gte" => Operator::Gte(operand.clone()),
        "$lt" => Operator::Lt(operand.clone()),
        "$lte" => Operator::Lte(operand.clone()),
        "$in" => Operator::In(operand.clone()),
        "$nin" => Operator::Nin(operand.clone()),
        "$has" => {
            if operand.is_array() {
                return Err(filter_error("Invalid argument for $has, array not supported"));
            }
            Operator::Has(operand.clone())
        }
        "$all" => match operand {
            Value::Array(items) => Operator::All(items.clone()),
            _ => return Err(filter_error("Invalid argument for $all, option must be an array")),
        },
        "$regex" | "$preg" | "$match" => Operator::Regex(compile_pattern(operand)?),
        "$not" => Operator::NotRegex(compile_pattern(operand)?),
        "$size" => match numeric_value(operand) {
            Some(n) => Operator::Size(n.trunc() as i64),
            None => return Err(filter_error("Invalid argument for $size, expected a number")),
        },
        "$mod" => parse_mod(operand)?,
        "$func" | "$fn" | "$f" => {
            return Err(filter_error(
                "Function operators require a predicate, build them with field(..).satisfies",
            ))
        }
        "$exists" => Operator::Exists(crate::common::is_truthy(operand)),
        "$fuzzy" | "$text" => parse_fuzzy(operand)?,
        other => return Err(unsupported(other)),
    };
    Ok(operator)
}

fn parse_mod(operand: &Value) -> PocketResult<Operator> {
    let Value::Array(items) = operand else {
        return Err(filter_error("Invalid argument for $mod, option must be an array"));
    };
    if items.len() != 2 {
        return Err(filter_error(
            "Invalid argument for $mod, expected [divisor, remainder]",
        ));
    }
    let divisor = numeric_value(&items[0]).map(|n| n.trunc() as i64);
    let remainder = numeric_value(&items[1]).map(|n| n.trunc() as i64);
    match (divisor, remainder) {
        (Some(0), _) => Err(filter_error("Invalid argument for $mod, divisor is zero")),
        (Some(divisor), Some(remainder)) => Ok(Operator::Mod { divisor, remainder }),
        _ => Err(filter_error("Invalid argument for $mod, expected numbers")),
    }
}

fn parse_fuzzy(operand: &Value) -> PocketResult<Operator> {
    let mut distance = DEFAULT_FUZZY_DISTANCE;
    let mut min_score = DEFAULT_FUZZY_MIN_SCORE;

    let search = match operand {
        Value::String(s) => s.clone(),
        Value::Object(options) => {
            if let Some(score) = options.get("$minScore").and_then(numeric_value) {
                min_score = score;
            }
            if let Some(d) = options.get("$distance").and_then(numeric_value) {
                distance = d.max(0.0) as usize;
            }
            match options.get("$search").or_else(|| options.get("search")) {
                Some(Value::String(s)) => s.clone(),
                _ => return Err(filter_error("$fuzzy requires a $search string")),
            }
        }
        _ => return Err(filter_error("$fuzzy requires a search string")),
    };

    Ok(Operator::Fuzzy {
        search,
        distance,
        min_score,
    })
}

/// Compiles a pattern operand.
///
/// `/pattern/flags` honours the `i`, `m`, `s` and `x` flags. A bare pattern is
/// matched case-insensitively. Patterns are always Unicode aware.
pub(crate) fn compile_pattern(operand: &Value) -> PocketResult<Regex> {
    let Value::String(raw) = operand else {
        return Err(filter_error("Pattern operators expect a string"));
    };

    let (pattern, flags) = match split_delimited(raw) {
        Some((pattern, flags)) => (pattern, flags),
        None => (raw.as_str(), "i"),
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => &mut builder,
        };
    }
    builder.build().map_err(|e| {
        log::error!("Invalid pattern {}: {}", raw, e);
        PocketError::from(e)
    })
}

fn split_delimited(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    Some((&rest[..end], &rest[end + 1..]))
}

fn filter_error(message: &str) -> PocketError {
    log::error!("{}", message);
    PocketError::new(message, ErrorKind::FilterError)
}

fn unsupported(op: &str) -> PocketError {
    log::error!("Unsupported criteria operator {}", op);
    PocketError::new(
        &format!("Condition not valid, {} is not a supported operator", op),
        ErrorKind::UnsupportedOperator,
    )
}
