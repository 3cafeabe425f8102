use crate::common::Document;
use crate::errors::{ErrorKind, PocketError, PocketResult};
use crate::filter::criteria::{
    compile_pattern, Clause, Condition, Criteria, Operator, DEFAULT_FUZZY_DISTANCE,
    DEFAULT_FUZZY_MIN_SCORE,
};
use serde_json::Value;
use std::sync::Arc;

/// Creates a fluent criteria builder for the specified field path.
///
/// # Arguments
///
/// * `field_name` - The field to filter on, dot separated for nested fields
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::filter::field;
///
/// let adults = collection.find(field("age").gte(18))?;
/// let vip = collection.find(field("tags").has("vip")?)?;
/// ```
pub fn field(field_name: &str) -> FluentCriteria {
    FluentCriteria {
        field_name: field_name.to_string(),
    }
}

/// Criteria that match every document.
pub fn all() -> Criteria {
    Criteria::new()
}

/// Matches documents where every one of `criteria` matches. An empty list
/// matches everything.
pub fn and(criteria: Vec<Criteria>) -> Criteria {
    Criteria::from_clause(Clause::And(criteria))
}

/// Matches documents where at least one of `criteria` matches. An empty list
/// matches nothing.
pub fn or(criteria: Vec<Criteria>) -> Criteria {
    Criteria::from_clause(Clause::Or(criteria))
}

/// Matches documents accepted by a predicate over the whole document.
///
/// The predicate runs inside the storage engine while a scan is in progress,
/// so it must not call back into the same database.
pub fn where_fn<F>(predicate: F) -> Criteria
where
    F: Fn(&Document) -> bool + Send + Sync + 'static,
{
    Criteria::from_clause(Clause::Where(Arc::new(predicate)))
}

/// A fluent builder for conditions on one field.
pub struct FluentCriteria {
    field_name: String,
}

impl FluentCriteria {
    fn with(self, operator: Operator) -> Criteria {
        Criteria::from_clause(Clause::Field {
            path: self.field_name,
            condition: Condition::Operators(vec![operator]),
        })
    }

    /// Matches when the field loosely equals `value`, or contains it when the
    /// field is an array.
    pub fn eq<T: Into<Value>>(self, value: T) -> Criteria {
        Criteria::from_clause(Clause::Field {
            path: self.field_name,
            condition: Condition::Equals(value.into()),
        })
    }

    pub fn ne<T: Into<Value>>(self, value: T) -> Criteria {
        self.with(Operator::Ne(value.into()))
    }

    pub fn gt<T: Into<Value>>(self, value: T) -> Criteria {
        self.with(Operator::Gt(value.into()))
    }

    pub fn gte<T: Into<Value>>(self, value: T) -> Criteria {
        self.with(Operator::Gte(value.into()))
    }

    pub fn lt<T: Into<Value>>(self, value: T) -> Criteria {
        self.with(Operator::Lt(value.into()))
    }

    pub fn lte<T: Into<Value>>(self, value: T) -> Criteria {
        self.with(Operator::Lte(value.into()))
    }

    /// Matches when the field is one of `values`. For array fields, matches
    /// when the two sets intersect.
    pub fn in_array<T: Into<Value>>(self, values: Vec<T>) -> Criteria {
        let values = values.into_iter().map(Into::into).collect();
        self.with(Operator::In(Value::Array(values)))
    }

    /// Matches when the field is none of `values`.
    pub fn not_in_array<T: Into<Value>>(self, values: Vec<T>) -> Criteria {
        let values = values.into_iter().map(Into::into).collect();
        self.with(Operator::Nin(Value::Array(values)))
    }

    /// Matches when the array field holds `value`.
    ///
    /// # Errors
    ///
    /// Returns `FilterError` when `value` is itself an array.
    pub fn has<T: Into<Value>>(self, value: T) -> PocketResult<Criteria> {
        let value = value.into();
        if value.is_array() {
            log::error!("Invalid argument for $has on {}, array not supported", self.field_name);
            return Err(PocketError::new(
                "Invalid argument for $has, array not supported",
                ErrorKind::FilterError,
            ));
        }
        Ok(self.with(Operator::Has(value)))
    }

    /// Matches when the array field holds every one of `values`.
    pub fn all<T: Into<Value>>(self, values: Vec<T>) -> Criteria {
        self.with(Operator::All(values.into_iter().map(Into::into).collect()))
    }

    /// Matches when the array field has exactly `size` elements.
    pub fn size(self, size: usize) -> Criteria {
        self.with(Operator::Size(size as i64))
    }

    pub fn exists(self, exists: bool) -> Criteria {
        self.with(Operator::Exists(exists))
    }

    /// Matches the field against a pattern. `/pattern/flags` honours its
    /// flags, a bare pattern is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns `FilterError` for an invalid pattern.
    pub fn regex(self, pattern: &str) -> PocketResult<Criteria> {
        let regex = compile_pattern(&Value::String(pattern.to_string()))?;
        Ok(self.with(Operator::Regex(regex)))
    }

    /// Matches when the field does not match the pattern.
    pub fn not_regex(self, pattern: &str) -> PocketResult<Criteria> {
        let regex = compile_pattern(&Value::String(pattern.to_string()))?;
        Ok(self.with(Operator::NotRegex(regex)))
    }

    /// Matches when `field % divisor == remainder`.
    ///
    /// # Errors
    ///
    /// Returns `FilterError` when `divisor` is zero.
    pub fn modulo(self, divisor: i64, remainder: i64) -> PocketResult<Criteria> {
        if divisor == 0 {
            log::error!("Invalid argument for $mod on {}, divisor is zero", self.field_name);
            return Err(PocketError::new(
                "Invalid argument for $mod, divisor is zero",
                ErrorKind::FilterError,
            ));
        }
        Ok(self.with(Operator::Mod { divisor, remainder }))
    }

    /// Matches when a predicate accepts the field value.
    ///
    /// Like [`where_fn`], the predicate may run inside the storage engine
    /// during a scan, so it must not call back into the same database.
    pub fn satisfies<F>(self, predicate: F) -> Criteria
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.with(Operator::Func(Arc::new(predicate)))
    }

    /// Fuzzy text match with the default distance of 3 and minimum score of 0.7.
    pub fn fuzzy(self, search: &str) -> Criteria {
        self.fuzzy_with(search, DEFAULT_FUZZY_DISTANCE, DEFAULT_FUZZY_MIN_SCORE)
    }

    pub fn fuzzy_with(self, search: &str, distance: usize, min_score: f64) -> Criteria {
        self.with(Operator::Fuzzy {
            search: search.to_string(),
            distance,
            min_score,
        })
    }
}

/// Conversion into [`Criteria`], accepted by every query entry point.
///
/// Implemented for criteria built with the fluent API, for JSON values in the
/// query grammar and for documents used as equality templates.
pub trait IntoCriteria {
    fn into_criteria(self) -> PocketResult<Criteria>;
}

impl IntoCriteria for Criteria {
    fn into_criteria(self) -> PocketResult<Criteria> {
        Ok(self)
    }
}

impl IntoCriteria for PocketResult<Criteria> {
    fn into_criteria(self) -> PocketResult<Criteria> {
        self
    }
}

impl IntoCriteria for Value {
    fn into_criteria(self) -> PocketResult<Criteria> {
        Criteria::from_json(&self)
    }
}

impl IntoCriteria for &Value {
    fn into_criteria(self) -> PocketResult<Criteria> {
        Criteria::from_json(self)
    }
}

impl IntoCriteria for Document {
    fn into_criteria(self) -> PocketResult<Criteria> {
        Criteria::from_json(&self.into_value())
    }
}

impl IntoCriteria for &Document {
    fn into_criteria(self) -> PocketResult<Criteria> {
        Criteria::from_json(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use serde_json::json;

    #[test]
    fn test_eq_builds_equality() {
        let criteria = field("name").eq("Alice");
        assert!(matches!(
            &criteria.clauses()[0],
            Clause::Field { condition: Condition::Equals(Value::String(s)), .. } if s == "Alice"
        ));
    }

    #[test]
    fn test_has_rejects_array() {
        let err = field("tags").has(json!(["a"])).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::FilterError);
    }

    #[test]
    fn test_modulo_rejects_zero() {
        assert!(field("n").modulo(0, 1).is_err());
        assert!(field("n").modulo(2, 1).is_ok());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(field("name").regex("[").is_err());
    }

    #[test]
    fn test_or_combinator() {
        let criteria = field("a").eq(1).or(field("b").eq(2));
        assert!(criteria.matches(&doc! { "b": 2 }));
        assert!(!criteria.matches(&doc! { "c": 3 }));
    }

    #[test]
    fn test_into_criteria_from_json_and_document() {
        let from_json = json!({ "age": { "$gt": 1 } }).into_criteria().unwrap();
        assert!(from_json.matches(&doc! { "age": 2 }));

        let from_doc = doc! { "name": "Alice" }.into_criteria().unwrap();
        assert!(from_doc.matches(&doc! { "name": "Alice", "age": 3 }));
    }

    #[test]
    fn test_into_criteria_passes_errors_through() {
        let result = field("tags").has(json!([1])).into_criteria();
        assert!(result.is_err());
    }

    #[test]
    fn test_all_matches_everything() {
        assert!(all().is_empty());
        assert!(all().matches(&doc! { "x": 1 }));
    }

    #[test]
    fn test_fuzzy_builder() {
        let criteria = field("bio").fuzzy("rust");
        assert!(criteria.matches(&doc! { "bio": "I write Rust" }));
    }
}
