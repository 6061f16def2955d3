//! Declarative validation of decoded request values.
//!
//! Request types describe their constraints by implementing [`Validate`]. The
//! [`Validator`] records at most one violation per field (the first declared
//! constraint that fails), keeps declaration order, and folds everything into
//! a single `BadRequest` whose message has one sentence per violated field.
//! Field names are always the wire names clients send.

use super::error::ApiError;

/// Constraint declarations for a request type.
pub trait Validate {
    /// Declare every constraint on `rules`, in the order messages should be
    /// reported.
    fn validate(&self, rules: &mut Validator);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    Required,
    Min(i64),
    Max(i64),
    MinItems(usize),
    MaxItems(usize),
    OneOf(&'static [&'static str]),
    Other(&'static str),
}

impl Rule {
    fn sentence(&self, field: &str) -> String {
        match self {
            Self::Required => format!("Field `{field}` is required."),
            Self::Min(min) => format!("Field `{field}` must be greater than or equal to {min}."),
            Self::Max(max) => format!("Field `{field}` must be less than or equal to {max}."),
            Self::MinItems(min) => {
                format!("Field `{field}` must contain at least {min} element(s).")
            }
            Self::MaxItems(max) => {
                format!("Field `{field}` must contain at most {max} element(s).")
            }
            Self::OneOf(allowed) => format!(
                "Field `{field}` should be one of the following values: {}.",
                allowed.join(" ")
            ),
            Self::Other(tag) => format!("Validation on field `{field}` failed on the `{tag}` tag."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Violation {
    field: &'static str,
    rule: Rule,
}

/// Collects constraint violations for one request value.
#[derive(Debug, Default)]
pub struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    /// Start an empty validation pass.
    pub fn new() -> Self {
        Self::default()
    }

    fn has_failed(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    fn check(&mut self, field: &'static str, ok: bool, rule: Rule) -> &mut Self {
        if !ok && !self.has_failed(field) {
            self.violations.push(Violation { field, rule });
        }
        self
    }

    /// The field must be present.
    pub fn required(&mut self, field: &'static str, present: bool) -> &mut Self {
        self.check(field, present, Rule::Required)
    }

    /// Numeric lower bound, inclusive.
    pub fn min(&mut self, field: &'static str, value: i64, min: i64) -> &mut Self {
        self.check(field, value >= min, Rule::Min(min))
    }

    /// Numeric upper bound, inclusive.
    pub fn max(&mut self, field: &'static str, value: i64, max: i64) -> &mut Self {
        self.check(field, value <= max, Rule::Max(max))
    }

    /// Minimum collection length.
    pub fn min_items(&mut self, field: &'static str, len: usize, min: usize) -> &mut Self {
        self.check(field, len >= min, Rule::MinItems(min))
    }

    /// Maximum collection length.
    pub fn max_items(&mut self, field: &'static str, len: usize, max: usize) -> &mut Self {
        self.check(field, len <= max, Rule::MaxItems(max))
    }

    /// The value must be one of `allowed`.
    pub fn one_of(
        &mut self,
        field: &'static str,
        value: &str,
        allowed: &'static [&'static str],
    ) -> &mut Self {
        self.check(field, allowed.contains(&value), Rule::OneOf(allowed))
    }

    /// Any other predicate, reported with a generic sentence naming `tag`.
    pub fn satisfies(&mut self, field: &'static str, ok: bool, tag: &'static str) -> &mut Self {
        self.check(field, ok, Rule::Other(tag))
    }

    /// Fold the recorded violations into a single error.
    ///
    /// # Errors
    /// Returns a `BadRequest` listing every violated field.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.violations.is_empty() {
            return Ok(());
        }
        let mut message = String::new();
        for violation in &self.violations {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&violation.rule.sentence(violation.field));
        }
        Err(ApiError::bad_request(message))
    }
}

/// Validate `value` against its declared constraints.
///
/// # Examples
/// ```
/// use queue_admin::inbound::http::validation::{Validate, Validator, validate};
///
/// struct Page {
///     limit: i64,
/// }
///
/// impl Validate for Page {
///     fn validate(&self, rules: &mut Validator) {
///         rules.min("limit", self.limit, 1).max("limit", self.limit, 1000);
///     }
/// }
///
/// let err = validate(&Page { limit: 0 }).expect_err("limit is too small");
/// assert_eq!(err.message(), "Field `limit` must be greater than or equal to 1.");
/// ```
///
/// # Errors
/// Returns a `BadRequest` when any constraint fails.
pub fn validate<T: Validate + ?Sized>(value: &T) -> Result<(), ApiError> {
    let mut rules = Validator::new();
    value.validate(&mut rules);
    rules.finish()
}

#[cfg(test)]
mod tests {
    //! Message shape and ordering coverage.

    use super::*;
    use crate::inbound::http::error::ErrorKind;
    use rstest::rstest;

    const COLOURS: &[&str] = &["red", "green"];

    struct Sample {
        ids: Vec<i64>,
        limit: i64,
        colour: String,
        name: Option<String>,
    }

    impl Validate for Sample {
        fn validate(&self, rules: &mut Validator) {
            rules
                .min_items("ids", self.ids.len(), 1)
                .max_items("ids", self.ids.len(), 2)
                .min("limit", self.limit, 1)
                .max("limit", self.limit, 100)
                .one_of("colour", &self.colour, COLOURS)
                .required("name", self.name.is_some())
                .satisfies(
                    "name",
                    self.name.as_deref().is_some_and(|n| n.is_ascii()),
                    "ascii",
                );
        }
    }

    fn valid() -> Sample {
        Sample {
            ids: vec![1],
            limit: 10,
            colour: "red".to_owned(),
            name: Some("ok".to_owned()),
        }
    }

    #[rstest]
    fn valid_value_passes() {
        assert!(validate(&valid()).is_ok());
    }

    #[rstest]
    fn every_violated_field_yields_one_sentence_in_declaration_order() {
        let sample = Sample {
            ids: Vec::new(),
            limit: 0,
            colour: "blue".to_owned(),
            name: None,
        };

        let first = validate(&sample).expect_err("all fields are invalid");
        let second = validate(&sample).expect_err("all fields are invalid");

        assert_eq!(first.kind(), ErrorKind::BadRequest);
        assert_eq!(
            first.message(),
            "Field `ids` must contain at least 1 element(s). \
             Field `limit` must be greater than or equal to 1. \
             Field `colour` should be one of the following values: red green. \
             Field `name` is required."
        );
        assert_eq!(first.message(), second.message());
    }

    #[rstest]
    #[case(vec![1, 2, 3], 10, "Field `ids` must contain at most 2 element(s).")]
    #[case(vec![1], 101, "Field `limit` must be less than or equal to 100.")]
    fn upper_bounds_are_reported(
        #[case] ids: Vec<i64>,
        #[case] limit: i64,
        #[case] expected: &str,
    ) {
        let sample = Sample {
            ids,
            limit,
            ..valid()
        };
        let err = validate(&sample).expect_err("bound exceeded");
        assert_eq!(err.message(), expected);
    }

    #[rstest]
    fn unsupported_constraint_falls_back_to_generic_sentence() {
        let sample = Sample {
            name: Some("ünïcode".to_owned()),
            ..valid()
        };
        let err = validate(&sample).expect_err("non-ascii name");
        assert_eq!(
            err.message(),
            "Validation on field `name` failed on the `ascii` tag."
        );
    }
}
