//! Query-string access for raw extraction.
//!
//! Repeated keys (`?ids=1&ids=2`) and comma-separated values (`?ids=1,2`)
//! are both accepted for list parameters.

use std::str::FromStr;

use actix_web::HttpRequest;
use url::form_urlencoded;

use super::error::ApiError;

/// Decoded `key=value` pairs in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn from_request(request: &HttpRequest) -> Self {
        Self::parse(request.query_string())
    }

    pub fn parse(query: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect(),
        }
    }

    /// Last value supplied for `name`, ignoring empty values.
    pub fn last(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.as_str())
    }

    /// Every value for `name`, split on commas, without blanks.
    pub fn all(&self, name: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(key, _)| key == name)
            .flat_map(|(_, value)| value.split(','))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Parse the last value for `name` as an integer.
    ///
    /// # Errors
    /// Returns a `BadRequest` naming the parameter when it is not an integer.
    pub fn integer<T: FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.last(name)
            .map(|raw| parse_integer(name, raw))
            .transpose()
    }

    /// Parse every value for `name` as an integer.
    ///
    /// # Errors
    /// Returns a `BadRequest` for the first value that is not an integer.
    pub fn integers<T: FromStr>(&self, name: &str) -> Result<Vec<T>, ApiError> {
        self.all(name)
            .iter()
            .map(|raw| parse_integer(name, raw))
            .collect()
    }
}

fn parse_integer<T: FromStr>(name: &str, raw: &str) -> Result<T, ApiError> {
    raw.trim().parse().map_err(|_| {
        ApiError::bad_request(format!(
            "Query parameter `{name}` must be an integer, got `{raw}`."
        ))
    })
}
