//! `:name` parameters for raw SQL.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::builder::BoundStatement;
use super::platform::Platform;
use crate::error::{QuarryError, Result};
use crate::value::Value;

// String literals and `::` casts are matched first so they are left untouched.
static NAMED_PARAMETER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'(?:[^']|'')*'|::|:([A-Za-z_][A-Za-z0-9_]*)")
        .expect("named parameter pattern is valid")
});

/// Rewrites `:name` parameters as positional placeholders.
///
/// Returns the rewritten SQL and the parameter names in placeholder order; a name
/// used twice appears twice.
pub fn parse(sql: &str, platform: &dyn Platform) -> (String, Vec<String>) {
    let mut names = Vec::new();
    let rewritten = NAMED_PARAMETER.replace_all(sql, |caps: &Captures<'_>| match caps.get(1) {
        Some(name) => {
            names.push(name.as_str().to_string());
            platform.placeholder(names.len())
        }
        None => caps[0].to_string(),
    });
    (rewritten.into_owned(), names)
}

/// Binds named values into a positional statement.
///
/// # Errors
///
/// [`QuarryError::UnsupportedOperation`] when the SQL names a parameter that has
/// no value.
pub fn bind(sql: &str, values: &[(&str, Value)], platform: &dyn Platform) -> Result<BoundStatement> {
    let (sql, names) = parse(sql, platform);
    let params = names
        .iter()
        .map(|name| {
            values
                .iter()
                .find(|(n, _)| *n == name.as_str())
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    QuarryError::UnsupportedOperation(format!("no value for parameter :{name}"))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BoundStatement { sql, params })
}
