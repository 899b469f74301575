//! SQL text accumulation, identifier quoting and name transforms.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::platform::Platform;
use crate::value::Value;

/// Keywords that are quoted whenever they appear as identifiers, whatever the
/// quoting options say
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "add", "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column",
        "constraint", "create", "cross", "current_date", "current_time", "current_timestamp",
        "default", "delete", "desc", "distinct", "drop", "else", "end", "except", "exists",
        "foreign", "from", "full", "group", "having", "in", "index", "inner", "insert",
        "intersect", "into", "is", "join", "key", "left", "like", "limit", "not", "null",
        "offset", "on", "or", "order", "outer", "primary", "references", "right", "select", "set",
        "table", "then", "to", "union", "unique", "update", "user", "using", "values", "when",
        "where", "with",
    ]
    .into_iter()
    .collect()
});

pub fn is_reserved(identifier: &str) -> bool {
    RESERVED.contains(identifier.to_ascii_lowercase().as_str())
}

/// Renames a table or column on its way into SQL
#[derive(Clone)]
pub struct NameTransform(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl NameTransform {
    pub fn new(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn lowercase() -> Self {
        Self::new(|name| name.to_lowercase())
    }

    /// `FirstName` → `first_name`
    pub fn snake_case() -> Self {
        Self::new(|name| {
            let mut out = String::with_capacity(name.len() + 4);
            for (i, ch) in name.chars().enumerate() {
                if ch.is_uppercase() {
                    if i > 0 && !out.ends_with('_') {
                        out.push('_');
                    }
                    out.extend(ch.to_lowercase());
                } else {
                    out.push(ch);
                }
            }
            out
        })
    }

    pub fn apply(&self, name: &str) -> String {
        (self.0)(name)
    }
}

impl fmt::Debug for NameTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NameTransform(..)")
    }
}

/// How identifiers are rendered
#[derive(Debug, Clone, Default)]
pub struct BuilderOptions {
    pub quote_tables: bool,
    pub quote_columns: bool,
    pub table_transform: Option<NameTransform>,
    pub column_transform: Option<NameTransform>,
}

impl BuilderOptions {
    pub fn table_name(&self, name: &str) -> String {
        quote_if(&self.transform_table(name), self.quote_tables)
    }

    pub fn column_name(&self, name: &str) -> String {
        quote_if(&self.transform_column(name), self.quote_columns)
    }

    /// Table name after the transform, unquoted
    pub fn transform_table(&self, name: &str) -> String {
        match &self.table_transform {
            Some(t) => t.apply(name),
            None => name.to_string(),
        }
    }

    /// Column name after the transform, unquoted
    pub fn transform_column(&self, name: &str) -> String {
        match &self.column_transform {
            Some(t) => t.apply(name),
            None => name.to_string(),
        }
    }
}

/// True when `name` reads the same after a database folds unquoted identifiers:
/// lowercase ASCII letters, digits and underscores, not starting with a digit
fn is_fold_stable(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Quotes `name` when asked to, when it is a reserved word, or when an unquoted
/// rendering would not name the same object as the always-quoted DDL
pub fn quote_if(name: &str, quote: bool) -> String {
    if quote || is_reserved(name) || !is_fold_stable(name) {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// Statement text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Appends SQL fragments and collects bound parameters in order
pub struct QueryBuilder<'a> {
    sql: String,
    params: Vec<Value>,
    options: &'a BuilderOptions,
    platform: &'a dyn Platform,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(platform: &'a dyn Platform, options: &'a BuilderOptions) -> Self {
        Self {
            sql: String::with_capacity(128),
            params: Vec::new(),
            options,
            platform,
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        self.options
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform
    }

    /// Raw text, no spacing added
    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    /// Keyword preceded by a single space unless at the start or after `(`
    pub fn keyword(&mut self, keyword: &str) -> &mut Self {
        if !self.sql.is_empty() && !self.sql.ends_with(' ') && !self.sql.ends_with('(') {
            self.sql.push(' ');
        }
        self.sql.push_str(keyword);
        self
    }

    pub fn table(&mut self, name: &str) -> &mut Self {
        let rendered = self.options.table_name(name);
        self.sql.push_str(&rendered);
        self
    }

    pub fn column(&mut self, name: &str) -> &mut Self {
        let rendered = self.options.column_name(name);
        self.sql.push_str(&rendered);
        self
    }

    /// `table.column`
    pub fn qualified(&mut self, table: &str, column: &str) -> &mut Self {
        self.table(table);
        self.sql.push('.');
        self.column(column)
    }

    /// Identifier that is neither a table nor a column (aliases)
    pub fn identifier(&mut self, name: &str) -> &mut Self {
        let rendered = quote_if(name, false);
        self.sql.push_str(&rendered);
        self
    }

    /// Appends a placeholder and records `value`
    pub fn bind(&mut self, value: Value) -> &mut Self {
        self.params.push(value);
        let placeholder = self.platform.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Runs `each` for every item, separated by `", "`
    pub fn comma_separated<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        mut each: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            each(self, item);
        }
        self
    }

    pub fn build(self) -> BoundStatement {
        BoundStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}
