//! Reusable query templates.
//!
//! A [`QueryTemplate`] is a SQL body plus the parameter contract derived from
//! it. The contract is always re-extracted from the final SQL, never edited by
//! hand, so it cannot drift from the body. Applying a template substitutes
//! every `:name` and positional `?` token with a rendered literal.

use std::collections::HashMap;

use querycraft_core::{LiteralPolicy, QueryCraftError, QueryCraftResult};
use serde::{Deserialize, Serialize};

use crate::params::{reextract, scan_tokens, ParameterBinder, ParameterDescriptor};
use crate::query::literal::render_value;
use crate::query::{QueryModel, SqlCompiler};
use crate::value::Value;

/// Where a template's SQL comes from.
#[derive(Debug, Clone, Copy)]
pub enum TemplateSource<'a> {
    /// A builder model, compiled first.
    Model(&'a QueryModel),
    /// Hand-written SQL, taken as is.
    Sql(&'a str),
}

/// A SQL body and its parameters.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use querycraft_builder::template::{QueryTemplate, TemplateSource};
/// use querycraft_builder::query::SqlCompiler;
/// use querycraft_builder::value::Value;
/// use querycraft_core::{CompilerSettings, LiteralPolicy};
///
/// let compiler = SqlCompiler::new(CompilerSettings::default());
/// let template = QueryTemplate::from_source(
///     TemplateSource::Sql("SELECT * FROM users WHERE name = :name"),
///     &compiler,
/// )
/// .unwrap();
/// assert_eq!(template.parameters.len(), 1);
///
/// let mut values = HashMap::new();
/// values.insert("name".to_string(), Value::from("O'Brien"));
/// let sql = template.apply(&values, LiteralPolicy::Permissive).unwrap();
/// assert_eq!(sql, "SELECT * FROM users WHERE name = 'O''Brien'");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// The SQL body with placeholders.
    pub sql: String,
    /// The parameters detected in `sql`.
    pub parameters: Vec<ParameterDescriptor>,
}

impl QueryTemplate {
    /// Builds a template from raw SQL.
    pub fn from_sql(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let parameters = reextract(&sql, &[]);
        Self { sql, parameters }
    }

    /// Builds a template from a model or raw SQL.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::CompileError`] when the model does not
    /// compile cleanly.
    pub fn from_source(source: TemplateSource<'_>, compiler: &SqlCompiler) -> QueryCraftResult<Self> {
        match source {
            TemplateSource::Sql(sql) => Ok(Self::from_sql(sql)),
            TemplateSource::Model(model) => {
                let compiled = compiler.compile(model);
                if !compiled.valid {
                    return Err(QueryCraftError::CompileError(compiled.errors.join("; ")));
                }
                Ok(Self::from_sql(compiled.sql))
            }
        }
    }

    /// Re-derives the parameters after the SQL body changed, keeping user
    /// overrides for names that survive.
    pub fn set_sql(&mut self, sql: impl Into<String>) {
        self.sql = sql.into();
        self.parameters = reextract(&self.sql, &self.parameters);
    }

    /// Substitutes every placeholder with its rendered value.
    ///
    /// A missing value falls back to the parameter's default. Placeholders
    /// inside quoted literals or comments and `::type` casts are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::TemplateError`] when a placeholder has
    /// neither a value nor a default.
    pub fn apply(&self, values: &HashMap<String, Value>, policy: LiteralPolicy) -> QueryCraftResult<String> {
        let mut sql = self.sql.clone();
        for token in scan_tokens(&self.sql).into_iter().rev() {
            let value = values
                .get(&token.name)
                .or_else(|| {
                    self.parameters
                        .iter()
                        .find(|p| p.name == token.name)
                        .and_then(|p| p.default_value.as_ref())
                })
                .ok_or_else(|| {
                    QueryCraftError::TemplateError(format!("no value for parameter '{}'", token.name))
                })?;
            sql.replace_range(token.start..token.end, &render_value(value, policy));
        }
        Ok(sql)
    }

    /// Validates and coerces `values` with `binder`, then applies them.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::ValidationError`] when any value fails
    /// validation.
    pub fn apply_validated(
        &self,
        binder: &ParameterBinder,
        values: &HashMap<String, Value>,
        policy: LiteralPolicy,
    ) -> QueryCraftResult<String> {
        let bound = binder.bind(&self.parameters, values)?;
        self.apply(&bound.to_map(), policy)
    }
}

/// A template as stored by a [`TemplateStore`](crate::services::TemplateStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecord {
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// The SQL body.
    pub sql: String,
    /// The parameters of `sql`.
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether other users can see the template.
    #[serde(default)]
    pub is_public: bool,
}

impl TemplateRecord {
    /// Creates a private record, deriving parameters from `sql`.
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::from_template(name, QueryTemplate::from_sql(sql))
    }

    /// Wraps a built template.
    pub fn from_template(name: impl Into<String>, template: QueryTemplate) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sql: template.sql,
            parameters: template.parameters,
            tags: Vec::new(),
            is_public: false,
        }
    }

    /// The stored SQL and parameters as a template. Parameters are
    /// reconciled against the SQL, so a stale stored contract is repaired.
    pub fn template(&self) -> QueryTemplate {
        QueryTemplate {
            sql: self.sql.clone(),
            parameters: reextract(&self.sql, &self.parameters),
        }
    }
}
