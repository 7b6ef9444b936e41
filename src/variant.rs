/*!
Variant shredding configuration (spec.md §4.4/§6): which top-level variant
columns get shredded fields, and what static type each shredded field path
is stored as. Carried as table properties on the wire -- this module is the
single place that knows the `write.variant.*` key shapes, round-tripping a
typed [`VariantShredConfig`] to and from a table's `properties` map.

Grounded on [`crate::config`]'s property-map parsing style, applied to the
three `write.variant.*` keys spec.md §6 lists instead of the commit/retry
keys `config.rs` covers.
*/
use std::collections::HashMap;

use crate::error::{IcebergError, Result};

/// One field shredded out of a variant column, by dot-notation path within
/// the variant value and the static Iceberg primitive type it is stored
/// under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShreddedField {
    /// Dot-notation path into the variant value, e.g. `"event.id"`.
    pub path: String,
    /// The primitive type name the shredded column is stored as, e.g.
    /// `"long"` or `"string"`.
    pub type_name: String,
}

/// Shredding configuration for a single variant column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShredConfig {
    /// Name of the variant column this configuration applies to.
    pub column: String,
    /// Fields shredded out of this column, in declaration order.
    pub fields: Vec<ShreddedField>,
}

/// A table's full variant-shredding configuration: zero or more columns,
/// each with its own shredded fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantShredConfig {
    /// Per-column shredding configuration, in declaration order.
    pub columns: Vec<ColumnShredConfig>,
}

const SHRED_COLUMNS_KEY: &str = "write.variant.shred-columns";

fn shred_fields_key(column: &str) -> String {
    format!("write.variant.{column}.shred-fields")
}

fn field_types_key(column: &str) -> String {
    format!("write.variant.{column}.field-types")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl VariantShredConfig {
    /// Parse a table's `write.variant.*` properties into a typed
    /// configuration. A column listed in `shred-columns` with no matching
    /// `shred-fields`/`field-types` entries yields an empty field list
    /// rather than an error -- the column is still eligible for shredding,
    /// it just hasn't been configured yet.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let Some(columns_value) = properties.get(SHRED_COLUMNS_KEY) else {
            return Ok(VariantShredConfig::default());
        };
        let mut columns = Vec::new();
        for column in split_list(columns_value) {
            let paths = properties.get(&shred_fields_key(&column)).map(|v| split_list(v)).unwrap_or_default();
            let types = properties.get(&field_types_key(&column)).map(|v| split_list(v)).unwrap_or_default();
            if !types.is_empty() && types.len() != paths.len() {
                return Err(IcebergError::Validation(format!(
                    "column '{column}': {} shred-fields but {} field-types",
                    paths.len(),
                    types.len()
                )));
            }
            let fields = paths
                .into_iter()
                .enumerate()
                .map(|(i, path)| ShreddedField {
                    path,
                    type_name: types.get(i).cloned().unwrap_or_default(),
                })
                .collect();
            columns.push(ColumnShredConfig { column, fields });
        }
        Ok(VariantShredConfig { columns })
    }

    /// Render this configuration back into `write.variant.*` table
    /// properties. Inverse of [`VariantShredConfig::from_properties`]:
    /// `from_properties(&config.to_properties())` always reproduces
    /// `config` (spec.md §7 "variant shred config -> table properties ->
    /// config is structural identity").
    pub fn to_properties(&self) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        if self.columns.is_empty() {
            return properties;
        }
        properties.insert(
            SHRED_COLUMNS_KEY.to_string(),
            self.columns.iter().map(|c| c.column.as_str()).collect::<Vec<_>>().join(","),
        );
        for column in &self.columns {
            if column.fields.is_empty() {
                continue;
            }
            properties.insert(
                shred_fields_key(&column.column),
                column.fields.iter().map(|f| f.path.as_str()).collect::<Vec<_>>().join(","),
            );
            properties.insert(
                field_types_key(&column.column),
                column.fields.iter().map(|f| f.type_name.as_str()).collect::<Vec<_>>().join(","),
            );
        }
        properties
    }

    /// The shredded field at `path` within `column`, if configured.
    pub fn shredded_field(&self, column: &str, path: &str) -> Option<&ShreddedField> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .and_then(|c| c.fields.iter().find(|f| f.path == path))
    }
}
