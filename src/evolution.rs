/*!
The schema evolution engine (spec.md §4.2): add/drop/rename/retype/move
operations over a [`Schema`], dot-notation addressing into nested
struct/list/map fields, the required-field default rule, and schema-history
diffing.
*/
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IcebergError, Result, SchemaEvolutionErrorCode as Code};
use crate::model::schema::{can_promote, FieldIdManager, Schema};
use crate::model::types::{NestedField, PrimitiveType, StructType, Type};

/// Where a column lands relative to its siblings after `move-column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePosition {
    /// First among its siblings.
    First,
    /// Last among its siblings.
    Last,
    /// Immediately before the sibling named `_0`.
    Before(String),
    /// Immediately after the sibling named `_0`.
    After(String),
}

/// Split a dot-notation column path into segments. List elements and map
/// values are addressed through their synthetic `element`/`key`/`value`
/// path segment (spec.md §4.2), e.g. `tags.element.name` for a field named
/// `name` inside a struct-typed list element.
fn segments(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Descend from `root` along all but the last path segment, returning the
/// struct whose immediate field the last segment names.
fn descend_mut<'a>(root: &'a mut StructType, path: &[&str]) -> Result<&'a mut StructType> {
    let mut current = root;
    for seg in path {
        let field = current
            .fields
            .iter_mut()
            .find(|f| f.name == *seg)
            .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field named '{seg}'")))?;
        current = descend_into_field(field)?;
    }
    Ok(current)
}

fn descend_into_field(field: &mut NestedField) -> Result<&mut StructType> {
    match &mut field.field_type {
        Type::Struct(s) => Ok(s),
        Type::List(l) => match Arc::make_mut(&mut l.element) {
            Type::Struct(s) => Ok(s),
            _ => Err(IcebergError::schema_evolution(
                Code::InvalidOperation,
                format!("'{}' list element is not a struct", field.name),
            )),
        },
        Type::Map(m) => match Arc::make_mut(&mut m.value) {
            Type::Struct(s) => Ok(s),
            _ => Err(IcebergError::schema_evolution(
                Code::InvalidOperation,
                format!("'{}' map value is not a struct", field.name),
            )),
        },
        Type::Primitive(_) => Err(IcebergError::schema_evolution(
            Code::InvalidOperation,
            format!("'{}' is not a struct, list, or map", field.name),
        )),
    }
}

/// Resolve a dot-notation path to the field id it addresses.
pub fn resolve_path(schema: &Schema, path: &str) -> Result<i32> {
    let segs = segments(path);
    let (parent_path, last) = segs.split_at(segs.len() - 1);
    let mut root = schema.fields.clone();
    let parent = descend_mut(&mut root, parent_path)?;
    parent
        .field_by_name(last[0])
        .map(|f| f.id)
        .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field at path '{path}'")))
}

/// Assign fresh field ids (via `mgr`) to every unassigned (`id == 0`)
/// position in a freshly-constructed type tree: the field ids of nested
/// struct fields, plus list-element and map-key/map-value ids (spec.md
/// §4.2 "Field-ID discipline").
pub fn assign_field_ids(ty: &mut Type, mgr: &mut FieldIdManager) {
    match ty {
        Type::Primitive(_) => {}
        Type::Struct(s) => {
            for f in s.fields.iter_mut() {
                if f.id == 0 {
                    f.id = mgr.next();
                }
                assign_field_ids(&mut f.field_type, mgr);
            }
        }
        Type::List(l) => {
            if l.element_id == 0 {
                l.element_id = mgr.next();
            }
            assign_field_ids(Arc::make_mut(&mut l.element), mgr);
        }
        Type::Map(m) => {
            if m.key_id == 0 {
                m.key_id = mgr.next();
            }
            if m.value_id == 0 {
                m.value_id = mgr.next();
            }
            assign_field_ids(Arc::make_mut(&mut m.key), mgr);
            assign_field_ids(Arc::make_mut(&mut m.value), mgr);
        }
    }
}

/// Validate the required-field default rule (spec.md §4.2): a new required
/// field added to a table that already has snapshots needs a non-null
/// `initial-default`; `unknown`/`variant`/`geometry`/`geography` fields may
/// only default to null; a struct field's default must be `{}` or null.
fn validate_initial_default(
    field_type: &Type,
    required: bool,
    table_has_snapshots: bool,
    initial_default: &Option<serde_json::Value>,
) -> Result<()> {
    if !required || !table_has_snapshots {
        return Ok(());
    }
    match field_type {
        Type::Primitive(p) if p.allows_only_null_default() => {
            if let Some(v) = initial_default {
                if !v.is_null() {
                    return Err(IcebergError::schema_evolution(
                        Code::RequiredFieldNoDefault,
                        format!("'{p}' fields may only default to null"),
                    ));
                }
            }
            Ok(())
        }
        Type::Struct(_) => match initial_default {
            None => Ok(()),
            Some(v) if v.is_null() => Ok(()),
            Some(v) if v.as_object().map(|o| o.is_empty()).unwrap_or(false) => Ok(()),
            Some(_) => Err(IcebergError::schema_evolution(
                Code::RequiredFieldNoDefault,
                "a required struct field's initial-default must be '{}' or null".to_string(),
            )),
        },
        _ => match initial_default {
            Some(v) if !v.is_null() => Ok(()),
            _ => Err(IcebergError::schema_evolution(
                Code::RequiredFieldNoDefault,
                "a required field added to a table with existing snapshots needs a non-null initial-default".to_string(),
            )),
        },
    }
}

/// Add a new column (spec.md §4.2). `parent_path` addresses the struct to
/// add into, `None` for the schema's top level. `field_type` may contain
/// unassigned (`id == 0`) nested ids, which are allocated from `mgr`.
/// `new_schema_id` becomes the id of the returned schema.
#[allow(clippy::too_many_arguments)]
pub fn add_column(
    schema: &Schema,
    mgr: &mut FieldIdManager,
    new_schema_id: i32,
    parent_path: Option<&str>,
    name: &str,
    mut field_type: Type,
    required: bool,
    doc: Option<String>,
    initial_default: Option<serde_json::Value>,
    table_has_snapshots: bool,
) -> Result<Schema> {
    validate_initial_default(&field_type, required, table_has_snapshots, &initial_default)?;
    assign_field_ids(&mut field_type, mgr);

    let mut new_fields = schema.fields.clone();
    let parent_segs = parent_path.map(segments).unwrap_or_default();
    let parent = descend_mut(&mut new_fields, &parent_segs)?;
    if parent.field_by_name(name).is_some() {
        return Err(IcebergError::schema_evolution(Code::FieldExists, format!("field '{name}' already exists")));
    }
    let field = NestedField {
        id: mgr.next(),
        name: name.to_string(),
        required,
        field_type,
        doc,
        initial_default: initial_default.clone(),
        write_default: initial_default,
    };
    parent.fields.push(field);

    let mut new_schema = schema.clone();
    new_schema.schema_id = new_schema_id;
    new_schema.fields = new_fields;
    new_schema.validate()?;
    Ok(new_schema)
}

/// Drop a column (spec.md §4.2). The field id is retired, never reused.
/// Refuses to drop an identifier field.
pub fn drop_column(schema: &Schema, new_schema_id: i32, path: &str) -> Result<Schema> {
    let segs = segments(path);
    let (parent_segs, last) = segs.split_at(segs.len() - 1);
    let mut new_fields = schema.fields.clone();
    let parent = descend_mut(&mut new_fields, parent_segs)?;
    let idx = parent
        .fields
        .iter()
        .position(|f| f.name == last[0])
        .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field at path '{path}'")))?;
    let field_id = parent.fields[idx].id;
    if schema.identifier_field_ids.contains(&field_id) {
        return Err(IcebergError::schema_evolution(
            Code::IdentifierField,
            format!("'{path}' is an identifier field and cannot be dropped"),
        ));
    }
    parent.fields.remove(idx);

    let mut new_schema = schema.clone();
    new_schema.schema_id = new_schema_id;
    new_schema.fields = new_fields;
    new_schema.validate()?;
    Ok(new_schema)
}

/// Rename a column (spec.md §4.2). The field id is unchanged, so existing
/// data files written under the old name remain readable.
pub fn rename_column(schema: &Schema, new_schema_id: i32, path: &str, new_name: &str) -> Result<Schema> {
    let segs = segments(path);
    let (parent_segs, last) = segs.split_at(segs.len() - 1);
    let mut new_fields = schema.fields.clone();
    let parent = descend_mut(&mut new_fields, parent_segs)?;
    if parent.field_by_name(new_name).is_some() {
        return Err(IcebergError::schema_evolution(Code::FieldExists, format!("field '{new_name}' already exists")));
    }
    let field = parent
        .fields
        .iter_mut()
        .find(|f| f.name == last[0])
        .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field at path '{path}'")))?;
    field.name = new_name.to_string();

    let mut new_schema = schema.clone();
    new_schema.schema_id = new_schema_id;
    new_schema.fields = new_fields;
    Ok(new_schema)
}

/// Change a column's primitive type (spec.md §4.2). Only a permitted
/// promotion is allowed; anything else fails `INCOMPATIBLE_TYPE`.
pub fn update_column_type(schema: &Schema, new_schema_id: i32, path: &str, new_type: PrimitiveType) -> Result<Schema> {
    let segs = segments(path);
    let (parent_segs, last) = segs.split_at(segs.len() - 1);
    let mut new_fields = schema.fields.clone();
    let parent = descend_mut(&mut new_fields, parent_segs)?;
    let field = parent
        .fields
        .iter_mut()
        .find(|f| f.name == last[0])
        .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field at path '{path}'")))?;
    let old = match &field.field_type {
        Type::Primitive(p) => p.clone(),
        _ => {
            return Err(IcebergError::schema_evolution(
                Code::IncompatibleType,
                format!("'{path}' is not a primitive field"),
            ))
        }
    };
    if old != new_type && !can_promote(&old, &new_type) {
        return Err(IcebergError::schema_evolution(
            Code::IncompatibleType,
            format!("cannot promote '{old}' to '{new_type}'"),
        ));
    }
    field.field_type = Type::Primitive(new_type);

    let mut new_schema = schema.clone();
    new_schema.schema_id = new_schema_id;
    new_schema.fields = new_fields;
    Ok(new_schema)
}

fn set_required(schema: &Schema, new_schema_id: i32, path: &str, required: bool) -> Result<Schema> {
    let segs = segments(path);
    let (parent_segs, last) = segs.split_at(segs.len() - 1);
    let mut new_fields = schema.fields.clone();
    let parent = descend_mut(&mut new_fields, parent_segs)?;
    let field = parent
        .fields
        .iter_mut()
        .find(|f| f.name == last[0])
        .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field at path '{path}'")))?;
    field.required = required;

    let mut new_schema = schema.clone();
    new_schema.schema_id = new_schema_id;
    new_schema.fields = new_fields;
    Ok(new_schema)
}

/// Relax a column to optional (spec.md §4.2).
pub fn make_column_optional(schema: &Schema, new_schema_id: i32, path: &str) -> Result<Schema> {
    set_required(schema, new_schema_id, path, false)
}

/// Tighten a column to required (spec.md §4.2). Callers should apply the
/// required-field default rule themselves if the table has snapshots, the
/// same as [`add_column`]; this operation does not add a new field so no
/// `initial-default` is introduced here.
pub fn make_column_required(schema: &Schema, new_schema_id: i32, path: &str) -> Result<Schema> {
    set_required(schema, new_schema_id, path, true)
}

/// Update a column's documentation string.
pub fn update_column_doc(schema: &Schema, new_schema_id: i32, path: &str, doc: Option<String>) -> Result<Schema> {
    let segs = segments(path);
    let (parent_segs, last) = segs.split_at(segs.len() - 1);
    let mut new_fields = schema.fields.clone();
    let parent = descend_mut(&mut new_fields, parent_segs)?;
    let field = parent
        .fields
        .iter_mut()
        .find(|f| f.name == last[0])
        .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field at path '{path}'")))?;
    field.doc = doc;

    let mut new_schema = schema.clone();
    new_schema.schema_id = new_schema_id;
    new_schema.fields = new_fields;
    Ok(new_schema)
}

/// Reorder a column among its immediate siblings (spec.md §4.2).
pub fn move_column(schema: &Schema, new_schema_id: i32, path: &str, position: MovePosition) -> Result<Schema> {
    let segs = segments(path);
    let (parent_segs, last) = segs.split_at(segs.len() - 1);
    let mut new_fields = schema.fields.clone();
    let parent = descend_mut(&mut new_fields, parent_segs)?;
    let from_idx = parent
        .fields
        .iter()
        .position(|f| f.name == last[0])
        .ok_or_else(|| IcebergError::schema_evolution(Code::FieldNotFound, format!("no field at path '{path}'")))?;
    let field = parent.fields.remove(from_idx);

    let to_idx = match &position {
        MovePosition::First => 0,
        MovePosition::Last => parent.fields.len(),
        MovePosition::Before(sibling) => parent
            .fields
            .iter()
            .position(|f| &f.name == sibling)
            .ok_or_else(|| IcebergError::schema_evolution(Code::InvalidPosition, format!("no sibling named '{sibling}'")))?,
        MovePosition::After(sibling) => {
            let idx = parent
                .fields
                .iter()
                .position(|f| &f.name == sibling)
                .ok_or_else(|| IcebergError::schema_evolution(Code::InvalidPosition, format!("no sibling named '{sibling}'")))?;
            idx + 1
        }
    };
    parent.fields.insert(to_idx.min(parent.fields.len()), field);

    let mut new_schema = schema.clone();
    new_schema.schema_id = new_schema_id;
    new_schema.fields = new_fields;
    Ok(new_schema)
}

/// One classified difference between two schema versions (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SchemaChange {
    /// A field present in `to` but not `from`.
    Added {
        /// The added field's id.
        field_id: i32,
        /// The added field's name.
        name: String,
    },
    /// A field present in `from` but not `to`.
    Removed {
        /// The removed field's id.
        field_id: i32,
        /// The removed field's name.
        name: String,
    },
    /// A field whose name changed between `from` and `to`, id unchanged.
    Renamed {
        /// The field's stable id.
        field_id: i32,
        /// Its name in `from`.
        from_name: String,
        /// Its name in `to`.
        to_name: String,
    },
    /// A field whose type changed between `from` and `to`.
    TypeChanged {
        /// The field's stable id.
        field_id: i32,
        /// Its type in `from`, rendered for display.
        from_type: String,
        /// Its type in `to`, rendered for display.
        to_type: String,
    },
    /// A field whose required/optional status changed.
    NullabilityChanged {
        /// The field's stable id.
        field_id: i32,
        /// Whether it was required in `from`.
        required_before: bool,
        /// Whether it is required in `to`.
        required_after: bool,
    },
    /// A field whose documentation string changed.
    DocChanged {
        /// The field's stable id.
        field_id: i32,
    },
    /// The top-level field order changed without any other difference.
    Reordered,
}

/// Diff two top-level field lists, producing the ordered change list
/// (spec.md §4.2 `compareSchemas`).
pub fn compare_schemas(from: &Schema, to: &Schema) -> Vec<SchemaChange> {
    let mut changes = Vec::new();

    for old_field in &from.fields.fields {
        if to.field_by_id(old_field.id).is_none() {
            changes.push(SchemaChange::Removed {
                field_id: old_field.id,
                name: old_field.name.clone(),
            });
        }
    }
    for new_field in &to.fields.fields {
        if from.field_by_id(new_field.id).is_none() {
            changes.push(SchemaChange::Added {
                field_id: new_field.id,
                name: new_field.name.clone(),
            });
        }
    }
    for old_field in &from.fields.fields {
        if let Some(new_field) = to.field_by_id(old_field.id) {
            if old_field.name != new_field.name {
                changes.push(SchemaChange::Renamed {
                    field_id: old_field.id,
                    from_name: old_field.name.clone(),
                    to_name: new_field.name.clone(),
                });
            }
            if old_field.field_type != new_field.field_type {
                changes.push(SchemaChange::TypeChanged {
                    field_id: old_field.id,
                    from_type: render_type(&old_field.field_type),
                    to_type: render_type(&new_field.field_type),
                });
            }
            if old_field.required != new_field.required {
                changes.push(SchemaChange::NullabilityChanged {
                    field_id: old_field.id,
                    required_before: old_field.required,
                    required_after: new_field.required,
                });
            }
            if old_field.doc != new_field.doc {
                changes.push(SchemaChange::DocChanged { field_id: old_field.id });
            }
        }
    }

    let common_order = |s: &Schema| -> Vec<i32> {
        s.fields
            .fields
            .iter()
            .map(|f| f.id)
            .filter(|id| from.field_by_id(*id).is_some() && to.field_by_id(*id).is_some())
            .collect()
    };
    if common_order(from) != common_order(to) {
        changes.push(SchemaChange::Reordered);
    }

    changes
}

fn render_type(ty: &Type) -> String {
    match ty {
        Type::Primitive(p) => p.to_string(),
        Type::Struct(_) => "struct".to_string(),
        Type::List(_) => "list".to_string(),
        Type::Map(_) => "map".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::StructType;

    fn base_schema() -> Schema {
        Schema::new(
            0,
            StructType::new(vec![
                NestedField {
                    id: 1,
                    name: "id".to_string(),
                    required: true,
                    field_type: Type::Primitive(PrimitiveType::Long),
                    doc: None,
                    initial_default: None,
                    write_default: None,
                },
                NestedField {
                    id: 2,
                    name: "name".to_string(),
                    required: false,
                    field_type: Type::Primitive(PrimitiveType::String),
                    doc: None,
                    initial_default: None,
                    write_default: None,
                },
            ]),
        )
    }

    #[test]
    fn test_scenario_d_add_rename_retype_noop() {
        // spec.md scenario D
        let s0 = base_schema();
        let mut mgr = FieldIdManager::for_schema(&s0);

        let s1 = add_column(
            &s0,
            &mut mgr,
            1,
            None,
            "email",
            Type::Primitive(PrimitiveType::String),
            false,
            None,
            None,
            false,
        )
        .unwrap();
        assert_eq!(s1.fields.fields.len(), 3);
        assert_eq!(mgr.peek(), 4);

        let s2 = rename_column(&s1, 2, "name", "full_name").unwrap();
        let full_name_field = s2.field_by_name("full_name").unwrap();
        assert_eq!(full_name_field.id, 2, "rename preserves the original field id");

        let s3 = update_column_type(&s2, 3, "id", PrimitiveType::Long).unwrap();
        assert_eq!(s3.field_by_id(1).unwrap().field_type, Type::Primitive(PrimitiveType::Long));

        assert_eq!(s1.schema_id, 1);
        assert_eq!(s2.schema_id, 2);
        assert_eq!(s3.schema_id, 3);
    }

    #[test]
    fn test_add_required_column_without_default_rejected_when_has_snapshots() {
        let s0 = base_schema();
        let mut mgr = FieldIdManager::for_schema(&s0);
        let err = add_column(
            &s0,
            &mut mgr,
            1,
            None,
            "score",
            Type::Primitive(PrimitiveType::Int),
            true,
            None,
            None,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, IcebergError::SchemaEvolution { code: Code::RequiredFieldNoDefault, .. }));
    }

    #[test]
    fn test_add_required_column_with_default_ok_when_has_snapshots() {
        let s0 = base_schema();
        let mut mgr = FieldIdManager::for_schema(&s0);
        let s1 = add_column(
            &s0,
            &mut mgr,
            1,
            None,
            "score",
            Type::Primitive(PrimitiveType::Int),
            true,
            None,
            Some(serde_json::json!(0)),
            true,
        )
        .unwrap();
        assert!(s1.field_by_name("score").is_some());
    }

    #[test]
    fn test_variant_required_field_only_allows_null_default() {
        let s0 = base_schema();
        let mut mgr = FieldIdManager::for_schema(&s0);
        let err = add_column(
            &s0,
            &mut mgr,
            1,
            None,
            "payload",
            Type::Primitive(PrimitiveType::Variant),
            true,
            None,
            Some(serde_json::json!("not null")),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, IcebergError::SchemaEvolution { code: Code::RequiredFieldNoDefault, .. }));

        let ok = add_column(
            &s0,
            &mut mgr,
            1,
            None,
            "payload",
            Type::Primitive(PrimitiveType::Variant),
            true,
            None,
            None,
            true,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_drop_column_retires_field_id() {
        let s0 = base_schema();
        let s1 = drop_column(&s0, 1, "name").unwrap();
        assert!(s1.field_by_name("name").is_none());
        assert!(s1.field_by_id(2).is_none());
    }

    #[test]
    fn test_drop_identifier_field_rejected() {
        let mut s0 = base_schema();
        s0.identifier_field_ids = vec![1];
        let err = drop_column(&s0, 1, "id").unwrap_err();
        assert!(matches!(err, IcebergError::SchemaEvolution { code: Code::IdentifierField, .. }));
    }

    #[test]
    fn test_update_column_type_rejects_narrowing() {
        let s0 = base_schema();
        let err = update_column_type(&s0, 1, "id", PrimitiveType::Int).unwrap_err();
        assert!(matches!(err, IcebergError::SchemaEvolution { code: Code::IncompatibleType, .. }));
    }

    #[test]
    fn test_move_column_first_and_after() {
        let s0 = base_schema();
        let s1 = move_column(&s0, 1, "name", MovePosition::First).unwrap();
        assert_eq!(s1.fields.fields[0].name, "name");

        let s2 = move_column(&s1, 2, "name", MovePosition::After("id".to_string())).unwrap();
        assert_eq!(s2.fields.fields[1].name, "name");
    }

    #[test]
    fn test_nested_struct_path_add_and_drop() {
        let mut s0 = base_schema();
        s0.fields.fields.push(NestedField {
            id: 3,
            name: "address".to_string(),
            required: false,
            field_type: Type::Struct(StructType::new(vec![NestedField {
                id: 4,
                name: "city".to_string(),
                required: false,
                field_type: Type::Primitive(PrimitiveType::String),
                doc: None,
                initial_default: None,
                write_default: None,
            }])),
            doc: None,
            initial_default: None,
            write_default: None,
        });
        let mut mgr = FieldIdManager::for_schema(&s0);

        let s1 = add_column(
            &s0,
            &mut mgr,
            1,
            Some("address"),
            "zip",
            Type::Primitive(PrimitiveType::String),
            false,
            None,
            None,
            false,
        )
        .unwrap();
        assert_eq!(resolve_path(&s1, "address.zip").unwrap(), 5);

        let s2 = drop_column(&s1, 2, "address.city").unwrap();
        assert_eq!(resolve_path(&s2, "address.zip").unwrap(), 5);
        assert!(resolve_path(&s2, "address.city").is_err());
    }

    #[test]
    fn test_compare_schemas_scenario_d() {
        let s0 = base_schema();
        let mut mgr = FieldIdManager::for_schema(&s0);
        let s1 = add_column(
            &s0,
            &mut mgr,
            1,
            None,
            "email",
            Type::Primitive(PrimitiveType::String),
            false,
            None,
            None,
            false,
        )
        .unwrap();
        let changes = compare_schemas(&s0, &s1);
        assert!(changes.iter().any(|c| matches!(c, SchemaChange::Added { name, .. } if name == "email")));
    }
}
