/*!
Schemas ([`Schema`]) and the rules governing how they evolve: monotonic
field-id allocation ([`FieldIdManager`]), permitted primitive type
promotions ([`can_promote`]), and backward/forward compatibility
classification ([`classify_compatibility`]).
*/
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::types::{NestedField, PrimitiveType, StructType, Type};
use crate::error::{IcebergError, Result};

/// A versioned schema: a struct type plus the metadata Iceberg tracks about
/// it (its id and which fields participate in row identity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Unique id of this schema within the table's schema history.
    #[serde(rename = "schema-id")]
    pub schema_id: i32,
    /// Field ids that jointly identify a row, for equality deletes and
    /// change-data-capture. Empty when the table declares no identity.
    #[serde(default, rename = "identifier-field-ids")]
    pub identifier_field_ids: Vec<i32>,
    #[serde(flatten)]
    /// The schema's fields, flattened so the document reads as
    /// `{"type": "struct", "fields": [...], "schema-id": ..., ...}`.
    pub fields: StructType,
}

impl Schema {
    /// Build a new schema with the given id and fields, no identifier
    /// fields.
    pub fn new(schema_id: i32, fields: StructType) -> Self {
        Schema {
            schema_id,
            identifier_field_ids: Vec::new(),
            fields,
        }
    }

    /// Look up a top-level field by id.
    pub fn field_by_id(&self, id: i32) -> Option<&NestedField> {
        self.fields.field_by_id(id)
    }

    /// Look up a top-level field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&NestedField> {
        self.fields.field_by_name(name)
    }

    /// The highest field id used anywhere in this schema, recursing into
    /// nested struct/list/map types. Returns 0 for a schema with no fields.
    pub fn highest_field_id(&self) -> i32 {
        fn walk(t: &Type, acc: &mut i32) {
            match t {
                Type::Primitive(_) => {}
                Type::Struct(s) => {
                    for f in &s.fields {
                        *acc = (*acc).max(f.id);
                        walk(&f.field_type, acc);
                    }
                }
                Type::List(l) => {
                    *acc = (*acc).max(l.element_id);
                    walk(&l.element, acc);
                }
                Type::Map(m) => {
                    *acc = (*acc).max(m.key_id).max(m.value_id);
                    walk(&m.key, acc);
                    walk(&m.value, acc);
                }
            }
        }
        let mut acc = 0;
        walk(&Type::Struct(self.fields.clone()), &mut acc);
        acc
    }

    /// Validate that a required field without a default never appears, and
    /// that identifier field ids reference existing required fields.
    pub fn validate(&self) -> Result<()> {
        for id in &self.identifier_field_ids {
            let field = self
                .field_by_id(*id)
                .ok_or_else(|| IcebergError::Metadata(format!("identifier field id {id} not found")))?;
            if !field.required {
                return Err(IcebergError::Metadata(format!(
                    "identifier field '{}' must be required",
                    field.name
                )));
            }
        }
        let mut seen = HashSet::new();
        for f in &self.fields.fields {
            if !seen.insert(f.id) {
                return Err(IcebergError::Metadata(format!("duplicate field id {}", f.id)));
            }
        }
        Ok(())
    }
}

/// Allocates globally-unique, strictly-increasing field ids within a table's
/// lifetime. Construct from the highest id already in use and call
/// [`FieldIdManager::next`] once per new field, in field-declaration order,
/// so ids never get reassigned across schema evolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIdManager {
    next_id: i32,
}

impl FieldIdManager {
    /// Start allocating after `highest_assigned`.
    pub fn starting_after(highest_assigned: i32) -> Self {
        FieldIdManager {
            next_id: highest_assigned + 1,
        }
    }

    /// Start allocating after the highest field id used in `schema`.
    pub fn for_schema(schema: &Schema) -> Self {
        Self::starting_after(schema.highest_field_id())
    }

    /// Allocate and return the next field id.
    pub fn next(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// The next id that would be allocated, without allocating it.
    pub fn peek(&self) -> i32 {
        self.next_id
    }
}

/// Is `from -> to` a permitted primitive type promotion (spec.md §4.2)?
/// Promotion is one-directional: `int -> long` is allowed, `long -> int` is
/// not. Decimal promotion preserves scale and may only widen precision.
pub fn can_promote(from: &PrimitiveType, to: &PrimitiveType) -> bool {
    use PrimitiveType::*;
    if from == to {
        return true;
    }
    match (from, to) {
        (Int, Long) => true,
        (Float, Double) => true,
        (Decimal { precision: p1, scale: s1 }, Decimal { precision: p2, scale: s2 }) => {
            s1 == s2 && p2 > p1
        }
        (Fixed(_), Binary) => true,
        _ => false,
    }
}

/// Schema compatibility classification used to decide whether an old reader
/// (backward) or an old writer (forward) can safely operate against a new
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Readers of the old schema can read data written with the new schema,
    /// and vice versa.
    Full,
    /// Readers of the old schema can read data written with the new schema.
    /// (Fields were only added, or types only widened.)
    Backward,
    /// Writers targeting the old schema can still produce data the new
    /// schema can read. (Fields were only added as optional, defaults
    /// provided.)
    Forward,
    /// Neither direction holds; the change is only safe if all existing
    /// data is rewritten.
    None,
}

/// Classify the compatibility of evolving `old` into `new`.
///
/// This applies the structural rules from spec.md §4.2: a field removal or a
/// required-field addition without a default breaks backward compatibility;
/// a narrowing type change (not a permitted promotion) breaks both
/// directions.
pub fn classify_compatibility(old: &Schema, new: &Schema) -> Compatibility {
    let mut backward = true;
    let mut forward = true;

    for old_field in &old.fields.fields {
        match new.field_by_id(old_field.id) {
            None => {
                // field removed: old readers expecting it break; if it was
                // required, old writers break too.
                backward = false;
                if old_field.required {
                    forward = false;
                }
            }
            Some(new_field) => {
                if let (Type::Primitive(p_old), Type::Primitive(p_new)) =
                    (&old_field.field_type, &new_field.field_type)
                {
                    if p_old != p_new {
                        // Any type change breaks forward compatibility (old
                        // readers can't read the new type); only a
                        // non-promotable change also breaks backward.
                        forward = false;
                        if !can_promote(p_old, p_new) {
                            backward = false;
                        }
                    }
                }
                if !old_field.required && new_field.required {
                    backward = false;
                    forward = false;
                }
            }
        }
    }

    for new_field in &new.fields.fields {
        if old.field_by_id(new_field.id).is_none() {
            if new_field.required && new_field.initial_default.is_none() {
                backward = false;
            }
            if new_field.required {
                forward = false;
            }
        }
    }

    match (backward, forward) {
        (true, true) => Compatibility::Full,
        (true, false) => Compatibility::Backward,
        (false, true) => Compatibility::Forward,
        (false, false) => Compatibility::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{PrimitiveType, StructType};

    fn field(id: i32, name: &str, required: bool, ty: PrimitiveType) -> NestedField {
        NestedField {
            id,
            name: name.to_string(),
            required,
            field_type: Type::Primitive(ty),
            doc: None,
            initial_default: None,
            write_default: None,
        }
    }

    #[test]
    fn test_can_promote_int_to_long() {
        assert!(can_promote(&PrimitiveType::Int, &PrimitiveType::Long));
        assert!(!can_promote(&PrimitiveType::Long, &PrimitiveType::Int));
    }

    #[test]
    fn test_can_promote_decimal_widen_precision_same_scale() {
        let d1 = PrimitiveType::Decimal { precision: 9, scale: 2 };
        let d2 = PrimitiveType::Decimal { precision: 18, scale: 2 };
        assert!(can_promote(&d1, &d2));
        assert!(!can_promote(&d2, &d1));
    }

    #[test]
    fn test_can_promote_decimal_rejects_scale_change() {
        let d1 = PrimitiveType::Decimal { precision: 9, scale: 2 };
        let d2 = PrimitiveType::Decimal { precision: 18, scale: 3 };
        assert!(!can_promote(&d1, &d2));
    }

    #[test]
    fn test_field_id_manager_monotonic() {
        let mut mgr = FieldIdManager::starting_after(5);
        assert_eq!(mgr.next(), 6);
        assert_eq!(mgr.next(), 7);
        assert_eq!(mgr.peek(), 8);
    }

    #[test]
    fn test_classify_full_compatibility_unchanged() {
        let s = Schema::new(0, StructType::new(vec![field(1, "a", true, PrimitiveType::Int)]));
        assert_eq!(classify_compatibility(&s, &s), Compatibility::Full);
    }

    #[test]
    fn test_classify_backward_on_promotion() {
        // int->long is a permitted promotion, so old readers can still read
        // new data (backward-compatible), but old *readers* of new data
        // written by an old writer would see the narrower type, so the
        // change is not forward-compatible (spec.md §4.2: forward requires
        // no type changes at all, promotions included).
        let old = Schema::new(0, StructType::new(vec![field(1, "a", true, PrimitiveType::Int)]));
        let new = Schema::new(1, StructType::new(vec![field(1, "a", true, PrimitiveType::Long)]));
        assert_eq!(classify_compatibility(&old, &new), Compatibility::Backward);
    }

    #[test]
    fn test_classify_breaks_on_required_field_without_default() {
        let old = Schema::new(0, StructType::new(vec![field(1, "a", true, PrimitiveType::Int)]));
        let mut new_field = field(2, "b", true, PrimitiveType::Int);
        new_field.initial_default = None;
        let new = Schema::new(
            1,
            StructType::new(vec![field(1, "a", true, PrimitiveType::Int), new_field]),
        );
        assert_eq!(classify_compatibility(&old, &new), Compatibility::None);
    }

    #[test]
    fn test_validate_rejects_duplicate_field_ids() {
        let s = Schema::new(
            0,
            StructType::new(vec![
                field(1, "a", true, PrimitiveType::Int),
                field(1, "b", true, PrimitiveType::Int),
            ]),
        );
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_optional_identifier_field() {
        let mut s = Schema::new(0, StructType::new(vec![field(1, "a", false, PrimitiveType::Int)]));
        s.identifier_field_ids = vec![1];
        assert!(s.validate().is_err());
    }
}
