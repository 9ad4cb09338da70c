//! Partial-update resolution.
//!
//! An update call carries a routing key (the record id) and a set of fields to change. This
//! module splits the two apart and guarantees that `id` and `created_at` never reach the
//! persisted field set:
//!
//! - raw bundles (HTTP bodies) go through [`resolve_patch`], which drops the immutable keys
//!   before decoding the remainder into a typed patch;
//! - typed patches describe their changes as [`Assignment`]s over a field enum that has no
//!   variant for `id` or `created_at`, so the exclusion holds for every caller.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::domain::{parse_validated, RecordId, Validate};
use crate::errors::ValidationError;

/// Keys that identify a record or stamp its creation. They are never updatable.
pub const IMMUTABLE_FIELDS: [&str; 2] = ["id", "created_at"];

/// A persisted column that a patch may assign.
pub trait FieldColumn: Copy + fmt::Debug + PartialEq {
    fn column(&self) -> &'static str;
}

/// One column assignment, with the value already in its stored text form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment<F> {
    pub field: F,
    pub value: String,
}

impl<F: FieldColumn> Assignment<F> {
    pub fn new(field: F, value: impl Into<String>) -> Self {
        Self { field, value: value.into() }
    }

    pub fn column(&self) -> &'static str {
        self.field.column()
    }
}

/// A set of optional field changes. Absent fields stay untouched.
pub trait PartialUpdate: Validate {
    type Field: FieldColumn;
    type Record;

    /// Changes in a stable column order.
    fn assignments(&self) -> Vec<Assignment<Self::Field>>;

    /// Apply the supplied fields to an in-memory record.
    fn apply_to(&self, record: &mut Self::Record);

    fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }
}

/// Routing key plus the field set to persist.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedUpdate<P> {
    pub id: RecordId,
    pub patch: P,
}

impl<P> ResolvedUpdate<P> {
    pub fn new(id: RecordId, patch: P) -> Self {
        Self { id, patch }
    }
}

/// Remove `id` and `created_at` from a raw bundle. Returns the keys that were dropped.
pub fn strip_immutable(bundle: &mut Map<String, Value>) -> Vec<&'static str> {
    IMMUTABLE_FIELDS.iter().copied().filter(|key| bundle.remove(*key).is_some()).collect()
}

/// Resolve a raw update body addressed to `id`.
///
/// Immutable keys in the body are ignored, even when they disagree with `id`. The remaining
/// fields are decoded and checked by the patch type's validating parse.
pub fn resolve_patch<P>(id: RecordId, bundle: Value) -> Result<ResolvedUpdate<P>, ValidationError>
where
    P: DeserializeOwned + Validate,
{
    let mut fields = match bundle {
        Value::Object(fields) => fields,
        Value::Null => Map::new(),
        _ => return Err(ValidationError::NotAnObject),
    };
    strip_immutable(&mut fields);

    let patch = parse_validated::<P>(Value::Object(fields))?;
    Ok(ResolvedUpdate::new(id, patch))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{resolve_patch, strip_immutable, PartialUpdate};
    use crate::domain::lead::{LeadField, LeadPatch, LeadStatus};
    use crate::domain::RecordId;
    use crate::errors::ValidationError;

    #[test]
    fn strip_immutable_drops_id_and_created_at_only() {
        let mut bundle = json!({
            "id": "other",
            "created_at": "2020-01-01T00:00:00Z",
            "notes": "kept"
        })
        .as_object()
        .cloned()
        .expect("object");

        let dropped = strip_immutable(&mut bundle);

        assert_eq!(dropped, vec!["id", "created_at"]);
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle["notes"], "kept");
    }

    #[test]
    fn resolve_patch_routes_by_given_id_and_ignores_body_id() {
        let resolved = resolve_patch::<LeadPatch>(
            RecordId::from("lead-1"),
            json!({ "id": "lead-2", "created_at": "1999-01-01T00:00:00Z", "status": "qualified" }),
        )
        .expect("resolve");

        assert_eq!(resolved.id, RecordId::from("lead-1"));
        let assignments = resolved.patch.assignments();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].field, LeadField::Status);
        assert_eq!(assignments[0].value, LeadStatus::Qualified.as_str());
    }

    #[test]
    fn resolve_patch_with_only_immutable_keys_is_empty() {
        let resolved = resolve_patch::<LeadPatch>(
            RecordId::from("lead-1"),
            json!({ "id": "lead-1", "created_at": "1999-01-01T00:00:00Z" }),
        )
        .expect("resolve");

        assert!(resolved.patch.is_empty());
    }

    #[test]
    fn resolve_patch_rejects_non_object_bodies() {
        let error = resolve_patch::<LeadPatch>(RecordId::from("lead-1"), json!(["status"]))
            .expect_err("array body");

        assert_eq!(error, ValidationError::NotAnObject);
    }

    #[test]
    fn resolve_patch_rejects_out_of_enum_status() {
        let error =
            resolve_patch::<LeadPatch>(RecordId::from("lead-1"), json!({ "status": "won" }))
                .expect_err("won is not a lead status");

        assert!(matches!(error, ValidationError::Schema(ref message) if message.contains("won")));
    }
}
