use std::borrow::Borrow;

use serde_json::Value;

use crate::entity::VersionedEntity;
use crate::schema::{Schema, SchemaError};

/// A [`Schema`] that validates and migrates through a [`VersionedEntity`].
///
/// Lets an entity be used as the type of a field inside a larger schema. On
/// success the emitted value is the migrated one. On failure only a plain
/// rejection is reported; call the entity directly when the detailed
/// [`crate::ParseError`] matters.
///
/// `E` is anything that borrows as an entity: `&'static VersionedEntity`,
/// `Arc<VersionedEntity>`, or an owned entity.
///
/// ```
/// use std::sync::Arc;
/// use serde_json::json;
/// use versioned_entity::{shape, EntityRef, Schema, VersionDef, VersionedEntity};
///
/// let tag = Arc::new(
///     VersionedEntity::builder()
///         .version(1, VersionDef::initial(
///             shape::object().field("v", shape::literal(json!(1))).field("label", shape::string()),
///         ))
///         .build(),
/// );
///
/// let post = shape::object().field("tags", shape::array(EntityRef::new(Arc::clone(&tag))));
/// assert!(post.accepts(&json!({ "tags": [{ "v": 1, "label": "rust" }] })));
/// assert!(!post.accepts(&json!({ "tags": [{ "v": 3, "label": "rust" }] })));
/// ```
#[derive(Debug, Clone)]
pub struct EntityRef<E> {
    entity: E,
    bound: Option<u32>,
}

impl<E: Borrow<VersionedEntity>> EntityRef<E> {
    /// Validate and migrate to the entity's latest version.
    pub fn new(entity: E) -> Self {
        Self {
            entity,
            bound: None,
        }
    }

    /// Validate and migrate no further than `bound`; reject newer input.
    pub fn up_to_version(entity: E, bound: u32) -> Self {
        Self {
            entity,
            bound: Some(bound),
        }
    }

    /// The referenced entity.
    pub fn entity(&self) -> &VersionedEntity {
        self.entity.borrow()
    }

    /// The version bound, if any.
    pub fn bound(&self) -> Option<u32> {
        self.bound
    }
}

impl<E> Schema for EntityRef<E>
where
    E: Borrow<VersionedEntity> + Send + Sync,
{
    fn validate(&self, data: &Value) -> Result<Value, SchemaError> {
        let entity = self.entity.borrow();
        let result = match self.bound {
            Some(bound) => entity.safe_parse_up_to_version(data, bound),
            None => entity.safe_parse(data),
        };
        result.map_err(|e| SchemaError::new(format!("invalid {}: {}", entity.name(), e.kind())))
    }
}

/// Shorthand for [`EntityRef::new`].
pub fn entity_ref<E: Borrow<VersionedEntity>>(entity: E) -> EntityRef<E> {
    EntityRef::new(entity)
}

/// Shorthand for [`EntityRef::up_to_version`].
pub fn entity_ref_up_to_version<E: Borrow<VersionedEntity>>(
    entity: E,
    bound: u32,
) -> EntityRef<E> {
    EntityRef::up_to_version(entity, bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{shape, VersionDef};
    use serde_json::json;
    use std::sync::Arc;

    fn counter() -> Arc<VersionedEntity> {
        Arc::new(
            VersionedEntity::builder()
                .name("counter")
                .version(
                    1,
                    VersionDef::initial(
                        shape::object()
                            .field("v", shape::literal(json!(1)))
                            .field("n", shape::integer()),
                    ),
                )
                .version(
                    2,
                    VersionDef::upgrade(
                        shape::object()
                            .field("v", shape::literal(json!(2)))
                            .field("count", shape::integer()),
                        |old| json!({ "v": 2, "count": old["n"] }),
                    ),
                )
                .build(),
        )
    }

    #[test]
    fn emits_migrated_value() {
        let schema = entity_ref(counter());
        assert_eq!(
            schema.validate(&json!({ "v": 1, "n": 5 })).unwrap(),
            json!({ "v": 2, "count": 5 })
        );
    }

    #[test]
    fn bounded_reference_does_not_upgrade_past_bound() {
        let schema = entity_ref_up_to_version(counter(), 1);
        assert_eq!(
            schema.validate(&json!({ "v": 1, "n": 5 })).unwrap(),
            json!({ "v": 1, "n": 5 })
        );
        assert!(!schema.accepts(&json!({ "v": 2, "count": 5 })));
        assert!(schema.validate(&json!({ "v": 2, "count": 5 })).is_err());
    }

    #[test]
    fn failure_is_a_plain_rejection() {
        let schema = entity_ref(counter());
        let err = schema.validate(&json!({ "n": 5 })).unwrap_err();
        assert_eq!(err.to_string(), "invalid counter: VER_CHECK_FAIL");
    }

    #[test]
    fn nested_failure_reports_field_path() {
        let holder = shape::object().field("counter", entity_ref(counter()));
        let err = holder
            .validate(&json!({ "counter": { "v": 1, "n": "x" } }))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "at `.counter`: invalid counter: GIVEN_VER_VALIDATION_FAIL"
        );
    }

    #[test]
    fn accessors() {
        let schema = EntityRef::up_to_version(counter(), 1);
        assert_eq!(schema.bound(), Some(1));
        assert_eq!(schema.entity().name(), "counter");
        assert_eq!(EntityRef::new(counter()).bound(), None);
    }
}
