use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{Schema, Typed};

/// Upgrade transform from the previous version's validated data to this one.
pub type UpgradeFn = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// A serde type that is the shape of one version of an entity.
///
/// The `#[versioned_shape(version = N)]` macro implements this.
pub trait Shape: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The version number this shape belongs to.
    const VERSION: u32;
}

/// One schema generation of a versioned entity.
///
/// Pairs the structural validator for this version with either nothing (the
/// initial version) or an upgrade transform from the version directly before
/// it. Upgrades only ever run on data the previous version's schema already
/// accepted, so they are expected to be total. A panicking upgrade is a bug in
/// the entity definition and is not caught.
pub struct VersionDef {
    schema: Box<dyn Schema>,
    upgrade: Option<UpgradeFn>,
}

impl VersionDef {
    /// The first version of an entity: a schema and no upgrade.
    pub fn initial(schema: impl Schema + 'static) -> Self {
        Self {
            schema: Box::new(schema),
            upgrade: None,
        }
    }

    /// A later version: a schema plus the transform from the previous version.
    pub fn upgrade(
        schema: impl Schema + 'static,
        up: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            schema: Box::new(schema),
            upgrade: Some(Box::new(up)),
        }
    }

    /// The initial version, validated by deserializing into `T`.
    pub fn typed_initial<T>() -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Self::initial(Typed::<T>::new())
    }

    /// A later version whose schema is `C` and whose upgrade maps `P` to `C`.
    ///
    /// # Panics
    ///
    /// The generated upgrade panics if the previous version's validated data
    /// does not deserialize into `P`, or if `C` fails to serialize. Either
    /// means the previous version's schema and `P` disagree, which is a
    /// defect in the entity definition rather than in the input.
    pub fn typed_upgrade<P, C, F>(up: F) -> Self
    where
        P: DeserializeOwned + 'static,
        C: Serialize + DeserializeOwned + 'static,
        F: Fn(P) -> C + Send + Sync + 'static,
    {
        Self::upgrade(Typed::<C>::new(), move |value| {
            let prev: P = match serde_json::from_value(value) {
                Ok(prev) => prev,
                Err(e) => panic!(
                    "upgrade input does not match {}: {e}",
                    std::any::type_name::<P>()
                ),
            };
            match serde_json::to_value(up(prev)) {
                Ok(next) => next,
                Err(e) => panic!(
                    "upgrade output {} failed to serialize: {e}",
                    std::any::type_name::<C>()
                ),
            }
        })
    }

    /// Whether this is an initial version (has no upgrade transform).
    pub fn is_initial(&self) -> bool {
        self.upgrade.is_none()
    }

    /// This version's validator.
    pub fn schema(&self) -> &dyn Schema {
        self.schema.as_ref()
    }

    /// The upgrade from the previous version, if this is not an initial version.
    pub fn upgrade_fn(&self) -> Option<&(dyn Fn(Value) -> Value + Send + Sync)> {
        self.upgrade.as_deref()
    }
}

impl fmt::Debug for VersionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionDef")
            .field("is_initial", &self.is_initial())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct V1 {
        name: String,
    }

    #[derive(Serialize, Deserialize)]
    struct V2 {
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn initial_has_no_upgrade() {
        let def = VersionDef::typed_initial::<V1>();
        assert!(def.is_initial());
        assert!(def.upgrade_fn().is_none());
        assert!(def.schema().accepts(&json!({ "name": "x" })));
    }

    #[test]
    fn typed_upgrade_converts_between_shapes() {
        let def = VersionDef::typed_upgrade(|old: V1| V2 {
            name: old.name,
            tags: Vec::new(),
        });
        assert!(!def.is_initial());

        let up = def.upgrade_fn().unwrap();
        assert_eq!(
            up(json!({ "name": "x" })),
            json!({ "name": "x", "tags": [] })
        );
        assert!(def.schema().accepts(&json!({ "name": "x", "tags": ["a"] })));
        assert!(!def.schema().accepts(&json!({ "name": "x" })));
    }

    #[test]
    #[should_panic(expected = "upgrade input does not match")]
    fn typed_upgrade_panics_on_mismatched_input() {
        let def = VersionDef::typed_upgrade(|old: V1| V2 {
            name: old.name,
            tags: Vec::new(),
        });
        let up = def.upgrade_fn().unwrap();
        up(json!({ "title": "not a v1" }));
    }

    #[test]
    fn debug_shows_kind() {
        let def = VersionDef::upgrade(crate::shape::any(), |v| v);
        assert_eq!(format!("{def:?}"), "VersionDef { is_initial: false, .. }");
    }
}
