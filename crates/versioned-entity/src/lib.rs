//! # versioned-entity
//!
//! Versioned entities for untyped data whose shape has changed over time.
//!
//! An entity is an ordered chain of schema versions. Each version has a
//! validator, and every version after the first has an upgrade transform from
//! the version before it. Given raw input, an entity detects which version it
//! is, validates it against that version, and walks the upgrade chain to the
//! latest version or to an explicit bound.
//!
//! ## How It Works
//!
//! 1. A user-supplied **detection function** reads the version of the input.
//! 2. The input is **validated** against that version's [`Schema`].
//! 3. **Upgrades** run one version at a time, each receiving the previous output.
//! 4. The first failure is reported as a tagged [`ParseError`].
//!
//! ## Key Concepts
//!
//! - **Linear chain**: Upgrades run v1→v2→v3→...→target, never skipping steps.
//! - **Bounded migration**: [`VersionedEntity::safe_parse_up_to_version`] stops at
//!   a given version, so an upgrade written for v2 can migrate its own nested
//!   children without ever seeing a v3 shape.
//! - **Definition bugs are data**: gaps or misplaced initial versions come back
//!   as `BUG_*` errors, distinct from bad input, instead of panicking.
//! - **Immutable**: an entity is never modified after it is built and can be
//!   shared between threads and re-entered from its own upgrades.
//!
//! ## Quick Start
//!
//! ```
//! use serde_json::json;
//! use versioned_entity::{shape, VersionDef, VersionedEntity};
//!
//! let variable_v1 = || shape::object().field("name", shape::string()).field("value", shape::string());
//!
//! let environment = VersionedEntity::builder()
//!     .name("environment")
//!     .version(1, VersionDef::initial(
//!         shape::object()
//!             .field("v", shape::literal(json!(1)))
//!             .field("name", shape::string())
//!             .field("variables", shape::array(variable_v1())),
//!     ))
//!     .version(2, VersionDef::upgrade(
//!         shape::object()
//!             .field("v", shape::literal(json!(2)))
//!             .field("name", shape::string())
//!             .field("variables", shape::array(variable_v1().field("masked", shape::boolean()))),
//!         |mut old| {
//!             old["v"] = json!(2);
//!             if let Some(vars) = old["variables"].as_array_mut() {
//!                 for var in vars {
//!                     var["masked"] = json!(false);
//!                 }
//!             }
//!             old
//!         },
//!     ))
//!     .build();
//!
//! let latest = environment
//!     .safe_parse(&json!({ "v": 1, "name": "x", "variables": [{ "name": "a", "value": "b" }] }))
//!     .unwrap();
//! assert_eq!(
//!     latest,
//!     json!({ "v": 2, "name": "x", "variables": [{ "name": "a", "value": "b", "masked": false }] })
//! );
//! ```

#![warn(missing_docs)]

mod definition;
mod entity;
mod reference;

pub mod detect;
pub mod schema;
pub mod shape;

pub use definition::{Shape, UpgradeFn, VersionDef};
pub use entity::{
    ChainError, DetectFn, EntityBuilder, EntityConfig, ErrorKind, IntoError, ParseError,
    VersionedEntity,
};
pub use reference::{entity_ref, entity_ref_up_to_version, EntityRef};
pub use schema::{lazy, Issue, Lazy, PathSegment, Schema, SchemaError, Typed};

// Re-export proc macros when the `macros` feature is enabled.
#[cfg(feature = "macros")]
pub use versioned_entity_macros::{upgrade, versioned_shape};
