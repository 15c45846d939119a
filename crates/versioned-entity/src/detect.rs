//! Ready-made version-detection functions.
//!
//! A detector inspects raw input and answers the version it belongs to, or
//! `None` if it cannot tell. Returning a version the entity does not define is
//! fine; the entity reports it as `INVALID_VER`.

use serde_json::Value;

use crate::schema::Schema;

/// Read the version from an integer field of an object, e.g. `{"v": 2}`.
///
/// Non-objects, missing fields, and values that are not integers in `u32`
/// range all give `None`.
///
/// ```
/// use serde_json::json;
/// use versioned_entity::detect;
///
/// let detect = detect::integer_field("v");
/// assert_eq!(detect(&json!({ "v": 3 })), Some(3));
/// assert_eq!(detect(&json!({ "v": "3" })), None);
/// assert_eq!(detect(&json!([3])), None);
/// ```
pub fn integer_field(key: &str) -> impl Fn(&Value) -> Option<u32> + Send + Sync {
    let key = key.to_owned();
    move |data: &Value| {
        data.as_object()?
            .get(&key)?
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
    }
}

/// Always answer `ver`. For entities whose input carries no version marker.
pub fn fixed(ver: u32) -> impl Fn(&Value) -> Option<u32> + Send + Sync {
    move |_: &Value| Some(ver)
}

/// Answer the first version whose probe schema accepts the input.
///
/// Probes are tried in the given order. Useful for legacy data that predates
/// a version field and can only be told apart by shape.
pub fn first_match(
    probes: Vec<(u32, Box<dyn Schema>)>,
) -> impl Fn(&Value) -> Option<u32> + Send + Sync {
    move |data: &Value| {
        probes
            .iter()
            .find(|(_, probe)| probe.accepts(data))
            .map(|(ver, _)| *ver)
    }
}
