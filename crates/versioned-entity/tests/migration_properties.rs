//! Property tests for the upgrade walk.
//!
//! Every version `n` accepts `{ "v": n, "visited": [..] }` and its upgrade
//! appends `n` to `visited`, so the output records exactly which upgrades ran
//! and in which order.

use proptest::prelude::*;
use serde_json::{json, Value};
use versioned_entity::{shape, ParseError, Schema, VersionDef, VersionedEntity};

fn at(ver: u32) -> impl Schema {
    shape::object()
        .field("v", shape::literal(json!(ver)))
        .field("visited", shape::array(shape::integer()))
}

fn visit(to: u32) -> impl Fn(Value) -> Value + Send + Sync {
    move |mut old| {
        old["v"] = json!(to);
        if let Some(visited) = old["visited"].as_array_mut() {
            visited.push(json!(to));
        }
        old
    }
}

/// A well-formed chain 1..=latest, minus any version in `holes`.
fn entity(latest: u32, holes: &[u32]) -> VersionedEntity {
    let mut builder = VersionedEntity::builder()
        .latest(latest)
        .version(1, VersionDef::initial(at(1)));
    for ver in 2..=latest {
        if !holes.contains(&ver) {
            builder = builder.version(ver, VersionDef::upgrade(at(ver), visit(ver)));
        }
    }
    builder.build()
}

fn input(ver: u32) -> Value {
    json!({ "v": ver, "visited": [] })
}

proptest! {
    #[test]
    fn parse_visits_every_later_version_in_order(
        (latest, start) in (1u32..24).prop_flat_map(|latest| (Just(latest), 1..=latest))
    ) {
        let out = entity(latest, &[]).safe_parse(&input(start)).unwrap();

        let expected: Vec<Value> = (start + 1..=latest).map(|v| json!(v)).collect();
        prop_assert_eq!(&out["visited"], &Value::Array(expected));
        prop_assert_eq!(&out["v"], &json!(latest));
    }

    #[test]
    fn bounded_parse_visits_up_to_bound(
        (latest, start, bound) in (1u32..24)
            .prop_flat_map(|latest| (Just(latest), 1..=latest, 1..=latest))
    ) {
        let result = entity(latest, &[]).safe_parse_up_to_version(&input(start), bound);

        if start > bound {
            let is_invalid_ver = matches!(result, Err(ParseError::InvalidVer { ver }) if ver == start);
            prop_assert!(is_invalid_ver);
        } else {
            let out = result.unwrap();
            let expected: Vec<Value> = (start + 1..=bound).map(|v| json!(v)).collect();
            prop_assert_eq!(&out["visited"], &Value::Array(expected));
            prop_assert_eq!(&out["v"], &json!(bound));
        }
    }

    #[test]
    fn first_gap_is_reported(
        (latest, holes) in (3u32..24).prop_flat_map(|latest| {
            (Just(latest), proptest::collection::vec(2..=latest, 1..4))
        })
    ) {
        let first = *holes.iter().min().unwrap();

        let result = entity(latest, &holes).safe_parse(&input(1));
        let reports_first = matches!(
            result,
            Err(ParseError::BugNoIntermediateFound { missing_ver }) if missing_ver == first
        );
        prop_assert!(reports_first);
    }

    #[test]
    fn up_to_version_matches_is_and_bound(latest in 1u32..12, ver in 0u32..16, bound in 0u32..16) {
        let entity = entity(latest, &[]);
        let data = input(ver);
        prop_assert_eq!(
            entity.is_up_to_version(&data, bound),
            entity.is(&data) && ver <= bound
        );
    }
}
