//! A self-referential tree entity.
//!
//! Each node holds children of the same entity. Child fields are validated
//! through a lazily resolved, version-bounded entity reference, and each
//! upgrade migrates its children only as far as its own target version.
//!
//! v1: `{ v: 1, name, children: [node<=v1] }`
//! v2: adds `collapsed: false`,            children: [node<=v2]
//! v3: renames `name` to `label`,          children: [node<=v3]

use std::sync::OnceLock;

use serde_json::{json, Value};
use versioned_entity::{
    entity_ref_up_to_version, lazy, shape, ParseError, VersionDef, VersionedEntity,
};

static TREE: OnceLock<VersionedEntity> = OnceLock::new();

fn tree() -> &'static VersionedEntity {
    TREE.get_or_init(build_tree)
}

fn children_up_to(bound: u32) -> impl versioned_entity::Schema {
    shape::array(lazy(move || entity_ref_up_to_version(tree(), bound)))
}

/// Migrate every child to exactly `bound`, checking what the upgrade was given.
fn migrate_children(node: &mut Value, expect_incoming: u32, bound: u32) {
    let children = node["children"].as_array_mut().expect("validated children");
    for child in children.iter_mut() {
        assert_eq!(
            child["v"],
            json!(expect_incoming),
            "upgrade received a child newer than its source version"
        );
        *child = tree()
            .safe_parse_up_to_version(child, bound)
            .expect("validated child migrates");
        assert_eq!(child["v"], json!(bound));
    }
}

fn build_tree() -> VersionedEntity {
    VersionedEntity::builder()
        .name("tree")
        .version(
            1,
            VersionDef::initial(
                shape::object()
                    .field("v", shape::literal(json!(1)))
                    .field("name", shape::string())
                    .field("children", children_up_to(1)),
            ),
        )
        .version(
            2,
            VersionDef::upgrade(
                shape::object()
                    .field("v", shape::literal(json!(2)))
                    .field("name", shape::string())
                    .field("collapsed", shape::boolean())
                    .field("children", children_up_to(2)),
                |mut old: Value| {
                    migrate_children(&mut old, 1, 2);
                    old["v"] = json!(2);
                    old["collapsed"] = json!(false);
                    old
                },
            ),
        )
        .version(
            3,
            VersionDef::upgrade(
                shape::object()
                    .field("v", shape::literal(json!(3)))
                    .field("label", shape::string())
                    .field("collapsed", shape::boolean())
                    .field("children", children_up_to(3)),
                |mut old: Value| {
                    migrate_children(&mut old, 2, 3);
                    json!({
                        "v": 3,
                        "label": old["name"].take(),
                        "collapsed": old["collapsed"].take(),
                        "children": old["children"].take(),
                    })
                },
            ),
        )
        .build()
}

fn leaf_v1(name: &str) -> Value {
    json!({ "v": 1, "name": name, "children": [] })
}

#[test]
fn whole_tree_reaches_latest() {
    let root = json!({
        "v": 1,
        "name": "root",
        "children": [
            leaf_v1("a"),
            { "v": 1, "name": "b", "children": [leaf_v1("b1")] }
        ]
    });

    let out = tree().safe_parse(&root).unwrap();
    assert_eq!(
        out,
        json!({
            "v": 3,
            "label": "root",
            "collapsed": false,
            "children": [
                { "v": 3, "label": "a", "collapsed": false, "children": [] },
                {
                    "v": 3,
                    "label": "b",
                    "collapsed": false,
                    "children": [
                        { "v": 3, "label": "b1", "collapsed": false, "children": [] }
                    ]
                }
            ]
        })
    );
    assert!(tree().is_latest(&out));
}

#[test]
fn bounded_parse_keeps_children_at_bound() {
    let root = json!({ "v": 1, "name": "root", "children": [leaf_v1("a")] });
    let out = tree().safe_parse_up_to_version(&root, 2).unwrap();
    assert_eq!(
        out,
        json!({
            "v": 2,
            "name": "root",
            "collapsed": false,
            "children": [
                { "v": 2, "name": "a", "collapsed": false, "children": [] }
            ]
        })
    );
}

#[test]
fn older_children_under_newer_parent_are_migrated() {
    let root = json!({
        "v": 2,
        "name": "root",
        "collapsed": true,
        "children": [leaf_v1("old")]
    });
    let out = tree().safe_parse(&root).unwrap();
    assert_eq!(out["collapsed"], json!(true));
    assert_eq!(out["children"][0]["v"], json!(3));
    assert_eq!(out["children"][0]["label"], json!("old"));
}

#[test]
fn child_newer_than_parent_is_rejected() {
    let root = json!({
        "v": 1,
        "name": "root",
        "children": [{ "v": 2, "name": "new", "collapsed": false, "children": [] }]
    });

    assert!(!tree().is(&root));
    let err = tree().safe_parse(&root).unwrap_err();
    match err {
        ParseError::GivenVerValidationFail { ver, error, .. } => {
            assert_eq!(ver, 1);
            assert_eq!(
                error.to_string(),
                "at `.children[0]`: invalid tree: INVALID_VER"
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn membership_up_to_version() {
    let v2 = json!({ "v": 2, "name": "n", "collapsed": false, "children": [] });
    assert!(tree().is(&v2));
    assert!(tree().is_up_to_version(&v2, 2));
    assert!(tree().is_up_to_version(&v2, 3));
    assert!(!tree().is_up_to_version(&v2, 1));
}

#[test]
fn chain_is_well_formed() {
    assert_eq!(tree().check_chain(), Ok(()));
}
