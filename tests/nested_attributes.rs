mod common;

use docmap::{DocmapError, Identity, Session, Value, doc};

fn addresses(session: &mut Session, person: Identity) -> Vec<Identity> {
    session
        .many(person, "addresses")
        .expect("proxy")
        .target()
        .expect("addresses")
}

fn entries(documents: Vec<docmap::RawDocument>) -> Value {
    Value::Array(documents.into_iter().map(Value::Document).collect())
}

#[test]
fn nested_entries_build_children_after_the_parent_has_an_identity() {
    let (mut session, _store) = common::session();
    let alice = session
        .instantiate(
            "Person",
            doc! {
                "name" => "Alice",
                "addresses_attributes" => entries(vec![
                    doc! { "street" => "Main Street" },
                    doc! { "street" => "", "city" => "" },
                ]),
            },
        )
        .expect("alice");
    let children = addresses(&mut session, alice);
    assert_eq!(children.len(), 1, "all-blank entries are rejected");
    let parent = session.document(children[0]).expect("kept").embedded_in().cloned();
    assert_eq!(parent.map(|p| p.identity), Some(alice));
}

#[test]
fn nested_entries_update_and_destroy_by_identity() {
    let (mut session, _store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    session
        .assign_nested(
            alice,
            "addresses",
            entries(vec![doc! { "street" => "Main Street" }, doc! { "street" => "Lake Road" }]),
        )
        .expect("create");
    let children = addresses(&mut session, alice);
    let (home, cabin) = (children[0], children[1]);

    session
        .assign_attributes(
            alice,
            doc! {
                "addresses_attributes" => entries(vec![
                    doc! { "_id" => home, "city" => "Springfield" },
                    doc! { "_id" => cabin, "_destroy" => true },
                ]),
            },
        )
        .expect("update and destroy");
    assert_eq!(addresses(&mut session, alice), vec![home]);
    assert_eq!(
        session.document(home).expect("kept").read("city").expect("city"),
        Value::from("Springfield")
    );
    assert!(session.document(cabin).is_err());
}

#[test]
fn position_keyed_maps_are_applied_in_order() {
    let (mut session, _store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    session
        .assign_nested(
            alice,
            "addresses",
            Value::Document(doc! {
                "1" => doc! { "street" => "second" },
                "0" => doc! { "street" => "first" },
            }),
        )
        .expect("assign");
    let children = addresses(&mut session, alice);
    let streets: Vec<Value> = children
        .iter()
        .map(|child| session.document(*child).expect("kept").read("street").expect("street"))
        .collect();
    assert_eq!(streets, vec![Value::from("first"), Value::from("second")]);
}

#[test]
fn limit_is_checked_before_anything_changes() {
    let (mut session, _store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let four = entries((0..4).map(|i| doc! { "street" => format!("street {i}") }).collect());
    match session.assign_nested(alice, "addresses", four) {
        Err(DocmapError::TooManyNestedRecords { limit, .. }) => assert_eq!(limit, 3),
        other => panic!("expected TooManyNestedRecords, got {other:?}"),
    }
    assert!(addresses(&mut session, alice).is_empty());
}

#[test]
fn unknown_identity_is_not_found() {
    let (mut session, _store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let stranger = Identity::new(4242);
    match session.assign_nested(alice, "addresses", entries(vec![doc! { "_id" => stranger }])) {
        Err(DocmapError::NotFound { identities, .. }) => assert_eq!(identities, vec![stranger]),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn destroy_flag_is_ignored_without_allow_destroy() {
    let (mut session, _store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let post = session
        .many(alice, "posts")
        .expect("proxy")
        .build(doc! { "title" => "Hello" })
        .expect("post");
    session
        .assign_nested(
            alice,
            "posts",
            entries(vec![doc! { "_id" => post, "_destroy" => "1", "title" => "Kept" }]),
        )
        .expect("assign");
    assert_eq!(
        session.document(post).expect("kept").read("title").expect("title"),
        Value::from("Kept")
    );
    assert_eq!(session.many(alice, "posts").expect("proxy").len().expect("len"), 1);
}

#[test]
fn nested_posts_are_referenced_documents() {
    let (mut session, _store) = common::session();
    let alice = session
        .instantiate(
            "Person",
            doc! { "posts_attributes" => entries(vec![doc! { "title" => "First" }]) },
        )
        .expect("alice");
    let posts = session.many(alice, "posts").expect("proxy").target().expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(
        session.document(posts[0]).expect("kept").read("person_id").expect("key"),
        Value::Identity(alice)
    );
}

#[test]
fn nested_one_relation_builds_then_updates_in_place() {
    let (mut session, _store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    session
        .assign_nested(alice, "passport", Value::Document(doc! { "number" => "X1" }))
        .expect("build");
    let passport = session
        .one(alice, "passport")
        .expect("proxy")
        .target()
        .expect("target")
        .expect("passport");
    session
        .assign_nested(
            alice,
            "passport",
            Value::Document(doc! { "_id" => passport, "number" => "X2" }),
        )
        .expect("update");
    assert_eq!(
        session.one(alice, "passport").expect("proxy").target().expect("target"),
        Some(passport)
    );
    assert_eq!(
        session.document(passport).expect("kept").read("number").expect("number"),
        Value::from("X2")
    );
}

#[test]
fn nested_key_for_an_unaccepted_relation_is_unknown() {
    let (mut session, _store) = common::session();
    let tea = session.instantiate("Preference", doc! { "name" => "tea" }).expect("tea");
    assert!(matches!(
        session.assign_nested(tea, "people", Value::Array(Vec::new())),
        Err(DocmapError::UnknownAttribute { .. })
    ));
}
