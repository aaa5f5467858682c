mod common;

use docmap::criteria::Criteria;
use docmap::document::Parent;
use docmap::relations::{Find, Found};
use docmap::settings::Settings;
use docmap::{Identity, Session, Value, doc};

fn street(session: &Session, address: Identity) -> Value {
    session
        .document(address)
        .expect("kept")
        .read("street")
        .expect("street")
}

#[test]
fn embedded_children_live_inside_the_parent() {
    let (mut session, store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let home = session
        .many(alice, "addresses")
        .expect("proxy")
        .build(doc! { "street" => "Main Street", "city" => "Springfield" })
        .expect("build");
    assert_eq!(
        session.document(home).expect("kept").embedded_in(),
        Some(&Parent {
            identity: alice,
            relation: String::from("addresses"),
        })
    );

    let stored = session.as_document(alice).expect("as_document");
    let addresses = stored["addresses"].as_array().expect("inline array");
    assert_eq!(addresses.len(), 1);
    assert_eq!(
        addresses[0].as_document().expect("inline document")["street"],
        Value::from("Main Street")
    );

    // saving the child saves the root document
    session.save(home).expect("save");
    assert_eq!(store.calls.persist.get(), 1);
    assert!(session.document(alice).expect("kept").is_persisted());
    assert!(session.document(home).expect("kept").is_persisted());
    assert_eq!(store.persistor().borrow().len("addresses").expect("count"), 0);
}

#[test]
fn embedded_children_load_without_store_calls() {
    let (mut session, store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let home = session
        .many(alice, "addresses")
        .expect("proxy")
        .build(doc! { "street" => "Main Street" })
        .expect("build");
    session.save(alice).expect("save");

    let mut fresh = common::session_with(&store, Settings::default());
    fresh.find("Person", alice).expect("find");
    let before = store.calls.reads();
    let children = fresh.many(alice, "addresses").expect("proxy").target().expect("children");
    assert_eq!(children, vec![home], "identities survive the round trip");
    assert_eq!(store.calls.reads(), before);
    assert_eq!(street(&fresh, home), Value::from("Main Street"));
    assert!(fresh.document(home).expect("kept").is_persisted());
}

#[test]
fn deleting_a_child_saves_the_parent_without_it() {
    let (mut session, store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let mut proxy = session.many(alice, "addresses").expect("proxy");
    let home = proxy.build(doc! { "street" => "Main Street" }).expect("home");
    let work = proxy.build(doc! { "street" => "Office Park" }).expect("work");
    session.save(alice).expect("save");

    let mut fresh = common::session_with(&store, Settings::default());
    fresh.find("Person", alice).expect("find");
    fresh.many(alice, "addresses").expect("proxy").target().expect("children");
    fresh.delete(home).expect("delete");
    assert!(fresh.document(home).is_err());

    let mut third = common::session_with(&store, Settings::default());
    third.find("Person", alice).expect("find");
    let children = third.many(alice, "addresses").expect("proxy").target().expect("children");
    assert_eq!(children, vec![work]);
}

#[test]
fn embeds_one_replaces_and_evicts() {
    let (mut session, _store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let first = session
        .one(alice, "passport")
        .expect("proxy")
        .build(doc! { "number" => "X1" })
        .expect("first");
    let second = session
        .one(alice, "passport")
        .expect("proxy")
        .build(doc! { "number" => "X2" })
        .expect("second");
    assert!(session.document(first).is_err(), "a replaced embedded child is dropped");
    let stored = session.as_document(alice).expect("as_document");
    let passport = stored["passport"].as_document().expect("inline passport");
    assert_eq!(passport["number"], Value::from("X2"));
    assert_eq!(passport["_id"], Value::Identity(second));

    session.one(alice, "passport").expect("proxy").nullify().expect("nullify");
    let stored = session.as_document(alice).expect("as_document");
    assert_eq!(stored["passport"], Value::Null);
}

#[test]
fn embedded_find_and_delete_all_stay_in_memory() {
    let (mut session, store) = common::session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).expect("alice");
    let mut proxy = session.many(alice, "addresses").expect("proxy");
    let home = proxy
        .build(doc! { "street" => "Main Street", "city" => "Springfield" })
        .expect("home");
    let cabin = proxy
        .build(doc! { "street" => "Lake Road", "city" => "Shelbyville" })
        .expect("cabin");
    assert_eq!(
        proxy
            .find(Find::First(Criteria::new().where_eq("city", "Shelbyville")))
            .expect("first"),
        Found::One(cabin)
    );
    let removed = proxy
        .delete_all(Criteria::new().where_eq("city", "Shelbyville"))
        .expect("delete_all");
    assert_eq!(removed, 1);
    assert_eq!(proxy.target().expect("children"), vec![home]);
    assert_eq!(store.calls.find_by_selector.get(), 0);
    assert_eq!(store.calls.delete_matching.get(), 0);
    assert!(session.document(cabin).is_err());
}
