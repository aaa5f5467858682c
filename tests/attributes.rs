use std::sync::Arc;

use chrono::NaiveDate;
use docmap::datatype::{Decimal, FieldType};
use docmap::field::Field;
use docmap::persist::Persistor;
use docmap::schema::{EntityType, Schema};
use docmap::settings::{PersistenceMode, Settings};
use docmap::{DocmapError, Session, Value, doc};

docmap::accessors! {
    trait BookFields {
        title / set_title: String,
        pages / set_pages: i64,
    }
}

fn stamp() -> Value {
    Value::String(String::from("stamped"))
}

fn library(dynamic: bool) -> Session {
    let mut book = EntityType::new("Book");
    book.add_field(Field::new("title", FieldType::String))
        .add_field(Field::new("pages", FieldType::Integer))
        .add_field(Field::new("price", FieldType::Decimal))
        .add_field(Field::new("published", FieldType::Date))
        .add_field(Field::new("rating", FieldType::Float))
        .add_field(Field::new("available", FieldType::Boolean).with_default(true))
        .add_field(Field::new("tags", FieldType::Array).with_default(Vec::<Value>::new()))
        .add_field(Field::new("label", FieldType::String).with_computed_default(stamp));
    let mut schema = Schema::new();
    schema.keep(book);
    let settings = Settings {
        allow_dynamic_fields: dynamic,
        ..Settings::default()
    };
    let store = Persistor::new(PersistenceMode::InMemory).expect("persistor");
    Session::with_settings(Arc::new(schema), Box::new(store), settings)
}

#[test]
fn values_are_cast_to_field_types() {
    let mut session = library(true);
    let book = session
        .instantiate(
            "Book",
            doc! {
                "title" => 42,
                "pages" => "412",
                "price" => "12.50",
                "published" => "1965-08-01",
                "rating" => "4.5",
                "available" => "false",
            },
        )
        .expect("book");
    let document = session.document(book).expect("kept");
    assert_eq!(document.read("title").expect("title"), Value::from("42"));
    assert_eq!(document.read("pages").expect("pages"), Value::Integer(412));
    assert_eq!(
        document.read("price").expect("price"),
        Value::Decimal(Decimal::from_str("12.50").expect("decimal"))
    );
    assert_eq!(
        document.read("published").expect("published"),
        Value::Date(NaiveDate::from_ymd_opt(1965, 8, 1).expect("date"))
    );
    assert_eq!(document.read("rating").expect("rating"), Value::Float(4.5));
    assert_eq!(document.read("available").expect("available"), Value::Boolean(false));
}

#[test]
fn casting_is_idempotent() {
    let samples = [
        (FieldType::Integer, Value::from("7")),
        (FieldType::Float, Value::from(3)),
        (FieldType::Decimal, Value::from("1.10")),
        (FieldType::Date, Value::from("2024-02-29")),
        (FieldType::DateTime, Value::from("2024-02-29T10:15:00")),
        (FieldType::Boolean, Value::from("yes")),
        (FieldType::String, Value::from(12)),
    ];
    for (field_type, value) in samples {
        let once = field_type.cast(value).expect("castable");
        let twice = field_type.cast(once.clone()).expect("still castable");
        assert_eq!(once, twice, "{field_type} cast must be idempotent");
    }
}

#[test]
fn blank_strings_become_null_for_non_string_fields() {
    let mut session = library(true);
    let book = session
        .instantiate("Book", doc! { "pages" => "", "title" => "" })
        .expect("book");
    let document = session.document(book).expect("kept");
    assert_eq!(document.read("pages").expect("pages"), Value::Null);
    assert_eq!(document.read("title").expect("title"), Value::from(""));
}

#[test]
fn uncastable_values_are_rejected_and_nothing_is_written() {
    let mut session = library(true);
    let result = session.instantiate("Book", doc! { "title" => "Dune", "pages" => "many" });
    match result {
        Err(DocmapError::InvalidType { field, target, .. }) => {
            assert_eq!(field, "pages");
            assert_eq!(target, "Integer");
        }
        other => panic!("expected InvalidType, got {other:?}"),
    }
    assert!(session.keeper().is_empty(), "a failed bulk assignment keeps nothing");

    let book = session.instantiate("Book", doc! { "title" => "Dune" }).expect("book");
    let document = session.document_mut(book).expect("kept");
    assert!(document.write("pages", "many").is_err());
    assert_eq!(document.read("pages").expect("pages"), Value::Null);
}

#[test]
fn numbers_that_do_not_fit_are_rejected() {
    let mut session = library(true);
    for pages in [Value::Float(1e30), Value::from("1e30"), Value::Float(-1e19)] {
        match session.instantiate("Book", doc! { "pages" => pages }) {
            Err(DocmapError::InvalidType { field, .. }) => assert_eq!(field, "pages"),
            other => panic!("expected InvalidType, got {other:?}"),
        }
    }
    for rating in [Value::from("inf"), Value::from("NaN"), Value::Float(f64::NEG_INFINITY)] {
        match session.instantiate("Book", doc! { "rating" => rating }) {
            Err(DocmapError::InvalidType { field, target, .. }) => {
                assert_eq!(field, "rating");
                assert_eq!(target, "Float");
            }
            other => panic!("expected InvalidType, got {other:?}"),
        }
    }
    assert!(session.keeper().is_empty());

    let book = session
        .instantiate("Book", doc! { "pages" => -12.7, "price" => 0.1 })
        .expect("book");
    let document = session.document(book).expect("kept");
    assert_eq!(document.read("pages").expect("pages"), Value::Integer(-12));
    assert_eq!(
        document.read("price").expect("price"),
        Value::Decimal(Decimal::from_str("0.1").expect("decimal"))
    );
}

#[test]
fn defaults_are_applied_without_recording_changes() {
    let mut session = library(true);
    let book = session.instantiate("Book", doc! {}).expect("book");
    let document = session.document(book).expect("kept");
    assert_eq!(document.read("available").expect("available"), Value::Boolean(true));
    assert_eq!(document.read("tags").expect("tags"), Value::Array(Vec::new()));
    assert_eq!(document.read("label").expect("label"), Value::from("stamped"));
    assert!(!document.changed(), "defaults are not changes");
    assert!(document.identity().is_some());
}

#[test]
fn changes_track_first_old_value_and_reverts() {
    let mut session = library(true);
    let book = session.instantiate("Book", doc! { "title" => "Dune" }).expect("book");
    session.save(book).expect("save");

    let document = session.document_mut(book).expect("kept");
    assert!(!document.changed(), "saving clears changes");
    document.write("title", "Dune Messiah").expect("write");
    document.write("title", "Children of Dune").expect("write");
    assert_eq!(
        document.changes().get("title"),
        Some(&(Value::from("Dune"), Value::from("Children of Dune")))
    );
    document.write("title", "Dune").expect("write");
    assert!(!document.changed(), "writing the original value back is no change");
}

#[test]
fn strict_mode_refuses_undeclared_attributes() {
    let mut session = library(false);
    match session.instantiate("Book", doc! { "mood" => "happy" }) {
        Err(DocmapError::UnknownAttribute { attribute, .. }) => assert_eq!(attribute, "mood"),
        other => panic!("expected UnknownAttribute, got {other:?}"),
    }
    let book = session.instantiate("Book", doc! { "title" => "Dune" }).expect("book");
    let document = session.document_mut(book).expect("kept");
    assert!(matches!(
        document.read("mood"),
        Err(DocmapError::UndeclaredAttribute { .. })
    ));
    assert!(matches!(
        document.write("mood", "grim"),
        Err(DocmapError::UndeclaredAttribute { .. })
    ));
}

#[test]
fn dynamic_mode_keeps_undeclared_attributes_verbatim() {
    let mut session = library(true);
    let book = session
        .instantiate("Book", doc! { "mood" => "happy", "shelf" => 3 })
        .expect("book");
    let document = session.document(book).expect("kept");
    assert_eq!(document.read("mood").expect("mood"), Value::from("happy"));
    assert_eq!(document.read("shelf").expect("shelf"), Value::Integer(3));
    assert_eq!(document.get::<String>("shelf").expect("typed"), Some(String::from("3")));
}

#[test]
fn reads_are_recorded_as_accessed() {
    let mut session = library(true);
    let book = session.instantiate("Book", doc! { "title" => "Dune" }).expect("book");
    let document = session.document(book).expect("kept");
    document.read("title").expect("title");
    assert!(document.attributes().accessed().contains("title"));
    assert!(!document.attributes().accessed().contains("pages"));
}

#[test]
fn generated_accessors_read_and_write_typed_values() {
    let mut session = library(true);
    let book = session.instantiate("Book", doc! {}).expect("book");
    let document = session.document_mut(book).expect("kept");
    document.set_title(String::from("Dune")).expect("set title");
    document.set_pages(412).expect("set pages");
    assert_eq!(document.title().expect("title"), Some(String::from("Dune")));
    assert_eq!(document.pages().expect("pages"), Some(412));
    assert!(document.attributes().is_changed("pages"));
}
