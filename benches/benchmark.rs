use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use docmap::datatype::FieldType;
use docmap::field::Field;
use docmap::persist::Persistor;
use docmap::relations::RelationOptions;
use docmap::schema::{EntityType, Schema};
use docmap::settings::{PersistenceMode, Settings};
use docmap::{Session, Value, doc};

fn schema() -> Arc<Schema> {
    let mut person = EntityType::new("Person");
    person
        .add_field(Field::new("name", FieldType::String))
        .add_field(Field::new("age", FieldType::Integer));
    person
        .add_relation(
            "preferences",
            "references_and_referenced_in_many",
            RelationOptions::new().inverse_of("people"),
        )
        .unwrap();
    let mut preference = EntityType::new("Preference");
    preference.add_field(Field::new("name", FieldType::String));
    preference
        .add_relation(
            "people",
            "references_and_referenced_in_many",
            RelationOptions::new()
                .class_name("Person")
                .inverse_of("preferences")
                .foreign_key("person_ids"),
        )
        .unwrap();
    let mut schema = Schema::new();
    schema.keep(person);
    schema.keep(preference);
    Arc::new(schema)
}

fn open_session() -> Session {
    let store = Persistor::new(PersistenceMode::InMemory).unwrap();
    Session::with_settings(schema(), Box::new(store), Settings::default())
}

fn criterion_benchmark(c: &mut Criterion) {
    let samples = [
        (FieldType::Integer, Value::from("412")),
        (FieldType::Decimal, Value::from("19.990")),
        (FieldType::DateTime, Value::from("2024-02-29T10:15:30.250")),
        (FieldType::Boolean, Value::from("yes")),
    ];
    for (field_type, value) in samples {
        c.bench_function(&format!("cast {field_type}"), |b| {
            b.iter(|| field_type.cast(black_box(value.clone())))
        });
    }

    let mut session = open_session();
    c.bench_function("instantiate", |b| {
        b.iter(|| {
            session
                .instantiate("Person", doc! { "name" => "Alice", "age" => "42" })
                .unwrap()
        })
    });

    for count in [10, 100, 1000] {
        let mut session = open_session();
        let alice = session.instantiate("Person", doc! { "name" => "Alice" }).unwrap();
        let preferences: Vec<_> = (0..count)
            .map(|i| {
                session
                    .instantiate("Preference", doc! { "name" => format!("preference {i}") })
                    .unwrap()
            })
            .collect();
        c.bench_function(&format!("bind {count}"), |b| {
            b.iter(|| {
                let mut proxy = session.many(alice, "preferences").unwrap();
                proxy.substitute(Some(preferences.clone())).unwrap();
                proxy.nullify().unwrap();
            })
        });
    }

    let mut session = open_session();
    let alice = session.instantiate("Person", doc! { "name" => "Alice" }).unwrap();
    for i in 0..1000 {
        session
            .many(alice, "preferences")
            .unwrap()
            .create(doc! { "name" => format!("preference {i}") })
            .unwrap();
    }
    session.save(alice).unwrap();
    c.bench_function("reload 1k kept", |b| {
        b.iter(|| {
            session
                .many(alice, "preferences")
                .unwrap()
                .reload()
                .unwrap()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
