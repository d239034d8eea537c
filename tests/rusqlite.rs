#![cfg(feature = "rusqlite")]

use common::{object, schema, seeded_db, settings, setup_db};
use mongoql::prelude::*;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

mod common;

fn fetch(model: &str, qo: JsonValue) -> QueryResult {
    fetch_with(settings(), model, qo)
}

fn fetch_with(settings: Arc<QuerySettings>, model: &str, qo: JsonValue) -> QueryResult {
    let mut conn = setup_db();
    compile(&schema(Dialect::SQLite), model, &settings, &qo, None)
        .unwrap()
        .fetch(&mut conn)
        .unwrap()
}

fn plucked(model: &str, qo: JsonValue) -> Vec<JsonValue> {
    let mut conn = setup_db();
    let compiled = compile(&schema(Dialect::SQLite), model, &settings(), &qo, None).unwrap();
    let entities = compiled.fetch(&mut conn).unwrap().into_entities().unwrap();
    entities
        .iter()
        .map(|e| JsonValue::Object(compiled.pluck(e)))
        .collect()
}

#[test]
fn test_join_keeps_parents_without_related_rows() {
    let users = plucked(
        "User",
        json!({
            "project": ["name"],
            "sort": ["id"],
            "join": {"articles": {"project": ["title"], "sort": ["id-"]}},
        }),
    );
    assert_eq!(
        users,
        vec![
            json!({"name": "ann", "articles": [{"title": "SQL"}, {"title": "Rust"}]}),
            json!({"name": "bob", "articles": []}),
            json!({"name": "cid", "articles": [{"title": "Go"}]}),
        ]
    );
}

#[test]
fn test_joinf_drops_parents_without_matches() {
    let users = plucked(
        "User",
        json!({
            "project": ["name"],
            "sort": ["id"],
            "joinf": {"articles": {"project": ["title"], "filter": {"rating": {"$gte": 4}}}},
        }),
    );
    assert_eq!(
        users,
        vec![
            json!({"name": "ann", "articles": [{"title": "Rust"}]}),
            json!({"name": "cid", "articles": [{"title": "Go"}]}),
        ]
    );
}

#[test]
fn test_nested_limit_applies_per_parent() {
    let users = plucked(
        "User",
        json!({
            "project": ["name"],
            "filter": {"id": {"$in": [1, 3]}},
            "sort": ["id"],
            "join": {"articles": {"project": ["title"], "sort": ["id"], "limit": 1}},
        }),
    );
    assert_eq!(
        users,
        vec![
            json!({"name": "ann", "articles": [{"title": "Rust"}]}),
            json!({"name": "cid", "articles": [{"title": "Go"}]}),
        ]
    );
}

#[test]
fn test_one_relations() {
    let comments = plucked(
        "Comment",
        json!({
            "project": ["text"],
            "sort": ["id"],
            "join": {"user": {"project": ["name"]}, "article": {"project": ["title"]}},
        }),
    );
    assert_eq!(
        comments[0],
        json!({"text": "nice", "user": {"name": "bob"}, "article": {"title": "Rust"}})
    );
    assert_eq!(comments.len(), 3);
}

#[test]
fn test_column_types_are_decoded() {
    let users = fetch("User", json!({"sort": ["id"], "limit": 2}))
        .into_entities()
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].get("tags"), Some(&json!(["a", "b"])));
    assert_eq!(users[0].get("data"), Some(&json!({"x": 1})));
    assert_eq!(users[0].get("active"), Some(&json!(true)));
    assert_eq!(users[1].get("active"), Some(&json!(false)));
    assert_eq!(users[1].get("data"), Some(&JsonValue::Null));
}

#[test]
fn test_nested_column_types_are_decoded() {
    let articles = plucked(
        "Article",
        json!({
            "project": ["title"],
            "filter": {"id": 10},
            "join": {"author": {"project": ["tags", "active"]}},
        }),
    );
    assert_eq!(
        articles,
        vec![json!({"title": "Rust", "author": {"tags": ["a", "b"], "active": true}})]
    );
}

#[test]
fn test_array_operators() {
    let names = |filter: JsonValue| -> Vec<JsonValue> {
        plucked("User", json!({"project": ["name"], "sort": ["id"], "filter": filter}))
            .into_iter()
            .map(|u| u["name"].clone())
            .collect()
    };
    assert_eq!(names(json!({"tags": "b"})), vec![json!("ann"), json!("cid")]);
    assert_eq!(names(json!({"tags": {"$all": ["a", "b"]}})), vec![json!("ann")]);
    assert_eq!(names(json!({"tags": {"$in": ["a", "z"]}})), vec![json!("ann")]);
    assert_eq!(names(json!({"tags": {"$size": 0}})), vec![json!("bob")]);
    assert_eq!(names(json!({"tags": ["b"]})), vec![json!("cid")]);
}

#[test]
fn test_filter_operators() {
    let names = |filter: JsonValue| -> Vec<JsonValue> {
        plucked("User", json!({"project": ["name"], "sort": ["id"], "filter": filter}))
            .into_iter()
            .map(|u| u["name"].clone())
            .collect()
    };
    assert_eq!(
        names(json!({"$or": [{"age": {"$lt": 18}}, {"name": {"$prefix": "c"}}]})),
        vec![json!("bob"), json!("cid")]
    );
    assert_eq!(names(json!({"active": false})), vec![json!("bob")]);
    assert_eq!(names(json!({"data": {"$exists": true}})), vec![json!("ann"), json!("cid")]);
    assert_eq!(names(json!({"data.x": {"$gt": 1}})), vec![json!("cid")]);
    assert_eq!(names(json!({"articles.title": "Go"})), vec![json!("cid")]);
    assert_eq!(
        names(json!({"$not": {"age": {"$gte": 30}}})),
        vec![json!("bob")]
    );
}

#[test]
fn test_count() {
    let count = fetch("User", json!({"filter": {"active": true}, "count": 1}));
    assert_eq!(count.as_scalar(), Some(2));

    let groups = fetch("Article", json!({"group": ["uid"], "count": 1}));
    assert_eq!(groups.as_scalar(), Some(2));
}

#[test]
fn test_aggregate() {
    let mut policy = QuerySettings::default();
    policy.aggregate_columns = vec!["uid".into(), "rating".into()];
    let rows = fetch_with(
        Arc::new(policy),
        "Article",
        json!({
            "group": ["uid"],
            "sort": ["uid"],
            "aggregate": {"n": {"$sum": 1}, "best": {"$max": "rating"}, "good": {"$sum": {"rating": {"$gte": 4}}}},
        }),
    )
    .into_tuples()
    .unwrap();
    assert_eq!(
        rows,
        vec![
            object(json!({"uid": 1, "n": 2, "best": 5, "good": 1})),
            object(json!({"uid": 3, "n": 1, "best": 4, "good": 1})),
        ]
    );
}

#[test]
fn test_computed_property_and_ensure_loaded() {
    let mut conn = setup_db();
    let compiled = MongoQuery::new(schema(Dialect::SQLite), "User", settings())
        .unwrap()
        .query(&json!({"project": ["greeting"], "filter": {"id": 1}}))
        .unwrap()
        .ensure_loaded(["age", "articles.rating"])
        .unwrap()
        .end()
        .unwrap();
    let users = compiled.fetch(&mut conn).unwrap().into_entities().unwrap();

    assert_eq!(users[0].get("age"), Some(&json!(30)));
    assert!(users[0].get("articles").is_some());
    assert_eq!(
        JsonValue::Object(compiled.pluck(&users[0])),
        json!({"greeting": "Hello, ann"})
    );
}

#[test]
fn test_raiseload() {
    let mut policy = QuerySettings::default();
    policy.raiseload_col = true;
    policy.raiseload_rel = true;
    let users = fetch_with(Arc::new(policy), "User", json!({"project": ["name"], "sort": ["id"], "limit": 1}))
        .into_entities()
        .unwrap();
    assert!(matches!(users[0].try_get("age"), Err(MongoqlError::NotLoaded { .. })));
    assert!(matches!(users[0].try_get("articles"), Err(MongoqlError::NotLoaded { .. })));
    assert_eq!(users[0].try_get("name").unwrap(), Some(&json!("ann")));
}

#[test]
fn test_max_items_against_seeded_rows() {
    let mut conn = seeded_db(50, 7);
    let mut policy = QuerySettings::default();
    policy.max_items = Some(10);
    let policy = Arc::new(policy);
    let schema = schema(Dialect::SQLite);

    let users = compile(&schema, "User", &policy, &json!({"limit": 100}), None)
        .unwrap()
        .fetch(&mut conn)
        .unwrap()
        .into_entities()
        .unwrap();
    assert_eq!(users.len(), 10);

    let total = compile(&schema, "User", &policy, &json!({"count": 1}), None)
        .unwrap()
        .fetch(&mut conn)
        .unwrap();
    assert_eq!(total.as_scalar(), Some(50));

    let expected: i64 = conn
        .query_row(
            "SELECT count(*) FROM users WHERE age >= 40 AND EXISTS (SELECT 1 FROM articles WHERE articles.uid = users.id)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    let counted = compile(
        &schema,
        "User",
        &policy,
        &json!({"filter": {"age": {"$gte": 40}}, "joinf": ["articles"], "count": 1}),
        None,
    )
    .unwrap()
    .fetch(&mut conn)
    .unwrap();
    assert_eq!(counted.as_scalar(), Some(expected));
}

#[test]
fn test_crud_query_model() {
    let mut conn = setup_db();
    let crud = CrudHelper::new(schema(Dialect::SQLite), "User", settings()).unwrap();
    let strict = StrictCrudHelper::new(
        crud,
        StrictSettings::from_json(&json!({
            "ro_fields": ["id"],
            "query_defaults": {"project": ["name"], "sort": ["id-"]},
        }))
        .unwrap(),
    )
    .unwrap();

    let compiled = strict.query_model(&json!({"limit": 1})).unwrap().end().unwrap();
    let users = compiled.fetch(&mut conn).unwrap().into_entities().unwrap();
    assert_eq!(JsonValue::Object(compiled.pluck(&users[0])), json!({"name": "cid"}));

    let updated = strict
        .update_model(&object(json!({"id": 9, "data": {"y": 2}})), users[0].clone())
        .unwrap();
    assert_eq!(updated.get("id"), Some(&json!(3)));
    assert_eq!(updated.get("data"), Some(&json!({"y": 2})));
}
