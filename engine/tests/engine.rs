//! End-to-end tests for the table engine over an in-memory SQLite store.
//!
//! Every test gets its own fresh store, migrated on connect.
//!
//! Run with: `cargo test -p table-engine --test engine`

use sea_orm::ConnectionTrait;
use serde_json::{Value as JsonValue, json};
use table_engine::catalog;
use table_engine::isolation::physical_table_name;
use table_engine::model::{
    Alterations, ApiCascade, ColumnAlteration, ColumnDefinition, DeleteMode, DeleteOptions,
    FilterOperator, OrderDirection, PaginationOptions, QueryFilter, ReadOptions, Record,
    TableDefinition,
};
use table_engine::{EngineConfig, ProjectId, QueryResult, TableEngine};

async fn engine() -> TableEngine {
    let config = EngineConfig {
        database_url: "sqlite::memory:".to_string(),
        ..EngineConfig::default()
    };
    TableEngine::connect(config)
        .await
        .expect("in-memory store should connect")
}

fn p(id: i64) -> ProjectId {
    ProjectId::new(id).unwrap()
}

fn record(value: JsonValue) -> Record {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn products() -> TableDefinition {
    TableDefinition::new(
        "products",
        vec![
            ColumnDefinition::new("id", "integer").primary(),
            ColumnDefinition::new("name", "string").not_null(),
            ColumnDefinition::new("price", "number"),
            ColumnDefinition::new("category", "string"),
        ],
    )
}

fn assert_code<T: std::fmt::Debug>(result: &QueryResult<T>, code: &str) {
    assert_eq!(result.error_code(), Some(code), "unexpected result: {result:?}");
}

async fn seed_products(engine: &TableEngine, project: ProjectId, rows: &[(&str, f64, Option<&str>)]) {
    for (name, price, category) in rows {
        let inserted = engine
            .insert_record(
                project,
                "products",
                &record(json!({"name": name, "price": price, "category": category})),
                None,
            )
            .await;
        assert!(inserted.is_success(), "insert failed: {inserted:?}");
    }
}

// ---------- isolation ----------

#[tokio::test]
async fn test_same_name_in_two_projects_is_isolated() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    assert!(engine.create_table(p(2), &products()).await.is_success());

    seed_products(&engine, p(1), &[("Pen", 2.5, None), ("Book", 12.0, None)]).await;

    let own = engine
        .query_records(p(1), "products", &[], &PaginationOptions::default(), ReadOptions::default())
        .await;
    let other = engine
        .query_records(p(2), "products", &[], &PaginationOptions::default(), ReadOptions::default())
        .await;
    assert_eq!(own.data().map(Vec::len), Some(2));
    assert_eq!(other.data().map(Vec::len), Some(0));

    let missing = engine
        .get_record_by_id(p(2), "products", &json!(1), ReadOptions::default())
        .await;
    assert_code(&missing, "NOT_FOUND");

    assert_eq!(engine.list_tables(p(1)).await.data().map(Vec::len), Some(1));
    assert_eq!(engine.list_tables(p(3)).await.data().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_physical_name_of_another_project_is_forbidden() {
    let engine = engine().await;
    assert!(engine.create_table(p(2), &products()).await.is_success());

    let result = engine
        .query_records(p(1), "p2_products", &[], &PaginationOptions::default(), ReadOptions::default())
        .await;
    assert_code(&result, "FORBIDDEN");

    let result = engine
        .insert_record(p(1), "p2_products", &record(json!({"name": "x"})), None)
        .await;
    assert_code(&result, "FORBIDDEN");

    // an unregistered name of the caller's own shape is simply unknown
    let result = engine.describe_table(p(1), "p1_products").await;
    assert_code(&result, "NOT_FOUND");
}

#[tokio::test]
async fn test_errors_never_expose_physical_names() {
    let engine = engine().await;
    assert!(engine.create_table(p(7), &products()).await.is_success());

    let dup = engine.create_table(p(7), &products()).await;
    assert_code(&dup, "CONFLICT");
    let body = serde_json::to_string(&dup).unwrap();
    assert!(!body.contains("p7_"), "physical name leaked: {body}");

    let bad = engine
        .insert_record(p(7), "products", &record(json!({"name": "a", "nope": 1})), None)
        .await;
    let body = serde_json::to_string(&bad).unwrap();
    assert!(!body.contains("p7_"), "physical name leaked: {body}");
}

// ---------- registry consistency ----------

#[tokio::test]
async fn test_registry_follows_physical_table_lifecycle() {
    let engine = engine().await;
    let project = p(1);
    let physical = physical_table_name(project, "products").unwrap();

    let created = engine.create_table(project, &products()).await;
    let info = created.data().expect("table should be created");
    assert_eq!(info.table_name, "products");
    assert_eq!(info.display_name, "products");
    assert_eq!(info.structure.columns.len(), 4);
    assert!(catalog::table_exists(engine.connection(), &physical).await.unwrap());

    let dropped = engine.drop_table(project, "products", ApiCascade::Deactivate).await;
    assert!(dropped.is_success(), "{dropped:?}");
    assert!(!catalog::table_exists(engine.connection(), &physical).await.unwrap());
    assert_code(&engine.describe_table(project, "products").await, "NOT_FOUND");

    // the name can be reused once dropped
    assert!(engine.create_table(project, &products()).await.is_success());
}

#[tokio::test]
async fn test_invalid_definition_reports_every_issue_and_creates_nothing() {
    let engine = engine().await;
    let def = TableDefinition::new(
        "9bad",
        vec![
            ColumnDefinition::new("id", "uuid"),
            ColumnDefinition::new("Name", "string"),
            ColumnDefinition::new("name", "string"),
        ],
    );

    let result = engine.create_table(p(1), &def).await;
    assert_code(&result, "VALIDATION_ERROR");
    let details = result.error().and_then(|e| e.details.clone()).unwrap();
    let fields: Vec<&str> = details.iter().map(|i| i.field.as_str()).collect();
    assert!(fields.contains(&"name"), "{fields:?}");
    assert!(fields.contains(&"columns[0].type"), "{fields:?}");
    assert!(fields.contains(&"columns[2].name"), "{fields:?}");
    assert!(fields.contains(&"columns"), "{fields:?}");

    assert_eq!(engine.list_tables(p(1)).await.data().map(Vec::len), Some(0));
}

// ---------- name collisions ----------

#[tokio::test]
async fn test_names_that_sanitize_alike_collide() {
    let engine = engine().await;
    let mut first = products();
    first.name = "Products".to_string();
    assert!(engine.create_table(p(1), &first).await.is_success());

    let second = engine.create_table(p(1), &products()).await;
    assert_code(&second, "CONFLICT");
    assert_eq!(engine.list_tables(p(1)).await.data().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_concurrent_creates_yield_one_table() {
    let engine = engine().await;
    let def = products();

    let (a, b) = tokio::join!(
        engine.create_table(p(1), &def),
        engine.create_table(p(1), &def)
    );
    let successes = [a.is_success(), b.is_success()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "a={a:?} b={b:?}");
    let failure = if a.is_success() { &b } else { &a };
    assert_code(failure, "CONFLICT");
    assert_eq!(engine.list_tables(p(1)).await.data().map(Vec::len), Some(1));
}

// ---------- records ----------

#[tokio::test]
async fn test_every_logical_type_round_trips() {
    let engine = engine().await;
    let def = TableDefinition::new(
        "everything",
        vec![
            ColumnDefinition::new("id", "integer").primary(),
            ColumnDefinition::new("s", "string"),
            ColumnDefinition::new("t", "text"),
            ColumnDefinition::new("i", "integer"),
            ColumnDefinition::new("n", "decimal"),
            ColumnDefinition::new("b", "boolean"),
            ColumnDefinition::new("d", "date"),
            ColumnDefinition::new("dt", "datetime"),
            ColumnDefinition::new("j", "json"),
        ],
    );
    assert!(engine.create_table(p(1), &def).await.is_success());

    let data = json!({
        "s": "short",
        "t": "a longer body of text",
        "i": 42,
        "n": 19.5,
        "b": true,
        "d": "2024-02-29",
        "dt": "2024-03-01T10:20:30Z",
        "j": {"tags": ["a", "b"], "count": 2}
    });
    let inserted = engine
        .insert_record(p(1), "everything", &record(data.clone()), None)
        .await
        .into_data()
        .expect("insert should succeed");
    let id = inserted["id"].clone();
    assert!(id.is_i64(), "generated key: {id}");

    let fetched = engine
        .get_record_by_id(p(1), "everything", &id, ReadOptions::default())
        .await
        .into_data()
        .expect("row should be readable");
    for (key, expected) in data.as_object().unwrap() {
        assert_eq!(&fetched[key], expected, "column {key}");
    }

    let nulls = engine
        .insert_record(p(1), "everything", &record(json!({"s": null, "j": null})), None)
        .await
        .into_data()
        .unwrap();
    assert_eq!(nulls["s"], JsonValue::Null);
    assert_eq!(nulls["dt"], JsonValue::Null);
}

#[tokio::test]
async fn test_insert_rejects_unknown_and_mistyped_values() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());

    let result = engine
        .insert_record(
            p(1),
            "products",
            &record(json!({"name": 5, "price": "cheap", "color": "red"})),
            None,
        )
        .await;
    assert_code(&result, "VALIDATION_ERROR");
    let fields: Vec<String> = result
        .error()
        .and_then(|e| e.details.clone())
        .unwrap()
        .into_iter()
        .map(|i| i.field)
        .collect();
    assert!(fields.contains(&"name".to_string()), "{fields:?}");
    assert!(fields.contains(&"price".to_string()), "{fields:?}");
    assert!(fields.contains(&"color".to_string()), "{fields:?}");
}

#[tokio::test]
async fn test_insert_with_schema_checks_required_columns() {
    let engine = engine().await;
    let created = engine.create_table(p(1), &products()).await.into_data().unwrap();

    let result = engine
        .insert_record(p(1), "products", &record(json!({"price": 1})), Some(&created.structure))
        .await;
    assert_code(&result, "VALIDATION_ERROR");
    let details = result.error().and_then(|e| e.details.clone()).unwrap();
    assert!(details.iter().any(|i| i.field == "name"), "{details:?}");
}

#[tokio::test]
async fn test_primary_key_is_immutable() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    seed_products(&engine, p(1), &[("Pen", 2.5, None)]).await;

    let result = engine
        .update_record(p(1), "products", &json!(1), &record(json!({"id": 99, "name": "Quill"})))
        .await;
    assert_code(&result, "VALIDATION_ERROR");

    let unchanged = engine
        .get_record_by_id(p(1), "products", &json!(1), ReadOptions::default())
        .await
        .into_data()
        .unwrap();
    assert_eq!(unchanged["name"], json!("Pen"));

    let updated = engine
        .update_record(p(1), "products", &json!(1), &record(json!({"name": "Quill"})))
        .await
        .into_data()
        .unwrap();
    assert_eq!(updated["id"], json!(1));
    assert_eq!(updated["name"], json!("Quill"));

    let missing = engine
        .update_record(p(1), "products", &json!(404), &record(json!({"name": "x"})))
        .await;
    assert_code(&missing, "NOT_FOUND");
}

#[tokio::test]
async fn test_timestamps_are_engine_managed() {
    let engine = engine().await;
    let mut def = products();
    def.timestamps = true;
    let info = engine.create_table(p(1), &def).await.into_data().unwrap();
    assert!(info.structure.timestamps);
    assert!(info.structure.column("created_at").is_some());

    let row = engine
        .insert_record(p(1), "products", &record(json!({"name": "Pen"})), None)
        .await
        .into_data()
        .unwrap();
    assert!(row["created_at"].is_string(), "{row:?}");

    let result = engine
        .update_record(p(1), "products", &row["id"], &record(json!({"updated_at": "2020-01-01T00:00:00Z"})))
        .await;
    assert_code(&result, "VALIDATION_ERROR");
}

// ---------- soft delete ----------

#[tokio::test]
async fn test_soft_delete_hides_rows_until_restored() {
    let engine = engine().await;
    let mut def = products();
    def.soft_delete = true;
    assert!(engine.create_table(p(1), &def).await.is_success());
    seed_products(&engine, p(1), &[("Pen", 2.5, None), ("Book", 12.0, None)]).await;

    let deleted = engine
        .delete_record(p(1), "products", &json!(1), DeleteOptions::default())
        .await
        .into_data()
        .unwrap();
    assert_eq!(deleted.mode, DeleteMode::Soft);

    assert_code(
        &engine.get_record_by_id(p(1), "products", &json!(1), ReadOptions::default()).await,
        "NOT_FOUND",
    );
    let hidden = engine
        .get_record_by_id(p(1), "products", &json!(1), ReadOptions { include_deleted: true })
        .await
        .into_data()
        .unwrap();
    assert!(hidden["deleted_at"].is_string());

    let visible = engine
        .query_records(p(1), "products", &[], &PaginationOptions::default(), ReadOptions::default())
        .await;
    assert_eq!(visible.meta().and_then(|m| m.pagination).map(|pg| pg.total), Some(1));
    let all = engine
        .query_records(
            p(1),
            "products",
            &[],
            &PaginationOptions::default(),
            ReadOptions { include_deleted: true },
        )
        .await;
    assert_eq!(all.meta().and_then(|m| m.pagination).map(|pg| pg.total), Some(2));

    // deleting twice finds nothing visible
    assert_code(
        &engine.delete_record(p(1), "products", &json!(1), DeleteOptions::default()).await,
        "NOT_FOUND",
    );

    let restored = engine.restore_record(p(1), "products", &json!(1)).await.into_data().unwrap();
    assert_eq!(restored["deleted_at"], JsonValue::Null);
    assert!(
        engine
            .get_record_by_id(p(1), "products", &json!(1), ReadOptions::default())
            .await
            .is_success()
    );

    let hard = engine
        .delete_record(p(1), "products", &json!(2), DeleteOptions { mode: Some(DeleteMode::Hard) })
        .await
        .into_data()
        .unwrap();
    assert_eq!(hard.mode, DeleteMode::Hard);
    assert_code(
        &engine
            .get_record_by_id(p(1), "products", &json!(2), ReadOptions { include_deleted: true })
            .await,
        "NOT_FOUND",
    );
}

#[tokio::test]
async fn test_soft_delete_requires_a_soft_delete_table() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    seed_products(&engine, p(1), &[("Pen", 2.5, None)]).await;

    let result = engine
        .delete_record(p(1), "products", &json!(1), DeleteOptions { mode: Some(DeleteMode::Soft) })
        .await;
    assert_code(&result, "VALIDATION_ERROR");

    let deleted = engine
        .delete_record(p(1), "products", &json!(1), DeleteOptions::default())
        .await
        .into_data()
        .unwrap();
    assert_eq!(deleted.mode, DeleteMode::Hard);
}

// ---------- queries ----------

#[tokio::test]
async fn test_pages_are_disjoint_and_complete() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    let rows: Vec<(String, f64)> = (0..25).map(|i| (format!("item{}", i % 4), i as f64)).collect();
    let rows: Vec<(&str, f64, Option<&str>)> =
        rows.iter().map(|(n, price)| (n.as_str(), *price, None)).collect();
    seed_products(&engine, p(1), &rows).await;

    let mut seen = std::collections::HashSet::new();
    for page in 1..=3 {
        let pagination = PaginationOptions {
            page: Some(page),
            page_size: Some(10),
            order_by: Some("name".to_string()),
            order_direction: Some(OrderDirection::Desc),
        };
        let result = engine
            .query_records(p(1), "products", &[], &pagination, ReadOptions::default())
            .await;
        let meta = result.meta().and_then(|m| m.pagination).unwrap();
        assert_eq!((meta.page, meta.page_size, meta.total, meta.total_pages), (page, 10, 25, 3));
        let data = result.into_data().unwrap();
        assert_eq!(data.len(), if page < 3 { 10 } else { 5 });
        for row in data {
            assert!(seen.insert(row["id"].as_i64().unwrap()), "row {} on two pages", row["id"]);
        }
    }
    assert_eq!(seen.len(), 25);

    let beyond = engine
        .query_records(p(1), "products", &[], &PaginationOptions::page(9, 10), ReadOptions::default())
        .await;
    assert_eq!(beyond.data().map(Vec::len), Some(0));
    assert_eq!(beyond.meta().and_then(|m| m.pagination).map(|pg| pg.total), Some(25));
}

#[tokio::test]
async fn test_page_size_is_capped() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    let result = engine
        .query_records(p(1), "products", &[], &PaginationOptions::page(1, 10_000), ReadOptions::default())
        .await;
    let meta = result.meta().and_then(|m| m.pagination).unwrap();
    assert_eq!(meta.page_size, EngineConfig::default().max_page_size);
}

#[tokio::test]
async fn test_huge_page_number_returns_an_empty_page() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    seed_products(&engine, p(1), &[("Pen", 2.5, None)]).await;

    for page in [1u64 << 60, u64::MAX] {
        let result = engine
            .query_records(p(1), "products", &[], &PaginationOptions::page(page, 20), ReadOptions::default())
            .await;
        assert!(result.is_success(), "page {page}: {result:?}");
        let meta = result.meta().and_then(|m| m.pagination).unwrap();
        assert_eq!(meta.total, 1);
        assert_eq!(result.data().map(Vec::len), Some(0));
    }
}

#[tokio::test]
async fn test_filters_select_matching_rows() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    seed_products(
        &engine,
        p(1),
        &[
            ("Red Pen", 2.5, Some("office")),
            ("red mug", 8.0, Some("kitchen")),
            ("Notebook", 12.0, Some("office")),
            ("Lamp", 30.0, None),
        ],
    )
    .await;

    let names = |result: QueryResult<Vec<Record>>| -> Vec<String> {
        let mut names: Vec<String> = result
            .into_data()
            .expect("query should succeed")
            .into_iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        names
    };
    let run = |filters: Vec<QueryFilter>| {
        let engine = engine.clone();
        async move {
            engine
                .query_records(p(1), "products", &filters, &PaginationOptions::default(), ReadOptions::default())
                .await
        }
    };

    let r = run(vec![QueryFilter::new("price", FilterOperator::Gt, json!(8))]).await;
    assert_eq!(names(r), vec!["Lamp", "Notebook"]);

    let r = run(vec![QueryFilter::new("name", FilterOperator::Like, json!("Red%"))]).await;
    assert_eq!(names(r), vec!["Red Pen"]);

    let r = run(vec![QueryFilter::new("name", FilterOperator::Ilike, json!("red%"))]).await;
    assert_eq!(names(r), vec!["Red Pen", "red mug"]);

    let r = run(vec![QueryFilter::new("category", FilterOperator::In, json!(["kitchen", "garden"]))]).await;
    assert_eq!(names(r), vec!["red mug"]);

    let r = run(vec![QueryFilter::new("price", FilterOperator::Between, json!([2.5, 12]))]).await;
    assert_eq!(names(r), vec!["Notebook", "Red Pen", "red mug"]);

    let r = run(vec![QueryFilter::new("category", FilterOperator::Eq, JsonValue::Null)]).await;
    assert_eq!(names(r), vec!["Lamp"]);

    let r = run(vec![
        QueryFilter::new("category", FilterOperator::Eq, json!("office")),
        QueryFilter::new("price", FilterOperator::Lte, json!(2.5)),
    ])
    .await;
    assert_eq!(names(r), vec!["Red Pen"]);
}

/// n = 1..10. Odd rows are labelled "Row-n", even rows "row-n". `day` is
/// 2024-01-0n and `at` advances by half a second per row.
async fn seed_numbers(engine: &TableEngine, project: ProjectId) {
    let def = TableDefinition::new(
        "numbers",
        vec![
            ColumnDefinition::new("id", "integer").primary(),
            ColumnDefinition::new("n", "integer").not_null(),
            ColumnDefinition::new("label", "string"),
            ColumnDefinition::new("day", "date"),
            ColumnDefinition::new("at", "datetime"),
        ],
    );
    assert!(engine.create_table(project, &def).await.is_success());
    for n in 1..=10 {
        let label = if n % 2 == 1 { format!("Row-{n}") } else { format!("row-{n}") };
        let at = if n % 2 == 1 {
            format!("2024-01-01T00:00:{:02}.500Z", n / 2)
        } else {
            format!("2024-01-01T00:00:{:02}Z", n / 2)
        };
        let data = json!({"n": n, "label": label, "day": format!("2024-01-{n:02}"), "at": at});
        let inserted = engine.insert_record(project, "numbers", &record(data), None).await;
        assert!(inserted.is_success(), "insert failed: {inserted:?}");
    }
}

fn numbers_of(result: QueryResult<Vec<Record>>) -> Vec<i64> {
    let mut ns: Vec<i64> = result
        .into_data()
        .expect("query should succeed")
        .iter()
        .map(|r| r["n"].as_i64().unwrap())
        .collect();
    ns.sort_unstable();
    ns
}

#[tokio::test]
async fn test_every_filter_operator_on_a_numbered_table() {
    let engine = engine().await;
    seed_numbers(&engine, p(1)).await;

    let cases: Vec<(QueryFilter, Vec<i64>)> = vec![
        (QueryFilter::new("n", FilterOperator::Eq, json!(5)), vec![5]),
        (QueryFilter::new("n", FilterOperator::Neq, json!(5)), vec![1, 2, 3, 4, 6, 7, 8, 9, 10]),
        (QueryFilter::new("n", FilterOperator::Gt, json!(5)), vec![6, 7, 8, 9, 10]),
        (QueryFilter::new("n", FilterOperator::Gte, json!(5)), vec![5, 6, 7, 8, 9, 10]),
        (QueryFilter::new("n", FilterOperator::Lt, json!(5)), vec![1, 2, 3, 4]),
        (QueryFilter::new("n", FilterOperator::Lte, json!(5)), vec![1, 2, 3, 4, 5]),
        (QueryFilter::new("n", FilterOperator::In, json!([2, 4])), vec![2, 4]),
        (QueryFilter::new("n", FilterOperator::Between, json!([3, 5])), vec![3, 4, 5]),
        (QueryFilter::new("label", FilterOperator::Like, json!("row-1%")), vec![10]),
        (QueryFilter::new("label", FilterOperator::Ilike, json!("row-1%")), vec![1, 10]),
        // dates
        (QueryFilter::new("day", FilterOperator::Eq, json!("2024-01-07")), vec![7]),
        (QueryFilter::new("day", FilterOperator::Gte, json!("2024-01-08")), vec![8, 9, 10]),
        (
            QueryFilter::new("day", FilterOperator::Between, json!(["2024-01-02", "2024-01-03"])),
            vec![2, 3],
        ),
        // datetimes, including whole seconds next to fractional ones
        (QueryFilter::new("at", FilterOperator::Gt, json!("2024-01-01T00:00:02Z")), vec![5, 6, 7, 8, 9, 10]),
        (QueryFilter::new("at", FilterOperator::Lte, json!("2024-01-01T00:00:02.5Z")), vec![1, 2, 3, 4, 5]),
        (QueryFilter::new("at", FilterOperator::Eq, json!("2024-01-01T00:00:03Z")), vec![6]),
        (QueryFilter::new("at", FilterOperator::Eq, json!("2024-01-01T01:00:03+01:00")), vec![6]),
        (QueryFilter::new("at", FilterOperator::Neq, json!("2024-01-01 00:00:00.5")), vec![2, 3, 4, 5, 6, 7, 8, 9, 10]),
        (
            QueryFilter::new("at", FilterOperator::Between, json!(["2024-01-01T00:00:01Z", "2024-01-01T00:00:02.500Z"])),
            vec![2, 3, 4, 5],
        ),
    ];

    for (filter, expected) in cases {
        let label = format!("{} {:?} {}", filter.field, filter.operator, filter.value);
        let result = engine
            .query_records(p(1), "numbers", &[filter], &PaginationOptions::default(), ReadOptions::default())
            .await;
        assert_eq!(numbers_of(result), expected, "{label}");
    }
}

#[tokio::test]
async fn test_datetime_ordering_follows_time() {
    let engine = engine().await;
    seed_numbers(&engine, p(1)).await;

    let pagination = PaginationOptions {
        page: Some(1),
        page_size: Some(10),
        order_by: Some("at".to_string()),
        order_direction: Some(OrderDirection::Desc),
    };
    let rows = engine
        .query_records(p(1), "numbers", &[], &pagination, ReadOptions::default())
        .await
        .into_data()
        .unwrap();
    let order: Vec<i64> = rows.iter().map(|r| r["n"].as_i64().unwrap()).collect();
    assert_eq!(order, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
    assert_eq!(rows[0]["at"], json!("2024-01-01T00:00:05Z"));
    assert_eq!(rows[1]["at"], json!("2024-01-01T00:00:04.500Z"));
}

#[tokio::test]
async fn test_engine_timestamps_match_their_own_values() {
    let engine = engine().await;
    let mut def = products();
    def.timestamps = true;
    def.soft_delete = true;
    assert!(engine.create_table(p(1), &def).await.is_success());

    let row = engine
        .insert_record(p(1), "products", &record(json!({"name": "Pen"})), None)
        .await
        .into_data()
        .unwrap();
    let created = row["created_at"].clone();
    assert!(
        created.as_str().is_some_and(|s| s.contains('T') && s.ends_with('Z')),
        "created_at: {created}"
    );

    let filter = |op: FilterOperator, value: JsonValue| {
        let engine = engine.clone();
        async move {
            engine
                .query_records(
                    p(1),
                    "products",
                    &[QueryFilter::new("created_at", op, value)],
                    &PaginationOptions::default(),
                    ReadOptions { include_deleted: true },
                )
                .await
                .data()
                .map(Vec::len)
        }
    };
    assert_eq!(filter(FilterOperator::Eq, created.clone()).await, Some(1));
    assert_eq!(filter(FilterOperator::Gte, created.clone()).await, Some(1));
    assert_eq!(filter(FilterOperator::Lte, created.clone()).await, Some(1));
    assert_eq!(filter(FilterOperator::Lt, created.clone()).await, Some(0));
    assert_eq!(filter(FilterOperator::Gt, json!("2024-01-01T00:00:00Z")).await, Some(1));

    let updated = engine
        .update_record(p(1), "products", &row["id"], &record(json!({"price": 3})))
        .await
        .into_data()
        .unwrap();
    assert!(updated["updated_at"].is_string());
    let later = engine
        .query_records(
            p(1),
            "products",
            &[QueryFilter::new("updated_at", FilterOperator::Gte, created.clone())],
            &PaginationOptions::default(),
            ReadOptions::default(),
        )
        .await;
    assert_eq!(later.data().map(Vec::len), Some(1));

    assert!(
        engine
            .delete_record(p(1), "products", &row["id"], DeleteOptions { mode: Some(DeleteMode::Soft) })
            .await
            .is_success()
    );
    let deleted = engine
        .query_records(
            p(1),
            "products",
            &[QueryFilter::new("deleted_at", FilterOperator::Gte, created)],
            &PaginationOptions::default(),
            ReadOptions { include_deleted: true },
        )
        .await;
    assert_eq!(deleted.data().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_invalid_filters_are_rejected_before_querying() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());

    let filters = vec![
        QueryFilter::new("colour", FilterOperator::Eq, json!("red")),
        QueryFilter::new("price", FilterOperator::Between, json!([1])),
        QueryFilter::new("name; DROP TABLE x", FilterOperator::Eq, json!(1)),
    ];
    let result = engine
        .query_records(p(1), "products", &filters, &PaginationOptions::default(), ReadOptions::default())
        .await;
    assert_code(&result, "VALIDATION_ERROR");
    assert_eq!(result.error().and_then(|e| e.details.clone()).map(|d| d.len()), Some(3));

    let pagination = PaginationOptions {
        order_by: Some("nope".to_string()),
        ..Default::default()
    };
    let result = engine
        .query_records(p(1), "products", &[], &pagination, ReadOptions::default())
        .await;
    assert_code(&result, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_filter_values_are_bound_not_spliced() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    seed_products(&engine, p(1), &[("Pen", 1.0, None)]).await;

    let result = engine
        .query_records(
            p(1),
            "products",
            &[QueryFilter::new("name", FilterOperator::Eq, json!("x' OR '1'='1"))],
            &PaginationOptions::default(),
            ReadOptions::default(),
        )
        .await;
    assert_eq!(result.data().map(Vec::len), Some(0));
}

// ---------- alterations ----------

#[tokio::test]
async fn test_add_then_drop_column_restores_the_schema() {
    let engine = engine().await;
    let original = engine.create_table(p(1), &products()).await.into_data().unwrap().structure;

    let added = engine
        .alter_table(
            p(1),
            "products",
            &Alterations {
                add_columns: vec![ColumnDefinition::new("stock", "integer")],
                ..Default::default()
            },
        )
        .await
        .into_data()
        .unwrap();
    assert!(added.structure.column("stock").is_some());

    let row = engine
        .insert_record(p(1), "products", &record(json!({"name": "Pen", "stock": 3})), None)
        .await
        .into_data()
        .unwrap();
    assert_eq!(row["stock"], json!(3));

    let dropped = engine
        .alter_table(
            p(1),
            "products",
            &Alterations {
                drop_columns: vec!["stock".to_string()],
                ..Default::default()
            },
        )
        .await
        .into_data()
        .unwrap();
    assert_eq!(dropped.structure, original);
    assert_eq!(engine.get_table_schema(p(1), "products").await.into_data(), Some(original));
}

#[tokio::test]
async fn test_rename_column_keeps_data() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    seed_products(&engine, p(1), &[("Pen", 2.5, Some("office"))]).await;

    let renamed = engine
        .alter_table(
            p(1),
            "products",
            &Alterations {
                alter_columns: vec![ColumnAlteration {
                    name: "category".to_string(),
                    new_name: Some("section".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            },
        )
        .await
        .into_data()
        .unwrap();
    assert!(renamed.structure.column("category").is_none());

    let row = engine
        .get_record_by_id(p(1), "products", &json!(1), ReadOptions::default())
        .await
        .into_data()
        .unwrap();
    assert_eq!(row["section"], json!("office"));
}

#[tokio::test]
async fn test_rejected_alteration_changes_nothing() {
    let engine = engine().await;
    let original = engine.create_table(p(1), &products()).await.into_data().unwrap().structure;

    let result = engine
        .alter_table(
            p(1),
            "products",
            &Alterations {
                add_columns: vec![ColumnDefinition::new("stock", "integer")],
                drop_columns: vec!["id".to_string()],
                ..Default::default()
            },
        )
        .await;
    assert_code(&result, "VALIDATION_ERROR");
    assert_eq!(engine.check_drift(p(1), "products").await.into_data(), Some(original.clone()));
    assert_eq!(
        engine.describe_table(p(1), "products").await.into_data().map(|t| t.structure),
        Some(original)
    );
}

// ---------- drift ----------

#[tokio::test]
async fn test_drift_is_reported_then_reconciled() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    assert!(engine.check_drift(p(1), "products").await.is_success());

    let physical = physical_table_name(p(1), "products").unwrap();
    engine
        .connection()
        .execute_unprepared(&format!("ALTER TABLE \"{physical}\" ADD COLUMN \"note\" text"))
        .await
        .unwrap();

    let drift = engine.check_drift(p(1), "products").await;
    assert_code(&drift, "SCHEMA_DRIFT");
    assert!(drift.error().unwrap().message.contains("note"));

    let live = engine.get_table_schema(p(1), "products").await.into_data().unwrap();
    assert!(live.column("note").is_some());
    assert!(engine.check_drift(p(1), "products").await.is_success());
    assert_eq!(
        engine.describe_table(p(1), "products").await.into_data().map(|t| t.structure),
        Some(live)
    );
}

#[tokio::test]
async fn test_drop_tolerates_missing_backing_table() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    let physical = physical_table_name(p(1), "products").unwrap();
    engine
        .connection()
        .execute_unprepared(&format!("DROP TABLE \"{physical}\""))
        .await
        .unwrap();

    assert_code(&engine.get_table_schema(p(1), "products").await, "SCHEMA_DRIFT");
    assert!(engine.drop_table(p(1), "products", ApiCascade::Deactivate).await.is_success());
    assert_eq!(engine.list_tables(p(1)).await.data().map(Vec::len), Some(0));
}

// ---------- generated apis ----------

#[tokio::test]
async fn test_drop_deactivates_generated_apis_until_purged() {
    let engine = engine().await;
    let mut def = products();
    def.generate_api = true;
    let info = engine.create_table(p(1), &def).await.into_data().unwrap();
    assert!(info.api_enabled);

    let apis = engine.list_apis(p(1)).await.into_data().unwrap();
    assert_eq!(apis.len(), 5);
    assert!(apis.iter().all(|a| a.is_active && a.table_id == Some(info.id)));
    assert!(apis.iter().any(|a| a.method == "DELETE" && a.api_path == "/api/products/:id"));

    let summary = engine
        .drop_table(p(1), "products", ApiCascade::Deactivate)
        .await
        .into_data()
        .unwrap();
    assert_eq!((summary.apis_deactivated, summary.apis_deleted), (5, 0));

    let apis = engine.list_apis(p(1)).await.into_data().unwrap();
    assert_eq!(apis.len(), 5);
    assert!(apis.iter().all(|a| !a.is_active && a.table_id.is_none()));

    assert_eq!(engine.purge_inactive_apis(p(1)).await.into_data(), Some(5));
    assert_eq!(engine.list_apis(p(1)).await.data().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_drop_can_delete_generated_apis() {
    let engine = engine().await;
    let mut def = products();
    def.generate_api = true;
    assert!(engine.create_table(p(1), &def).await.is_success());
    assert!(engine.create_table(p(2), &def).await.is_success());

    let summary = engine
        .drop_table(p(1), "products", ApiCascade::Delete)
        .await
        .into_data()
        .unwrap();
    assert_eq!((summary.apis_deactivated, summary.apis_deleted), (0, 5));
    assert_eq!(engine.list_apis(p(1)).await.data().map(Vec::len), Some(0));
    assert_eq!(engine.list_apis(p(2)).await.data().map(Vec::len), Some(5));
}

// ---------- indexes ----------

#[tokio::test]
async fn test_index_lifecycle() {
    let engine = engine().await;
    assert!(engine.create_table(p(1), &products()).await.is_success());
    let columns = vec!["name".to_string()];

    let created = engine
        .add_index(p(1), "products", "by_name", &columns, true)
        .await
        .into_data()
        .unwrap();
    assert_eq!(created.name, "by_name");

    let indexes = engine.list_indexes(p(1), "products").await.into_data().unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "by_name");
    assert_eq!(indexes[0].columns, columns);
    assert!(indexes[0].unique);

    assert_code(
        &engine.add_index(p(1), "products", "by_name", &columns, false).await,
        "CONFLICT",
    );
    assert_code(
        &engine
            .add_index(p(1), "products", "by_colour", &["colour".to_string()], false)
            .await,
        "VALIDATION_ERROR",
    );

    seed_products(&engine, p(1), &[("Pen", 1.0, None)]).await;
    let dup = engine
        .insert_record(p(1), "products", &record(json!({"name": "Pen"})), None)
        .await;
    assert_code(&dup, "CONFLICT");

    assert!(engine.drop_index(p(1), "products", "by_name").await.is_success());
    assert_code(&engine.drop_index(p(1), "products", "by_name").await, "NOT_FOUND");
    assert_eq!(engine.list_indexes(p(1), "products").await.data().map(Vec::len), Some(0));
}
