#![cfg(all(feature = "test-utils", feature = "postgres-tests"))]

use etl::destination::memory::MemoryWarehouse;
use etl::pipeline::{Pipeline, PipelineConfig, RunStatus};
use etl::source::Source;
use etl::test_utils::database::{TestDatabase, test_table_name};
use etl::types::{GeoPoint, Value};
use etl_config::shared::SelectionConfig;
use etl_telemetry::tracing::init_test_tracing;
use futures::StreamExt;
use serde_json::json;

fn selection(table: &str) -> SelectionConfig {
    SelectionConfig {
        schema: "test".to_string(),
        table: table.to_string(),
        uid_column: "uid".to_string(),
        status_column: "status".to_string(),
        statuses: vec!["delivered".to_string(), "cancelled".to_string()],
        age_column: "updated_at".to_string(),
        min_age_hours: 24,
        batch_size: 100,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn selection_filters_on_status_and_age() {
    init_test_tracing();

    let database = TestDatabase::new().await;
    let table = test_table_name("shipments");
    database.create_shipments_table(&table).await;

    database
        .insert_shipment(&table, "old_delivered", "delivered", json!({}), 48)
        .await;
    database
        .insert_shipment(&table, "old_cancelled", "cancelled", json!({}), 72)
        .await;
    database
        .insert_shipment(&table, "recent_delivered", "delivered", json!({}), 1)
        .await;
    database
        .insert_shipment(&table, "old_in_transit", "in_transit", json!({}), 48)
        .await;

    let source = database.source(selection("shipments")).await;
    let records: Vec<_> = source
        .select_records()
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    // Oldest first.
    let selected: Vec<_> = records
        .iter()
        .map(|record| record.get("uid").and_then(Value::as_str).unwrap().to_string())
        .collect();
    assert_eq!(selected, vec!["old_cancelled", "old_delivered"]);

    let record = &records[0];
    assert_eq!(record.get("org_uid"), Some(&Value::from("org_1")));
    assert_eq!(record.get("properties"), Some(&Value::Json(json!({}))));
}

#[tokio::test(flavor = "multi_thread")]
async fn null_columns_decode_to_empty_strings() {
    init_test_tracing();

    let database = TestDatabase::new().await;
    let table = test_table_name("shipments");
    database.create_shipments_table(&table).await;
    database
        .client()
        .batch_execute(&format!(
            "insert into {} (uid, org_uid, status, properties, updated_at) \
             values ('shp_1', null, 'delivered', null, now() - interval '2 days')",
            table.as_quoted_identifier()
        ))
        .await
        .unwrap();

    let source = database.source(selection("shipments")).await;
    let mut stream = source.select_records().await.unwrap();
    let record = stream.next().await.unwrap().unwrap();

    assert_eq!(record.get("org_uid"), Some(&Value::from("")));
    assert_eq!(record.get("properties"), Some(&Value::from("")));
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_archives_and_deletes_from_postgres() {
    init_test_tracing();

    let database = TestDatabase::new().await;
    let table = test_table_name("shipments");
    database.create_shipments_table(&table).await;
    database
        .insert_shipment(
            &table,
            "shp_1",
            "delivered",
            json!({"latitude": 40.7, "longitude": -74.0}),
            48,
        )
        .await;
    database
        .insert_shipment(&table, "shp_2", "delivered", json!({}), 48)
        .await;
    database
        .insert_shipment(&table, "shp_3", "delivered", json!({}), 48)
        .await;
    database
        .insert_shipment(&table, "shp_4", "delivered", json!({}), 1)
        .await;

    let source = database.source(selection("shipments")).await;
    let warehouse = MemoryWarehouse::new();
    warehouse.fail_uid("shp_2").await;

    let report = Pipeline::new(PipelineConfig::default(), source, warehouse.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::CompleteWithFailures);
    assert_eq!(warehouse.uids().await, vec!["shp_1", "shp_3"]);
    assert_eq!(warehouse.rows().await[0].geo_point, GeoPoint::new(-74.0, 40.7));
    // The failed and the too recent shipments stay.
    assert_eq!(database.count_rows(&table).await, 2);
    assert!(report.maintenance.unwrap().is_success());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_delete_transaction_keeps_every_row() {
    init_test_tracing();

    let database = TestDatabase::new().await;
    let table = test_table_name("shipments");
    database.create_shipments_table(&table).await;
    database
        .insert_shipment(&table, "shp_1", "delivered", json!({}), 48)
        .await;
    database
        .insert_shipment(&table, "shp_2", "delivered", json!({}), 48)
        .await;

    // A trigger rejecting the second delete makes the transaction fail halfway.
    database
        .client()
        .batch_execute(&format!(
            "create function test.reject_delete() returns trigger language plpgsql as $$
             begin
                 if old.uid = 'shp_2' then
                     raise exception 'delete rejected';
                 end if;
                 return old;
             end;
             $$;
             create trigger reject_delete before delete on {} for each row
             execute function test.reject_delete();",
            table.as_quoted_identifier()
        ))
        .await
        .unwrap();

    let source = database.source(selection("shipments")).await;
    let deleted = source
        .delete_records(&["shp_1".to_string(), "shp_2".to_string()])
        .await;

    assert!(deleted.is_err());
    assert_eq!(database.count_rows(&table).await, 2);
}
