use etl_config::shared::{
    IntoConnectOptions, PgConnectionConfig, SelectionConfig, TlsConfig,
};
use secrecy::SecretString;
use tokio_postgres::{Client, Config, NoTls};
use uuid::Uuid;

use crate::source::postgres::PgSource;
use crate::types::TableName;

/// Schema holding the test shipments table.
pub const TEST_DATABASE_SCHEMA: &str = "test";

pub fn test_table_name(name: &str) -> TableName {
    TableName::new(TEST_DATABASE_SCHEMA, name)
}

/// Reads the connection settings of the local test server and picks a unique database name.
///
/// Configuration is read from `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`,
/// `TESTS_DATABASE_USERNAME` and the optional `TESTS_DATABASE_PASSWORD`.
fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(SecretString::new),
        tls: TlsConfig::disabled(),
        keepalive: None,
    }
}

async fn connect(config: Config) -> Client {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .expect("Failed to connect to Postgres");
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("warning: test connection error: {err}");
        }
    });

    client
}

/// Throwaway database dropped together with this value.
///
/// Dropping requires a multi threaded runtime since cleanup blocks on the drop statement.
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    client: Option<Client>,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let config = local_pg_connection_config();

        let admin = connect(config.without_db(None)).await;
        admin
            .batch_execute(&format!(r#"create database "{}";"#, config.name))
            .await
            .expect("Failed to create database");

        let client = connect(config.with_db(None)).await;
        client
            .batch_execute(&format!("create schema {TEST_DATABASE_SCHEMA};"))
            .await
            .expect("Failed to create test schema");

        Self {
            config,
            client: Some(client),
        }
    }

    pub fn client(&self) -> &Client {
        self.client.as_ref().expect("Client is only taken on drop")
    }

    /// Creates a shipments table with a text identifier.
    pub async fn create_shipments_table(&self, table: &TableName) {
        self.client()
            .batch_execute(&format!(
                "create table {} (
                    uid text primary key,
                    org_uid text,
                    status text not null,
                    properties jsonb,
                    updated_at timestamptz not null
                );",
                table.as_quoted_identifier()
            ))
            .await
            .expect("Failed to create shipments table");
    }

    /// Inserts a shipment last updated `age_hours` ago.
    pub async fn insert_shipment(
        &self,
        table: &TableName,
        uid: &str,
        status: &str,
        properties: serde_json::Value,
        age_hours: i32,
    ) {
        self.client()
            .execute(
                &format!(
                    "insert into {} (uid, org_uid, status, properties, updated_at) \
                     values ($1, 'org_1', $2, $3, now() - make_interval(hours => $4))",
                    table.as_quoted_identifier()
                ),
                &[&uid, &status, &properties, &age_hours],
            )
            .await
            .expect("Failed to insert shipment");
    }

    pub async fn count_rows(&self, table: &TableName) -> i64 {
        self.client()
            .query_one(
                &format!("select count(*) from {}", table.as_quoted_identifier()),
                &[],
            )
            .await
            .expect("Failed to count rows")
            .get(0)
    }

    /// Connects a [`PgSource`] on its own connection.
    pub async fn source(&self, selection: SelectionConfig) -> PgSource {
        PgSource::connect(&self.config, selection)
            .await
            .expect("Failed to connect source")
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        // Our connection must be gone before the database can be dropped.
        drop(self.client.take());

        let config = self.config.clone();
        tokio::task::block_in_place(move || {
            tokio::runtime::Handle::current().block_on(async move {
                let admin = connect(config.without_db(None)).await;

                if let Err(err) = admin
                    .execute(
                        "select pg_terminate_backend(pid) from pg_stat_activity \
                         where datname = $1 and pid <> pg_backend_pid()",
                        &[&config.name],
                    )
                    .await
                {
                    eprintln!("warning: failed to terminate connections: {err}");
                }

                if let Err(err) = admin
                    .batch_execute(&format!(r#"drop database if exists "{}";"#, config.name))
                    .await
                {
                    eprintln!("warning: failed to drop database {}: {err}", config.name);
                }
            });
        });
    }
}
