use etl_config::shared::{
    ETL_SHIPMENTS_OPTIONS, IntoConnectOptions, PgConnectionConfig, SelectionConfig,
};
use futures::StreamExt;
use pg_escape::quote_identifier;
use rustls::ClientConfig;
use std::io::BufReader;
use std::sync::Arc;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, Connection, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info, warn};

use crate::conversions::row::decode_rows;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::source::base::{RecordStream, Source};
use crate::types::TableName;

/// Spawns a background task driving a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        match connection.await {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => info!("postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    // The connection ends on its own once the `Client` is dropped.
    tokio::spawn(task);
}

/// Builds the TLS configuration trusting only the configured root certificates.
fn tls_client_config(trusted_root_certs: &str) -> EtlResult<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    let mut root_certs_reader = BufReader::new(trusted_root_certs.as_bytes());
    for cert in rustls_pemfile::certs(&mut root_certs_reader) {
        let cert = cert.map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Invalid trusted root certificate",
                err.to_string(),
                source: err
            )
        })?;
        root_store.add(cert)?;
    }

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(config)
}

/// Converts an identifier into the parameter type the server expects for the uid column.
fn uid_param(ty: &Type, uid: &str) -> EtlResult<Box<dyn ToSql + Sync + Send>> {
    let invalid = |err: String| {
        etl_error!(
            ErrorKind::InvalidData,
            "Identifier does not match the uid column type",
            format!("`{uid}` as `{ty}`: {err}")
        )
    };

    let param: Box<dyn ToSql + Sync + Send> = match *ty {
        Type::UUID => Box::new(uuid::Uuid::parse_str(uid).map_err(|e| invalid(e.to_string()))?),
        Type::INT8 => Box::new(uid.parse::<i64>().map_err(|e| invalid(e.to_string()))?),
        Type::INT4 => Box::new(uid.parse::<i32>().map_err(|e| invalid(e.to_string()))?),
        _ => Box::new(uid.to_string()),
    };

    Ok(param)
}

/// Postgres implementation of [`Source`].
pub struct PgSource {
    client: Client,
    table_name: TableName,
    selection: SelectionConfig,
}

impl PgSource {
    /// Connects to the source database, using TLS when enabled in `connection`.
    pub async fn connect(
        connection: &PgConnectionConfig,
        selection: SelectionConfig,
    ) -> EtlResult<Self> {
        let config: Config = connection.with_db(Some(&ETL_SHIPMENTS_OPTIONS));

        let client = if connection.tls.enabled {
            let tls_config = tls_client_config(&connection.tls.trusted_root_certs)?;
            let (client, conn) = config.connect(MakeRustlsConnect::new(tls_config)).await?;
            spawn_postgres_connection::<MakeRustlsConnect>(conn);
            info!("successfully connected to postgres with tls");
            client
        } else {
            let (client, conn) = config.connect(NoTls).await?;
            spawn_postgres_connection::<NoTls>(conn);
            info!("successfully connected to postgres without tls");
            client
        };

        Ok(Self::from_client(client, selection))
    }

    /// Wraps an already connected client.
    pub fn from_client(client: Client, selection: SelectionConfig) -> Self {
        let table_name = TableName::new(&selection.schema, &selection.table);

        Self {
            client,
            table_name,
            selection,
        }
    }

    /// Returns the selection query. Parameters are the statuses, the minimum age in hours and
    /// the batch size.
    fn selection_query(&self) -> String {
        let age_column = quote_identifier(&self.selection.age_column);
        format!(
            "select * from {} where {}::text = any($1::text[]) and {} < now() - make_interval(hours => $2::int) order by {} limit $3::bigint",
            self.table_name.as_quoted_identifier(),
            quote_identifier(&self.selection.status_column),
            age_column,
            age_column,
        )
    }

    fn delete_query(&self) -> String {
        format!(
            "delete from {} where {} = $1",
            self.table_name.as_quoted_identifier(),
            quote_identifier(&self.selection.uid_column)
        )
    }

    async fn delete_in_transaction(&self, uids: &[String]) -> EtlResult<Vec<String>> {
        let statement = self.client.prepare(&self.delete_query()).await?;
        let Some(uid_type) = statement.params().first().cloned() else {
            return Err(etl_error!(
                ErrorKind::InvalidState,
                "Delete statement has no identifier parameter"
            ));
        };

        let mut deleted = Vec::with_capacity(uids.len());
        for uid in uids {
            let param = uid_param(&uid_type, uid)?;
            let params: [&(dyn ToSql + Sync); 1] = [param.as_ref()];
            let affected = self.client.execute(&statement, &params).await?;

            if affected == 0 {
                debug!(%uid, "no source row matched the identifier");
            } else {
                deleted.push(uid.clone());
            }
        }

        Ok(deleted)
    }
}

impl Source for PgSource {
    fn table_name(&self) -> &TableName {
        &self.table_name
    }

    fn uid_column(&self) -> &str {
        &self.selection.uid_column
    }

    async fn select_records(&self) -> EtlResult<RecordStream<'_>> {
        let statuses = &self.selection.statuses;
        let min_age_hours = i32::try_from(self.selection.min_age_hours).unwrap_or(i32::MAX);
        let limit = i64::from(self.selection.batch_size);
        let params: [&(dyn ToSql + Sync); 3] = [statuses, &min_age_hours, &limit];

        info!(
            table = %self.table_name,
            ?statuses,
            min_age_hours,
            limit,
            "selecting shipments to archive"
        );

        let rows = self
            .client
            .query_raw(&self.selection_query(), params)
            .await?;

        Ok(decode_rows(rows).boxed())
    }

    async fn delete_records(&self, uids: &[String]) -> EtlResult<Vec<String>> {
        self.client.batch_execute("begin;").await?;

        match self.delete_in_transaction(uids).await {
            Ok(deleted) => {
                self.client.batch_execute("commit;").await?;
                Ok(deleted)
            }
            Err(err) => {
                if let Err(rollback_err) = self.client.batch_execute("rollback;").await {
                    warn!(error = %rollback_err, "failed to roll back delete transaction");
                }

                Err(err)
            }
        }
    }

    async fn execute_maintenance(&self, statement: &str) -> EtlResult<()> {
        self.client
            .batch_execute(statement)
            .await
            .map_err(EtlError::from)
    }
}
