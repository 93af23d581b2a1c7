//! OVSDB client over one JSON-RPC connection
//!
//! Unlike a connect-per-call client, one `OvsdbClient` keeps its connection
//! open: calls are multiplexed and monitors stay live until cancelled or the
//! connection drops. A dropped connection is final; build a new client.

use std::sync::Arc;

use ovsdb_jsonrpc::{ConnectionState, JsonRpcClient, NotificationHandler};
use serde_json::{json, Value as Json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::OvsdbClientConfig;
use crate::error::{OvsdbError, Result};
use crate::monitor::{MonitorCallback, MonitorDispatcher, MonitorId, MonitorRequests, TableUpdates};
use crate::operation::{transact_params, Operation};
use crate::result::{decode_transact_result, OperationResult};
use crate::schema::{DatabaseSchema, SchemaCatalog};

/// OVSDB client
pub struct OvsdbClient {
    rpc: JsonRpcClient,
    dispatcher: Arc<MonitorDispatcher>,
    schemas: RwLock<SchemaCatalog>,
    config: OvsdbClientConfig,
}

impl OvsdbClient {
    /// Connect to the unix socket named in `config`
    pub async fn connect_unix(config: OvsdbClientConfig) -> Result<Self> {
        if !config.socket_path.exists() {
            return Err(OvsdbError::SocketNotFound(
                config.socket_path.display().to_string(),
            ));
        }

        debug!("Connecting to OVSDB socket: {}", config.socket_path.display());
        let stream = UnixStream::connect(&config.socket_path).await?;
        info!("Connected to OVSDB at {}", config.socket_path.display());

        let (reader, writer) = stream.into_split();
        Ok(Self::from_stream(reader, writer, config))
    }

    /// Run the protocol over an already established byte stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<R, W>(reader: R, writer: W, config: OvsdbClientConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let dispatcher = Arc::new(MonitorDispatcher::new());
        let handler: Arc<dyn NotificationHandler> = dispatcher.clone();
        let rpc = JsonRpcClient::start(reader, writer, config.transport.clone(), handler);

        Self {
            rpc,
            dispatcher,
            schemas: RwLock::new(SchemaCatalog::new()),
            config,
        }
    }

    /// List all databases
    pub async fn list_dbs(&self) -> Result<Vec<String>> {
        let result = self.rpc.request("list_dbs", json!([])).await?;
        serde_json::from_value(result)
            .map_err(|e| OvsdbError::unexpected(format!("list_dbs result: {}", e)))
    }

    /// Fetch, parse and cache the schema of `database`
    pub async fn get_schema(&self, database: &str) -> Result<DatabaseSchema> {
        let result = self.rpc.request("get_schema", json!([database])).await?;
        let schema = DatabaseSchema::from_json(&result, &self.config.parse_options)?;
        debug!(
            "Schema for {} version {} with {} table(s)",
            schema.name,
            schema.version,
            schema.tables.len()
        );

        self.schemas.write().await.insert(schema.clone());
        Ok(schema)
    }

    /// Schema from an earlier `get_schema`, if any
    pub async fn cached_schema(&self, database: &str) -> Option<DatabaseSchema> {
        self.schemas.read().await.get(database).cloned()
    }

    /// Run `operations` as one transaction.
    ///
    /// Operations are checked against the cached schema of `database` when
    /// there is one. The result holds one entry per operation, plus a final
    /// `Error` entry if the server failed the commit itself.
    pub async fn transact(
        &self,
        database: &str,
        operations: &[Operation],
    ) -> Result<Vec<OperationResult>> {
        let params = {
            let schemas = self.schemas.read().await;
            transact_params(database, operations, schemas.get(database))?
        };

        let result = self.rpc.request("transact", params).await?;
        decode_transact_result(&result, operations.len())
    }

    /// Start a monitor; returns the initial contents
    pub async fn monitor<C>(
        &self,
        database: &str,
        id: impl Into<MonitorId>,
        requests: &MonitorRequests,
        callback: C,
    ) -> Result<TableUpdates>
    where
        C: MonitorCallback,
    {
        self.dispatcher
            .subscribe(&self.rpc, database, id.into(), requests, Arc::new(callback))
            .await
    }

    /// Stop a monitor
    pub async fn cancel_monitor(&self, id: impl Into<MonitorId>) -> Result<()> {
        self.dispatcher.cancel(&self.rpc, &id.into()).await
    }

    /// Liveness check
    pub async fn echo(&self) -> Result<()> {
        let payload = json!(["ovsdb-client"]);
        let reply: Json = self.rpc.request("echo", payload.clone()).await?;
        if reply != payload {
            return Err(OvsdbError::unexpected(format!("echo returned {}", reply)));
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.rpc.state()
    }

    /// The underlying JSON-RPC connection
    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    pub fn config(&self) -> &OvsdbClientConfig {
        &self.config
    }

    /// Close the connection. Pending calls fail and monitors see `Closed`.
    pub fn close(&self) {
        self.rpc.close();
    }
}

impl Drop for OvsdbClient {
    fn drop(&mut self) {
        self.rpc.close();
    }
}
