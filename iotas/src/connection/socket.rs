//! Transport glue (§4.8): ties one [`DuplexConnection`] to an [`Engine`], drives the SETUP
//! handshake, and demuxes the connection's inbound frame stream into the engine's dispatch.
//!
//! This is the only place the crate spawns a task per connection rather than per stream — the
//! receive loop itself. Everything downstream of `dispatch` (per-stream handler invocation) is
//! spawned, if at all, by the [`Registry`]-bound handler the application supplied, not by this
//! module.
use crate::config::ConnectionConfig;
use crate::connection::DuplexConnection;
use crate::engine::Engine;
use crate::error::Result;
use crate::operations::{OperationType, Table};
use crate::payload::Payload;
use crate::reactive::{Flux, Mono};
use crate::registry::{
    FireAndForgetHandler, Registry, RequestChannelHandler, RequestResponseHandler,
    RequestStreamHandler,
};
use crate::runtime;

use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::warn;

/// Which side of a connection this peer plays. Stream IDs this peer allocates locally carry
/// this role's parity (§4.3): odd for [`Role::Client`], even for [`Role::Server`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    /// The side that dials out and allocates odd-parity stream IDs.
    Client,
    /// The side that accepts connections and allocates even-parity stream IDs.
    Server,
}

/// Accumulates the operations this side exports and intends to import, and the handlers bound
/// to its exports, before a [`DuplexConnection`] is available to open a [`Session`] on.
///
/// Export/import calls against the same `(type, namespace, name)` pair must agree across the
/// table and the registry — each `export_*` call both records the operation in the table (for
/// SETUP) and registers its handler (for dispatch) in the same call, so the two can never drift.
pub struct SessionBuilder {
    role: Role,
    table: Table,
    registry: Registry,
    config: ConnectionConfig,
}

impl SessionBuilder {
    /// Starts an empty builder for a connection playing `role`.
    pub fn new(role: Role) -> Self {
        SessionBuilder {
            role,
            table: Table::new(),
            registry: Registry::new(),
            config: ConnectionConfig::default(),
        }
    }

    /// Overrides the connection tunables (keepalive cadence, frame size ceiling, ...) this
    /// session starts from.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Exports a request/response operation, bound to `handler`.
    pub fn export_request_response<F>(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Payload) -> Mono<Result<Payload>> + Send + Sync + 'static,
    {
        let table_index = self.table.export(OperationType::RequestResponse, namespace, name);
        let registry_index: RequestResponseHandler = Arc::new(handler);
        let registry_index = self.registry.export_request_response(registry_index);
        debug_assert_eq!(table_index, registry_index, "table/registry index drift");
        self
    }

    /// Exports a fire-and-forget operation, bound to `handler`.
    pub fn export_fire_and_forget<F>(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let table_index = self.table.export(OperationType::FireAndForget, namespace, name);
        let registry_index: FireAndForgetHandler = Arc::new(handler);
        let registry_index = self.registry.export_fire_and_forget(registry_index);
        debug_assert_eq!(table_index, registry_index, "table/registry index drift");
        self
    }

    /// Exports a request/stream operation, bound to `handler`.
    pub fn export_request_stream<F>(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Payload) -> Flux<Result<Payload>> + Send + Sync + 'static,
    {
        let table_index = self.table.export(OperationType::RequestStream, namespace, name);
        let registry_index: RequestStreamHandler = Arc::new(handler);
        let registry_index = self.registry.export_request_stream(registry_index);
        debug_assert_eq!(table_index, registry_index, "table/registry index drift");
        self
    }

    /// Exports a request/channel operation, bound to `handler`. `handler` receives the
    /// channel's first payload plus a [`Flux`] of the remaining inbound items.
    pub fn export_request_channel<F>(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Payload, Flux<Result<Payload>>) -> Flux<Result<Payload>> + Send + Sync + 'static,
    {
        let table_index = self.table.export(OperationType::RequestChannel, namespace, name);
        let registry_index: RequestChannelHandler = Arc::new(handler);
        let registry_index = self.registry.export_request_channel(registry_index);
        debug_assert_eq!(table_index, registry_index, "table/registry index drift");
        self
    }

    /// Advertises, in this side's SETUP, that it intends to call `(namespace, name)` on its
    /// peer. Idempotent per the operation table's own contract (§4.2) — purely informational
    /// for introspection; [`Session::request_response`] and its siblings resolve directly
    /// against the peer's exports and do not require a matching `import_*` call to have been
    /// made first.
    pub fn import_request_response(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.table.import(OperationType::RequestResponse, namespace, name);
        self
    }

    /// See [`import_request_response`](Self::import_request_response).
    pub fn import_fire_and_forget(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.table.import(OperationType::FireAndForget, namespace, name);
        self
    }

    /// See [`import_request_response`](Self::import_request_response).
    pub fn import_request_stream(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.table.import(OperationType::RequestStream, namespace, name);
        self
    }

    /// See [`import_request_response`](Self::import_request_response).
    pub fn import_request_channel(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.table.import(OperationType::RequestChannel, namespace, name);
        self
    }

    /// Opens `connection`, performs the SETUP handshake, and starts the receive loop.
    ///
    /// Returns immediately; the handshake and all subsequent dispatch happen on spawned tasks
    /// driven by `connection`'s own stream.
    pub fn connect(self, connection: Box<dyn DuplexConnection>) -> Arc<Session> {
        Session::start(self.role, connection, self.table, self.registry, self.config)
    }
}

/// One live connection: an [`Engine`] wired to a [`DuplexConnection`], with the SETUP
/// handshake and receive loop already running.
///
/// Built via [`SessionBuilder`]. Application code holds onto a `Session` to invoke imported
/// operations; inbound requests for this side's exports are dispatched automatically as they
/// arrive, with no further action required here.
pub struct Session {
    engine: Arc<Engine>,
    connection: Arc<Box<dyn DuplexConnection>>,
}

impl Session {
    fn start(
        role: Role,
        connection: Box<dyn DuplexConnection>,
        table: Table,
        registry: Registry,
        config: ConnectionConfig,
    ) -> Arc<Session> {
        let connection = Arc::new(connection);
        let engine = Engine::new(
            role,
            connection.clone(),
            Arc::new(registry),
            table,
            config.max_frame_size(),
        );

        connection.connect();

        let mut incoming = connection.receive();
        let dispatch_engine = engine.clone();
        runtime::spawn(async move {
            while let Some(frame) = incoming.next().await {
                dispatch_engine.dispatch(frame);
            }
        });

        let keepalive_engine = engine.clone();
        let keepalive_interval = config.keepalive_interval();
        runtime::spawn(async move {
            loop {
                tokio::time::sleep(keepalive_interval).await;
                if !keepalive_engine.handshake_complete() {
                    continue;
                }
                keepalive_engine.send_keepalive();
            }
        });

        engine.send_setup(config.keepalive_interval(), config.keepalive_timeout());

        Arc::new(Session { engine, connection })
    }

    /// Calls a peer-exported request/response operation.
    pub fn request_response(
        &self,
        namespace: &str,
        name: &str,
        payload: Payload,
    ) -> Mono<Result<Payload>> {
        self.engine.call_request_response(namespace, name, payload)
    }

    /// Calls a peer-exported fire-and-forget operation.
    pub fn fire_and_forget(&self, namespace: &str, name: &str, payload: Payload) -> Result<()> {
        self.engine.call_fire_and_forget(namespace, name, payload)
    }

    /// Calls a peer-exported request/stream operation.
    pub fn request_stream(
        &self,
        namespace: &str,
        name: &str,
        payload: Payload,
    ) -> Flux<Result<Payload>> {
        self.engine.call_request_stream(namespace, name, payload)
    }

    /// Calls a peer-exported request/channel operation, with `payloads` as this side's
    /// outbound half.
    pub fn request_channel(
        &self,
        namespace: &str,
        name: &str,
        payloads: Flux<Result<Payload>>,
    ) -> Flux<Result<Payload>> {
        self.engine.call_request_channel(namespace, name, payloads)
    }

    /// Returns true once this side has both sent and received SETUP.
    pub fn handshake_complete(&self) -> bool {
        self.engine.handshake_complete()
    }

    /// Closes the underlying connection.
    pub fn close(&self) {
        self.connection.close();
        warn!("session closed");
    }
}
