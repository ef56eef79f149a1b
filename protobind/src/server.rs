//! # Server Bootstrap
//!
//! Builds a bound gRPC server out of a list of services, each described by its schema
//! file and a [`HandlerTable`].
//!
//! Bootstrapping is all-or-nothing: every service is resolved and bound in the order
//! given before the listener is bound, so a single invalid entry fails the whole call
//! and nothing is served.
//!
//! ```rust,no_run
//! use protobind::server::{HandlerTable, RpcError, ServerSetup, ServiceSetup, create_server};
//! use serde_json::{Value, json};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = HandlerTable::new().handler("GetOrder", |request: Value| async move {
//!     Ok::<_, RpcError>(json!({ "id": request["id"], "status": "SHIPPED" }))
//! });
//!
//! let setup = ServerSetup::new("protos")
//!     .service(ServiceSetup::new("orders.proto", "orders", "OrderService", handlers));
//!
//! let server = create_server(setup, "0.0.0.0:50051", None).await?;
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```
mod handler;
mod registry;

pub use handler::*;
pub use registry::ServiceRegistry;

use crate::{
    credentials::ServerCredentials,
    options::LoaderOptions,
    schema::{ProtoFileLoader, SchemaLoader, SchemaResolutionError},
};
use std::{net::SocketAddr, path::PathBuf};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{service::Routes, transport::Server};

/// Errors that can occur while bootstrapping a server.
#[derive(Debug, thiserror::Error)]
pub enum CreateServerError {
    #[error("Schema resolution failed: '{0}'")]
    Schema(#[from] SchemaResolutionError),
    #[error("Failed to build the reflection service: '{0}'")]
    Reflection(#[from] tonic_reflection::server::Error),
    #[error("Invalid TLS configuration: '{0}'")]
    Tls(#[source] tonic::transport::Error),
    #[error("Failed to bind '{0}': '{1}'")]
    Bind(String, #[source] std::io::Error),
}

/// One service to expose.
#[derive(Debug, Clone)]
pub struct ServiceSetup {
    /// Schema file, relative to [`ServerSetup::schema_root`].
    pub schema_file: PathBuf,
    pub package_name: String,
    pub service_name: String,
    pub handlers: HandlerTable,
}

impl ServiceSetup {
    pub fn new(
        schema_file: impl Into<PathBuf>,
        package_name: impl Into<String>,
        service_name: impl Into<String>,
        handlers: HandlerTable,
    ) -> Self {
        Self {
            schema_file: schema_file.into(),
            package_name: package_name.into(),
            service_name: service_name.into(),
            handlers,
        }
    }
}

/// Everything needed to bootstrap a server.
#[derive(Debug, Clone, Default)]
pub struct ServerSetup {
    pub services: Vec<ServiceSetup>,
    pub schema_root: PathBuf,
    pub options: LoaderOptions,
    /// Also serve `grpc.reflection.v1` for the loaded schemas.
    pub reflection: bool,
}

impl ServerSetup {
    pub fn new(schema_root: impl Into<PathBuf>) -> Self {
        Self {
            schema_root: schema_root.into(),
            ..Default::default()
        }
    }

    pub fn service(mut self, service: ServiceSetup) -> Self {
        self.services.push(service);
        self
    }

    pub fn options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn reflection(mut self, enabled: bool) -> Self {
        self.reflection = enabled;
        self
    }
}

/// Bootstraps a server compiling the schemas with [`ProtoFileLoader`].
///
/// `credentials` defaults to an insecure transport.
pub async fn create_server(
    setup: ServerSetup,
    domain: &str,
    credentials: Option<ServerCredentials>,
) -> Result<BoundServer, CreateServerError> {
    let mut loader = ProtoFileLoader::new();
    if !setup.schema_root.as_os_str().is_empty() {
        loader = loader.include_path(&setup.schema_root);
    }
    create_server_with_loader(setup, domain, credentials, &loader).await
}

/// Bootstraps a server loading the schemas with `loader`.
///
/// # Returns
///
/// * `Ok(BoundServer)` - Every service is registered and the listener is bound to `domain`.
/// * `Err(CreateServerError)` - Nothing was registered nor bound.
pub async fn create_server_with_loader(
    setup: ServerSetup,
    domain: &str,
    credentials: Option<ServerCredentials>,
    loader: &impl SchemaLoader,
) -> Result<BoundServer, CreateServerError> {
    let ServerSetup {
        services,
        schema_root,
        options,
        reflection,
    } = setup;

    let registry = ServiceRegistry::build(services, &schema_root, options, loader)?;
    let service_names = registry.service_names();
    let routes = registry.into_routes(reflection)?;

    let mut server = Server::builder();
    if let ServerCredentials::Tls(tls) = credentials.unwrap_or_default() {
        server = server.tls_config(*tls).map_err(CreateServerError::Tls)?;
    }

    let listener = TcpListener::bind(domain)
        .await
        .map_err(|e| CreateServerError::Bind(domain.to_string(), e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| CreateServerError::Bind(domain.to_string(), e))?;

    tracing::info!(addr = %local_addr, services = ?service_names, "gRPC server bound");

    Ok(BoundServer {
        server,
        routes,
        listener,
        local_addr,
    })
}

/// A server with every service registered and its listener bound, not yet serving.
///
/// The caller owns its lifecycle from here on.
pub struct BoundServer {
    server: Server,
    routes: Routes,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until the process stops or the transport fails.
    pub async fn serve(self) -> Result<(), tonic::transport::Error> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serves until `signal` completes, then shuts down gracefully.
    pub async fn serve_with_shutdown(
        self,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), tonic::transport::Error> {
        let Self {
            mut server,
            routes,
            listener,
            local_addr,
        } = self;

        tracing::info!(addr = %local_addr, "gRPC server listening");

        server
            .add_routes(routes)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await?;

        tracing::info!(addr = %local_addr, "gRPC server shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
