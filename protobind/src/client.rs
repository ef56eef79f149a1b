//! # Client Stub Builder
//!
//! Resolves a service from its schema, connects to the remote address and exposes
//! every requested unary method through a [`CallTable`].
//!
//! ```rust,no_run
//! use protobind::client::{ClientSetup, create_client};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let setup = ClientSetup::new("protos/orders.proto", "orders", "OrderService", "localhost:50051")
//!     .call("GetOrder");
//!
//! let calls = create_client(setup, None).await?;
//!
//! let order = calls
//!     .get("GetOrder")
//!     .expect("listed above")
//!     .call(serde_json::json!({ "id": 42 }))
//!     .await?;
//! # Ok(())
//! # }
//! ```
use crate::{
    BoxError,
    credentials::ChannelCredentials,
    grpc::client::{GrpcClient, GrpcRequestError},
    options::LoaderOptions,
    schema::{
        ProtoFileLoader, ResolvedService, SchemaLoader, SchemaReference, SchemaResolutionError,
    },
};
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::{collections::HashMap, path::PathBuf};
use tonic::{
    Status,
    client::GrpcService,
    transport::{Channel, Endpoint},
};

/// Errors that can occur while building a client.
#[derive(Debug, thiserror::Error)]
pub enum CreateClientError {
    #[error("Schema resolution failed: '{0}'")]
    Schema(#[from] SchemaResolutionError),
    #[error("Invalid address '{0}': {1}")]
    InvalidAddress(String, #[source] tonic::transport::Error),
    #[error("Invalid TLS configuration for '{0}': {1}")]
    Tls(String, #[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

/// Everything needed to build a client for one service.
#[derive(Debug, Clone)]
pub struct ClientSetup {
    pub schema_path: PathBuf,
    pub package_name: String,
    pub service_name: String,
    /// `host:port` of the server. A `scheme://` prefix is kept as given.
    pub address: String,
    /// The unary methods exposed through the resulting [`CallTable`].
    pub calls: Vec<String>,
    pub options: LoaderOptions,
}

impl ClientSetup {
    pub fn new(
        schema_path: impl Into<PathBuf>,
        package_name: impl Into<String>,
        service_name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            schema_path: schema_path.into(),
            package_name: package_name.into(),
            service_name: service_name.into(),
            address: address.into(),
            calls: Vec::new(),
            options: LoaderOptions::default(),
        }
    }

    pub fn call(mut self, name: impl Into<String>) -> Self {
        self.calls.push(name.into());
        self
    }

    pub fn options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    fn schema_reference(&self) -> SchemaReference {
        SchemaReference::new(
            self.schema_path.clone(),
            self.package_name.clone(),
            self.service_name.clone(),
        )
    }

    fn uri(&self, credentials: &ChannelCredentials) -> String {
        if self.address.contains("://") {
            return self.address.clone();
        }

        let scheme = if credentials.is_insecure() {
            "http"
        } else {
            "https"
        };

        format!("{}://{}", scheme, self.address)
    }
}

/// Builds a connected [`CallTable`] compiling the schema with [`ProtoFileLoader`].
///
/// `credentials` defaults to an insecure channel.
pub async fn create_client(
    setup: ClientSetup,
    credentials: Option<ChannelCredentials>,
) -> Result<CallTable, CreateClientError> {
    create_client_with_loader(setup, credentials, &ProtoFileLoader::default()).await
}

/// Builds a connected [`CallTable`] loading the schema with `loader`.
///
/// # Returns
///
/// * `Ok(CallTable)` - One entry per name in `setup.calls`.
/// * `Err(CreateClientError)` - The schema, a call name, the address or the connection is invalid.
pub async fn create_client_with_loader(
    setup: ClientSetup,
    credentials: Option<ChannelCredentials>,
    loader: &impl SchemaLoader,
) -> Result<CallTable, CreateClientError> {
    let resolved = setup.schema_reference().resolve(loader, setup.options)?;
    for name in &setup.calls {
        resolved.unary_method(name)?;
    }

    let credentials = credentials.unwrap_or_default();
    let uri = setup.uri(&credentials);

    let mut endpoint =
        Endpoint::new(uri.clone()).map_err(|e| CreateClientError::InvalidAddress(uri.clone(), e))?;

    if let ChannelCredentials::Tls(tls) = credentials {
        endpoint = endpoint
            .tls_config(*tls)
            .map_err(|e| CreateClientError::Tls(uri.clone(), e))?;
    }

    let channel = endpoint
        .connect()
        .await
        .map_err(|e| CreateClientError::ConnectionFailed(uri.clone(), e))?;

    tracing::debug!(service = resolved.full_name(), %uri, "client connected");

    Ok(CallTable::from_service(channel, &resolved, &setup.calls)?)
}

/// One remote unary method bound to a connection.
#[derive(Debug, Clone)]
pub struct RemoteCall<S = Channel> {
    client: GrpcClient<S>,
    method: MethodDescriptor,
    options: LoaderOptions,
}

impl<S> RemoteCall<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Sends `request` and waits for the response.
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The decoded response.
    /// * `Err(Status)` - The status returned by the server or the transport.
    pub async fn call(&self, request: serde_json::Value) -> Result<serde_json::Value, Status> {
        let mut client = self.client.clone();

        client
            .unary(&self.method, request, self.options)
            .await
            .map_err(|GrpcRequestError::ClientNotReady(e)| Status::from_error(e))?
    }
}

/// The remote calls of a service, keyed by method name.
///
/// Built once; names that were not requested are simply absent.
#[derive(Debug, Clone)]
pub struct CallTable<S = Channel> {
    service: String,
    calls: HashMap<String, RemoteCall<S>>,
}

impl<S> CallTable<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Builds the table over an existing Tonic service/channel.
    ///
    /// Every name in `calls` must be a unary method of `resolved`.
    pub fn from_service(
        service: S,
        resolved: &ResolvedService,
        calls: &[String],
    ) -> Result<Self, SchemaResolutionError> {
        let client = GrpcClient::new(service);

        let calls = calls
            .iter()
            .map(|name| {
                let method = resolved.unary_method(name)?;
                let call = RemoteCall {
                    client: client.clone(),
                    method,
                    options: resolved.options(),
                };
                Ok((name.clone(), call))
            })
            .collect::<Result<HashMap<_, _>, SchemaResolutionError>>()?;

        Ok(Self {
            service: resolved.full_name().to_string(),
            calls,
        })
    }
}

impl<S> CallTable<S> {
    /// The fully qualified name of the remote service.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn get(&self, name: &str) -> Option<&RemoteCall<S>> {
        self.calls.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.calls.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.calls.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::transport::ClientTlsConfig;

    fn setup(address: &str) -> ClientSetup {
        ClientSetup::new("orders.proto", "orders", "OrderService", address)
    }

    #[test]
    fn uri_scheme_follows_credentials() {
        let tls = ChannelCredentials::Tls(Box::new(ClientTlsConfig::new()));

        assert_eq!(
            setup("localhost:50051").uri(&ChannelCredentials::Insecure),
            "http://localhost:50051"
        );
        assert_eq!(setup("localhost:50051").uri(&tls), "https://localhost:50051");
    }

    #[test]
    fn uri_keeps_explicit_scheme() {
        let tls = ChannelCredentials::Tls(Box::new(ClientTlsConfig::new()));

        assert_eq!(
            setup("http://localhost:50051").uri(&tls),
            "http://localhost:50051"
        );
        assert_eq!(
            setup("https://orders.internal:443").uri(&ChannelCredentials::Insecure),
            "https://orders.internal:443"
        );
    }
}
