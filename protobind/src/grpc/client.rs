//! # Unary JSON Client
//!
//! [`GrpcClient`] sends one `serde_json::Value` to a method known only by its
//! `MethodDescriptor` and returns the decoded response. Transcoding is left to
//! [`super::codec::JsonCodec`]; the client only waits for readiness and builds
//! the method path.
use super::codec::JsonCodec;
use crate::{BoxError, options::LoaderOptions};
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::str::FromStr;
use tonic::{client::GrpcService, transport::Channel};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
}

/// A generic client able to call any unary method described by a `MethodDescriptor`.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(Value))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send request or connect.
    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        payload: serde_json::Value,
        options: LoaderOptions,
    ) -> Result<Result<serde_json::Value, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = JsonCodec::for_client(method, options);
        let path = http_path(method);
        let request = tonic::Request::new(payload);

        match self.client.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }
}

/// The HTTP/2 path of a method (e.g. `/orders.OrderService/GetOrder`).
pub fn method_path(method: &MethodDescriptor) -> String {
    format!("/{}/{}", method.parent_service().full_name(), method.name())
}

fn http_path(method: &MethodDescriptor) -> http::uri::PathAndQuery {
    http::uri::PathAndQuery::from_str(&method_path(method)).expect("valid gRPC path")
}
