//! # Handler Binding
//!
//! Application handlers are plain async functions from a JSON request to a JSON
//! response. The RPC runtime instead expects a method that completes the call with
//! either a response or a `Status`. [`bind_handlers`] adapts the former into the
//! latter, producing a [`MethodTable`] of [`BoundMethod`]s that implement
//! `tonic::server::UnaryService`.
//!
//! Any failure a handler returns is normalized into an [`RpcError`]:
//!
//! * an [`RpcError`] is forwarded untouched,
//! * a `tonic::Status` keeps its code and message,
//! * anything else becomes `{ code: 1, details: "UnexpectedError" }`.
//!
//! A failing handler only fails its own call.
use crate::{
    BoxError,
    options::LoaderOptions,
    schema::{ResolvedService, SchemaResolutionError},
};
use futures_util::future::BoxFuture;
use prost_reflect::MethodDescriptor;
use serde_json::Value;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tonic::{Code, Request, Response, Status, server::UnaryService};

/// Code reported when a handler fails without a code of its own.
pub const UNEXPECTED_ERROR_CODE: i32 = 1;
/// Details reported when a handler fails without details of its own.
pub const UNEXPECTED_ERROR_DETAILS: &str = "UnexpectedError";

/// The error shape reported to peers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{details} (code {code})")]
pub struct RpcError {
    pub code: i32,
    pub details: String,
}

impl RpcError {
    pub fn new(code: i32, details: impl Into<String>) -> Self {
        Self {
            code,
            details: details.into(),
        }
    }

    /// The fallback used when a failure carries no code or details.
    pub fn unexpected() -> Self {
        Self::new(UNEXPECTED_ERROR_CODE, UNEXPECTED_ERROR_DETAILS)
    }

    /// Normalizes whatever a handler failed with.
    pub fn from_rejection(reason: BoxError) -> Self {
        match reason.downcast::<RpcError>() {
            Ok(error) => *error,
            Err(reason) => match reason.downcast::<Status>() {
                Ok(status) => Self::from(*status),
                Err(_) => Self::unexpected(),
            },
        }
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        let details = if status.message().is_empty() {
            UNEXPECTED_ERROR_DETAILS.to_string()
        } else {
            status.message().to_string()
        };

        Self::new(i32::from(status.code()), details)
    }
}

impl From<RpcError> for Status {
    fn from(error: RpcError) -> Self {
        Status::new(Code::from_i32(error.code), error.details)
    }
}

pub type HandlerFuture = BoxFuture<'static, Result<Value, BoxError>>;

/// An application handler for one unary method.
///
/// Implemented for every `Fn(Value) -> impl Future<Output = Result<Value, E>>`
/// whose error converts into a boxed error.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Value) -> HandlerFuture;
}

impl<F, Fut, E> Handler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn call(&self, request: Value) -> HandlerFuture {
        let fut = (self)(request);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// Handlers keyed by method name.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for the method `name`, replacing any previous one.
    pub fn handler(mut self, name: impl Into<String>, handler: impl Handler) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// A handler bound to the method it serves.
#[derive(Clone)]
pub struct BoundMethod {
    method: MethodDescriptor,
    handler: Arc<dyn Handler>,
    options: LoaderOptions,
}

impl BoundMethod {
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// Runs the handler and normalizes its failure.
    pub async fn invoke(&self, request: Value) -> Result<Value, RpcError> {
        self.handler.call(request).await.map_err(|reason| {
            let error = RpcError::from_rejection(reason);
            tracing::debug!(
                method = self.method.full_name(),
                code = error.code,
                details = %error.details,
                "handler rejected request"
            );
            error
        })
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod")
            .field("method", &self.method.full_name())
            .finish_non_exhaustive()
    }
}

impl UnaryService<Value> for BoundMethod {
    type Response = Value;
    type Future = BoxFuture<'static, Result<Response<Value>, Status>>;

    fn call(&mut self, request: Request<Value>) -> Self::Future {
        let method = self.clone();

        Box::pin(async move {
            method
                .invoke(request.into_inner())
                .await
                .map(Response::new)
                .map_err(Status::from)
        })
    }
}

/// The bound methods of one service, keyed by method name.
#[derive(Debug, Clone)]
pub struct MethodTable {
    service: ResolvedService,
    methods: BTreeMap<String, BoundMethod>,
}

impl MethodTable {
    pub fn service(&self) -> &ResolvedService {
        &self.service
    }

    pub fn get(&self, name: &str) -> Option<&BoundMethod> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &BoundMethod> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Binds every handler to its method.
///
/// # Returns
///
/// * `Ok(MethodTable)` - One bound method per handler.
/// * `Err(SchemaResolutionError)` - A handler names a missing or streaming method.
pub fn bind_handlers(
    service: &ResolvedService,
    handlers: HandlerTable,
) -> Result<MethodTable, SchemaResolutionError> {
    let methods = handlers
        .handlers
        .into_iter()
        .map(|(name, handler)| {
            let method = service.unary_method(&name)?;
            let bound = BoundMethod {
                method,
                handler,
                options: service.options(),
            };
            Ok((name, bound))
        })
        .collect::<Result<BTreeMap<_, _>, SchemaResolutionError>>()?;

    Ok(MethodTable {
        service: service.clone(),
        methods,
    })
}
