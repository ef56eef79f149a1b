//! # Service Registry
//!
//! The typed registry of everything a server exposes. It is built in one pass over
//! the setup: every service is resolved and every handler bound, in order, before
//! anything is mounted. Any failure aborts the whole build, so a registry either
//! holds every service or doesn't exist.
//!
//! [`ServiceRegistry::into_routes`] mounts one route per bound method at its gRPC path
//! (`/{package}.{Service}/{Method}`). Paths without a route answer `UNIMPLEMENTED`.
use super::{
    ServiceSetup,
    handler::{BoundMethod, MethodTable, bind_handlers},
};
use crate::{
    grpc::{client::method_path, codec::JsonCodec},
    options::LoaderOptions,
    schema::{SchemaLoader, SchemaReference, SchemaResolutionError},
};
use futures_util::future::BoxFuture;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::{
    collections::{BTreeMap, HashSet},
    convert::Infallible,
    path::Path,
    task::{Context, Poll},
};
use tonic::{Status, service::Routes};

/// Every bound service of a server, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<MethodTable>,
}

impl ServiceRegistry {
    /// Resolves and binds every service of `services` in order.
    ///
    /// Service files are looked up relative to `schema_root`.
    pub fn build(
        services: Vec<ServiceSetup>,
        schema_root: &Path,
        options: LoaderOptions,
        loader: &impl SchemaLoader,
    ) -> Result<Self, SchemaResolutionError> {
        let mut seen = HashSet::new();
        let mut tables = Vec::with_capacity(services.len());

        for setup in services {
            let reference = SchemaReference::new(
                schema_root.join(&setup.schema_file),
                setup.package_name,
                setup.service_name,
            );
            let resolved = reference.resolve(loader, options)?;

            if !seen.insert(resolved.full_name().to_string()) {
                return Err(SchemaResolutionError::DuplicateService {
                    service: resolved.full_name().to_string(),
                });
            }

            tables.push(bind_handlers(&resolved, setup.handlers)?);
        }

        Ok(Self { services: tables })
    }

    pub fn services(&self) -> &[MethodTable] {
        &self.services
    }

    /// Fully qualified names of the registered services.
    pub fn service_names(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|table| table.service().full_name().to_string())
            .collect()
    }

    /// Looks up a bound method by service and method name.
    pub fn method(&self, service: &str, method: &str) -> Option<&BoundMethod> {
        self.services
            .iter()
            .find(|table| table.service().full_name() == service)
            .and_then(|table| table.get(method))
    }

    /// All file descriptors the registered services were loaded from, deduplicated by file name.
    pub fn file_descriptor_set(&self) -> FileDescriptorSet {
        let files: BTreeMap<String, FileDescriptorProto> = self
            .services
            .iter()
            .flat_map(|table| table.service().pool().file_descriptor_protos())
            .map(|file| (file.name().to_string(), file.clone()))
            .collect();

        FileDescriptorSet {
            file: files.into_values().collect(),
        }
    }

    /// Mounts every bound method, plus the reflection service when `reflection` is set.
    pub fn into_routes(self, reflection: bool) -> Result<Routes, tonic_reflection::server::Error> {
        let reflection_service = if reflection {
            Some(
                tonic_reflection::server::Builder::configure()
                    .register_file_descriptor_set(self.file_descriptor_set())
                    .build_v1()?,
            )
        } else {
            None
        };

        let mut router = axum::Router::new();

        for method in self.services.iter().flat_map(MethodTable::methods) {
            let path = method_path(method.method());
            tracing::debug!(%path, "registering route");
            router = router.route_service(&path, MethodRoute(method.clone()));
        }

        let routes = Routes::from(router.fallback(unimplemented));

        Ok(match reflection_service {
            Some(service) => routes.add_service(service),
            None => routes,
        })
    }
}

/// Serves one bound method over the JSON codec.
#[derive(Clone)]
struct MethodRoute(BoundMethod);

impl tower::Service<http::Request<axum::body::Body>> for MethodRoute {
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<axum::body::Body>) -> Self::Future {
        let method = self.0.clone();

        Box::pin(async move {
            let codec = JsonCodec::for_server(method.method(), method.options());
            let mut grpc = tonic::server::Grpc::new(codec);
            Ok(grpc.unary(method, request).await)
        })
    }
}

async fn unimplemented() -> axum::response::Response {
    Status::unimplemented("").into_http()
}
