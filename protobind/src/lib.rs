//! # Protobind
//!
//! `protobind` removes the boilerplate of standing up gRPC clients and servers whose
//! schemas are only known at runtime. It loads `.proto` definitions (or binary
//! descriptor sets), builds the transport credentials, and adapts plain async
//! functions over JSON values into the method tables `tonic` serves.
//!
//! ## Key Components
//!
//! * **[`client::create_client`]:** Resolves a service, connects to it and returns a
//!   [`client::CallTable`] with one async call per requested method.
//! * **[`server::create_server`]:** Resolves every service of a [`server::ServerSetup`],
//!   binds its handlers and returns a [`server::BoundServer`] ready to serve.
//! * **[`credentials`]:** Insecure or TLS contexts built from inline PEM data or files.
//! * **[`schema`]:** The [`schema::SchemaLoader`] abstraction and the service resolver.
//! * **[`options::LoaderOptions`]:** How messages are represented as JSON.
//!
//! ## Error reporting
//!
//! Setup errors (credentials, schemas, binding) fail fast before anything is served.
//! Handler failures are normalized into an [`server::RpcError`] and reported to the
//! calling peer only.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod client;
pub mod credentials;
pub mod grpc;
pub mod options;
pub mod schema;
pub mod server;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
