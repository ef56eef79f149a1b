//! # Generic gRPC Transport
//!
//! Building blocks shared by both sides of a call: a codec that carries
//! `serde_json::Value` messages as Protobuf on the wire, and a unary client over
//! any tonic `GrpcService`. Message shapes come from `prost-reflect` descriptors,
//! so no generated types are involved.
pub mod client;
pub mod codec;
