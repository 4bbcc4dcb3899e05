//! # Wirerpc
//!
//! Typed operations bound to HTTP: DTOs and their shapes, wire codecs, the
//! service error model, the binding engine, and a client dispatcher and
//! in-process server built on top of them.

pub mod aspect;
pub mod binding;
pub mod client;
pub mod codec;
pub mod contract;
pub mod dto;
pub mod fault;
pub mod message;
pub mod server;
pub mod service;
pub mod shape;
pub mod testing;
pub mod transport;
pub mod tree;

pub use client::Client;
pub use codec::Codec;
pub use codec::CodecSet;
pub use contract::HttpSpec;
pub use contract::OperationDescriptor;
pub use contract::ResponseSpec;
pub use contract::ServiceContract;
pub use dto::Dto;
pub use dto::FieldValue;
pub use fault::ErrorCode;
pub use fault::ServiceError;
pub use fault::ServiceResult;
pub use server::HttpHandler;
pub use service::CallContext;
pub use service::Service;
pub use service::ServiceRegistry;
pub use shape::FieldShape;
pub use shape::FieldType;
pub use shape::Shape;
pub use tree::TreeValue;
