//! JSON-RPC session runtime: newline-delimited JSON-RPC 2.0 over
//! stdin/stdout, with capability negotiation and bounded concurrency.

pub mod rpc;
pub mod server;
pub mod session;
