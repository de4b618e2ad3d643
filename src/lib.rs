//! MCP aggregating hub library: one upstream endpoint speaking JSON-RPC,
//! many downstream MCP servers behind it. See `hub::Hub` for the central
//! coordinator and `dispatcher::dispatch` for the JSON-RPC method table.

pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod downstream;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod naming;
pub mod registry;
pub mod relay;
pub mod revision;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod types;
