//! rendermon server and client library
//!
//! Shared by the `rendermon` binary and the integration tests:
//! - `engine`: the actor that owns progress state
//! - `hub`: viewer connection registry and fan-out
//! - `server`, `api`, `ws`: HTTP and WebSocket surface
//! - `viewer`, `generator`: terminal viewer and test frame generator

pub mod api;
pub mod engine;
pub mod generator;
pub mod hub;
pub mod logging;
pub mod server;
pub mod state;
pub mod system_config;
pub mod viewer;
pub mod ws;
