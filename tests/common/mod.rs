//! Common test infrastructure
//!
//! This module provides everything end-to-end tests need: a running executor
//! server, a fake scheduler receiving results and an HTTP client wrapping the
//! API. Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{FakeScheduler, TestClient, TestServer};
//!
//! #[tokio::test]
//! async fn test_echo() {
//!     let scheduler = FakeScheduler::spawn().await;
//!     let server = TestServer::spawn(Some(scheduler.base_url.clone())).await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     client.post_trigger("t1", "builtin.Echo", serde_json::json!({})).await;
//!     scheduler.wait_for_results(1).await;
//! }
//! ```

mod client;
mod constants;
mod scheduler;
mod server;

pub use client::TestClient;
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use scheduler::FakeScheduler;
pub use server::TestServer;
