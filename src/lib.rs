//! # cachelens
//!
//! An interactive console harness that drives a small car REST resource
//! through a caching HTTP client and shows, request by request, whether each
//! response was served from the local cache, revalidated with the origin, or
//! fetched fresh.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cachelens::api::{CARS_PATH, CachePolicy, Origin};
//! use cachelens::cache::CachingClient;
//! use cachelens::client::HttpClient;
//! use cachelens::console::{CommandLoop, EndpointResolver, StdinKeys};
//! use cachelens::store::CarRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = Arc::new(CarRepository::default());
//!     let origin = Origin::start("127.0.0.1:0", repo, CachePolicy::default()).await?;
//!     let addr = origin.local_addr().to_string();
//!
//!     let http = HttpClient::new(addr, Duration::from_secs(10))?;
//!     let cached = CachingClient::new(http.clone(), 256).invalidating(CARS_PATH);
//!     let mut console = CommandLoop::new(
//!         cached,
//!         EndpointResolver::new(http),
//!         StdinKeys::new(),
//!         std::io::stdout(),
//!     );
//!     console.run().await?;
//!     origin.stop().await?;
//!     Ok(())
//! }
//! ```

// ── Core: the command loop and what it reads off responses ────────────────────
pub mod console;
pub mod inspector;

// ── Client side ───────────────────────────────────────────────────────────────
pub mod cache;
pub mod client;

// ── Origin side ───────────────────────────────────────────────────────────────
pub mod api;
pub mod context;
pub mod middleware;
pub mod router;
pub mod server;
pub mod store;

// ── Shared ────────────────────────────────────────────────────────────────────
pub mod config;
pub mod http;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
