//! # Sales Event Server
//!
//! This crate implements a concurrent TCP server that ingests point-in-time
//! sales events, maintains a rolling **daily time series**, and answers two
//! kinds of queries: non-blocking aggregations over the last N completed
//! days, and blocking condition-queries that wait on live activity in the
//! current day.
//!
//! ## Features
//!
//! - Length-prefixed binary wire protocol with dictionary-compressed event
//!   lists.
//! - Multiple in-flight requests per TCP connection, matched by frame tag —
//!   a blocking query never holds up the rest of the connection.
//! - Per-connection authentication (SHA-256 password hashes).
//! - Bounded in-memory history window backed by per-day files on disk.
//! - Lazy aggregations with a day-stamped, LRU-bounded cache.
//! - Bounded worker pool; one reader thread per connection.
//! - Graceful shutdown with atomic-rename persistence.
//!
//! ## Architecture Overview
//!
//! The crate is organized into several modules:
//!
//! - [`protocol`](crate::protocol) — Frame codec, request/response unions,
//!   event-list coding.
//! - [`auth`](crate::auth) — User accounts and the authentication store.
//! - [`time_series`](crate::time_series) — Current day, history window,
//!   blocking condition waiters.
//! - [`cache`](crate::cache) — Day-stamped aggregation cache with LRU
//!   eviction.
//! - [`aggregation`](crate::aggregation) — Windowed aggregations over the
//!   time series.
//! - [`persistence`](crate::persistence) — Binary on-disk format and
//!   recovery.
//! - [`worker_pool`](crate::worker_pool) — Fixed-size pool executing
//!   request tasks.
//! - [`tcp_server`](crate::tcp_server) — Accept loop, connection readers,
//!   request dispatch.
//! - [`demultiplexer`](crate::demultiplexer) — Client-side tag
//!   demultiplexing.
//! - [`client`](crate::client) — High-level typed client.
//! - [`defs`](crate::defs) — Shared defaults and limits.
//! - [`errors`](crate::errors) — Error types used across modules.
//!
//! ## Wire Protocol
//!
//! Every frame is `i32 tag | i32 body_len | body`, big-endian. Clients
//! allocate tags per connection; the server echoes the tag so responses can
//! arrive in any order. See [`protocol`](crate::protocol) for the
//! per-operation payload shapes.
//!
//! ## Days
//!
//! Days are logical buckets, advanced by an administrative NEW_DAY signal
//! rather than a wall clock. Completing a day persists it, promotes it into
//! the in-memory window (bounded at `S` days), and expires the day file
//! falling out of the `D`-day disk window.
//!
//! ## Example: Running the Server
//!
//! ```no_run
//! use std::sync::Arc;
//! use sales_server::aggregation::AggregationService;
//! use sales_server::auth::AuthStore;
//! use sales_server::persistence::Persistence;
//! use sales_server::tcp_server::{SalesServer, ServerState};
//! use sales_server::time_series::TimeSeries;
//! use sales_server::worker_pool::WorkerPool;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let persistence = Persistence::new("data");
//!     let series = Arc::new(TimeSeries::load(30, 7, persistence.clone())?);
//!     let auth = Arc::new(AuthStore::new());
//!     for user in persistence.load_users()? {
//!         auth.register_prehashed(user);
//!     }
//!
//!     let state = Arc::new(ServerState {
//!         auth,
//!         series: Arc::clone(&series),
//!         aggregation: Arc::new(AggregationService::new(series, 7)),
//!         pool: Arc::new(WorkerPool::new(8)),
//!         persistence,
//!     });
//!
//!     let server = SalesServer::bind("127.0.0.1:12345", state)?;
//!     server.start()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unreachable_pub)]

pub mod aggregation;
pub mod auth;
pub mod cache;
pub mod client;
pub mod defs;
pub mod demultiplexer;
pub mod errors;
pub mod persistence;
pub mod protocol;
pub mod tcp_server;
pub mod time_series;
pub mod worker_pool;
