//! # washboard
//!
//! Read-through cache and cross-domain aggregation engine for a laundry/hotel
//! admin dashboard.
//!
//! ## Features
//!
//! - **Read-Through Caching:** TTL-bounded, keyed by normalized query
//!   parameters, with single-flight population and explicit invalidation
//! - **Cursor Pagination:** Fully materializes paginated REST collections by
//!   following `next` links, with page caps and partial-success truncation
//! - **Pure Aggregation:** Per-customer rollups, per-shop breakdowns, monthly
//!   time series and top-N rankings over a resolved date window
//! - **Transport Agnostic:** Fetchers are written against the [`ApiClient`]
//!   trait, so tests run against an in-memory mock
//! - **Defensive Parsing:** Dirty money and date fields degrade to safe
//!   defaults instead of failing the dashboard
//!
//! ## Quick Start
//!
//! ```ignore
//! use washboard::{
//!     CollectionFetcher, EngineConfig, ReportEngine, RestClient,
//!     SessionCaches, StaticToken,
//! };
//! use std::sync::Arc;
//!
//! // 1. Build the transport and the session-scoped caches
//! let config = EngineConfig::default().with_base_url("https://api.example.com/laundry");
//! let client = RestClient::new(&config, Arc::new(StaticToken::new("abc123")))?;
//! let caches = Arc::new(SessionCaches::new(&config));
//!
//! // 2. Compose a fetcher - Clone is cheap, share it across UI actions
//! let fetcher = Arc::new(CollectionFetcher::new(Arc::new(client), caches, config));
//!
//! // 3. Paged customer list (cache hit short-circuits the network)
//! let page = fetcher.fetch_customers_page(1, 25, "", false).await?;
//!
//! // 4. Full performance report (concurrent drains, then pure aggregation)
//! let report = ReportEngine::new(fetcher).dashboard(None, false).await?;
//! ```

#[macro_use]
extern crate log;

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod model;
pub mod mutation;
pub mod paginator;
pub mod report;

// Re-exports for convenience
pub use aggregate::{CustomerRollup, DashboardReport, DateWindow};
pub use cache::{CacheEntry, TtlCache};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use fetcher::{CollectionFetcher, CollectionPage, SessionCaches};
pub use http::{ApiClient, MockApi, RestClient, StaticToken, TokenSource};
pub use model::{Customer, Expense, HotelExpense, HotelOrder, Order};
pub use mutation::{EntityKind, MutationCoordinator, ViewCursor};
pub use paginator::{drain, Drain, PaginationState};
pub use report::{ReportEngine, ReportOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
