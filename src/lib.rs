//! Muninn - offline-first request interception for static sites
//!
//! Muninn sits in front of a static site and answers every request for it.
//! On install it precaches a fixed manifest of pages, scripts, styles and
//! data into a versioned *generation*; on activate that generation becomes
//! current and older ones are deleted. From then on:
//!
//! - the dynamic data endpoint is fetched **network-first**, refreshing its
//!   cached snapshot in the background and falling back to it when offline;
//! - everything else is served **cache-first**, so the site works with no
//!   network at all;
//! - a navigation that neither can answer gets a small offline page instead
//!   of an error.
//!
//! # Example
//!
//! ```rust,no_run
//! use muninn::{Muninn, Request};
//! use reqwest::Url;
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let gateway = Muninn::builder()
//!         .origin("https://vardi.example")
//!         .generation("latvian-lang-b1-v3")
//!         .build()?;
//!
//!     gateway.start().await?;
//!
//!     let url = Url::parse("https://vardi.example/week1.html").unwrap();
//!     let served = gateway.handle(&Request::get(url)).await?;
//!     println!("{} from {}", served.response.status, served.source.as_str());
//!     Ok(())
//! }
//! ```
//!
//! # HTTP proxy (requires `server` feature)
//!
//! The `muninnd` binary runs the gateway as a reverse proxy in front of the
//! site's origin server. See [`server`].

pub mod cache;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod lifecycle;
pub mod manifest;
pub mod network;
pub mod router;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheGeneration, CacheStorage, CurrentGeneration, DiskCacheStorage, MemoryCacheStorage};
pub use error::{MuninnError, Result};
pub use gateway::{Muninn, MuninnBuilder, OfflineGateway};
pub use lifecycle::{ActivateReport, InstallReport, LifecycleController, LifecycleState};
pub use manifest::AssetManifest;
pub use network::{HttpNetwork, Network};
pub use router::{FetchRouter, RoutePolicy, Strategy, WriteBackFailure};
pub use types::{CachedResponse, Destination, Request, RequestKey, Response, ResponseSource, Served};
pub use version::{PKG_VERSION, version_string};
