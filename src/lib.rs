//! Full-content feed enrichment.
//!
//! Takes an RSS/Atom feed whose entries only carry a teaser, visits every
//! article, and produces an RSS 2.0 feed with the full article HTML, a
//! representative image and normalized tags for each entry.
//!
//! ```no_run
//! use fullfeed::{Config, EnrichRequest, FeedEnricher};
//!
//! # async fn run() -> Result<(), fullfeed::EnrichError> {
//! let enricher = FeedEnricher::new(Config::default())?;
//! let document = enricher
//!     .enrich(&EnrichRequest {
//!         url: "https://example.com/feed.xml".into(),
//!         ..EnrichRequest::default()
//!     })
//!     .await?;
//! println!("{}", String::from_utf8_lossy(&document.xml));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod enricher;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod pipeline;
pub mod storage;
pub mod util;

pub use config::{Config, ConfigError};
pub use enricher::{EnrichError, EnrichRequest, FeedDocument, FeedEnricher};
