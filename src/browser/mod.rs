//! Rendering transport backed by headless Chrome
//!
//! A [`BrowserSession`] owns one Chrome process for the lifetime of a crawl
//! run. Each rendered fetch checks out a fresh tab, installs the request
//! interception predicate on it and closes it again once the markup has
//! been captured.
//!
//! # Example
//!
//! ```no_run
//! use rust_manga_sync::browser::{BrowserConfig, BrowserSession};
//! use rust_manga_sync::transport::Renderer;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = BrowserSession::from_config(BrowserConfig::default());
//! let html = session.render("https://example.com", Some("h1")).await?;
//! println!("Rendered {} bytes of HTML", html.len());
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod intercept;
pub mod page;
pub mod session;

pub use config::BrowserConfig;
pub use intercept::{
    blocklist_predicate, InterceptDecision, InterceptPredicate, PageOrigin, RequestDescriptor, ResourceKind,
};
pub use page::RenderedPage;
pub use session::{BrowserError, BrowserSession, TabLease};
