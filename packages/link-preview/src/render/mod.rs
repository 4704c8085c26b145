//! Headless-browser rendering fallback.
//!
//! - [`pool::BrowserPool`] - one lazily-launched browser per process
//! - [`context::BrowsingContext`] - isolated context per render, always released
//! - [`chromium::ChromiumRenderer`] - the [`Renderer`](crate::traits::renderer::Renderer) implementation

pub mod chromium;
pub mod context;
pub mod pool;

pub use chromium::ChromiumRenderer;
pub use context::BrowsingContext;
pub use pool::{BrowserPool, LiveBrowser};
