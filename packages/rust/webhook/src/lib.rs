//! Inbound webhook surface for docenrich.
//!
//! The collection service notifies the enricher over `POST /webhook`; batch
//! notifications are queued for the worker pool and acknowledged before any
//! enrichment work starts.

pub mod auth;
pub mod events;
pub mod router;

pub use auth::JwtConfig;
pub use events::{EventPayload, WebhookEvent};
pub use router::build_router;
