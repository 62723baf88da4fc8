//! # tally-core
//!
//! Subscription bookkeeping for the Tally subscribe client.
//!
//! This crate provides:
//!
//! - **SubscriptionRegistry** - concurrency-safe set of subscribed names with
//!   their sinks, connected flags and a deferred abort marker
//! - **Sinks** - the success/error conduit pair created per subscribe request
//! - **Router** - routes decoded envelopes and status events to sinks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │  Poll loop  │────▶│   Router    │────▶│  Registries  │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                            │                    │
//!                            ▼                    ▼
//!                     ┌─────────────┐     ┌──────────────┐
//!                     │  Envelope   │     │    Sinks     │
//!                     └─────────────┘     └──────────────┘
//! ```

pub mod metrics;
pub mod registry;
pub mod router;
pub mod sink;

pub use registry::{SubscriptionItem, SubscriptionRegistry};
pub use router::{RouteReport, Router, RouterConfig};
pub use sink::{subscription_channels, Sink, SubscriptionReceivers, SubscriptionSinks};
