//! Telemetry Ingestion Service
//!
//! Merges a bulk historical dataset with a live publish/subscribe feed
//! into one time-ordered series per sensor channel:
//! - Channel registry resolving dataset columns and feed topics
//! - Historical loader with time-bucket downsampling
//! - Live dispatcher with payload and timestamp canonicalization
//! - Ingest gate holding live data back until the seed is in place
//! - Series store publishing deltas to observers
//!
//! # Architecture
//!
//! ```text
//!  Historical source          Live feed
//!        │                        │
//!   ┌────▼─────┐             ┌────▼────┐
//!   │  Loader  │             │  Gate   │ ← queues until load completes
//!   └────┬─────┘             └────┬────┘
//!        │ downsample             │
//!        │                  ┌─────▼──────┐
//!        │                  │ Dispatcher │
//!        │                  └─────┬──────┘
//!        │ seed                   │ append
//!   ┌────▼────────────────────────▼────┐
//!   │           Series Store           │
//!   └────────────────┬─────────────────┘
//!                    │ SeriesUpdate deltas
//!               ┌────▼─────┐
//!               │ Observers│
//!               └──────────┘
//! ```

pub mod config;
pub mod downsample;
pub mod engine;
pub mod events;
pub mod gate;
pub mod historical;
pub mod live;
pub mod metrics;
pub mod records;
pub mod registry;
pub mod series;
pub mod source;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
