//! touchtrail-core library.
//!
//! Resolves the marketing attribution of anonymous visits, keeps a bounded
//! log of touchpoints, and attaches the account identity to that log once
//! the visitor signs up or logs in.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per concern, each carrying an
//!   [`ErrorCode`](error::ErrorCode). Only caller-supplied arguments fail a
//!   public operation; storage and transport failures are logged and absorbed.
//! - **Logging**: `tracing` macros (`debug!` for suppression decisions,
//!   `info!` for recorded touchpoints, `warn!` for swallowed failures).
//! - **Time**: epoch milliseconds from a [`Clock`](clock::Clock).

pub mod attribution;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod event;
pub mod identity;
pub mod navigation;
pub mod page;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod tracker;

pub use attribution::AttributionSnapshot;
pub use config::{TrackerConfig, load_config};
pub use error::{ErrorCode, TrackerError};
pub use event::{EventKind, TouchpointEvent};
pub use navigation::NavigationSignal;
pub use page::PageContext;
pub use tracker::{SessionState, Tracker, TrackerBuilder, VisitOutcome};
