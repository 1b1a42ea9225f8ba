// src/lib.rs

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock_ads_service;
pub mod model;
pub mod serving;
pub mod store;

pub use error::{EngineError, EngineResult};
pub use model::ad::{Advertisement, Placement, RuntimeStatus, StoredStatus, Tier};
pub use model::context::TargetingContext;
pub use store::ad_store::AdStore;
