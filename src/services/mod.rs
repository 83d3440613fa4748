pub mod alert_engine;
pub mod cache;
pub mod chain;
pub mod delta_engine;
pub mod facilitator;
pub mod pool_source;
pub mod pricing;
pub mod protocols;
pub mod snapshot_store;
pub mod watcher;

pub use alert_engine::{AlertEngine, Direction, RuleSpec, SeverityTable};
pub use cache::CacheService;
pub use chain::ChainService;
pub use delta_engine::DeltaEngine;
pub use facilitator::{Facilitator, FacilitatorError, HttpFacilitator};
pub use pool_source::PoolDataSource;
pub use pricing::PriceService;
pub use snapshot_store::{Observation, SnapshotStore};
pub use watcher::WatchService;
