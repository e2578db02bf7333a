//! Sources of per-lane vehicle counts.

pub mod postgres;

use async_trait::async_trait;

use smartway_core::DemandSnapshot;

use crate::error::DemandError;

pub use postgres::PgDemandProvider;

#[async_trait]
pub trait DemandProvider: Send + Sync {
    /// Latest known counts, or `None` when the source has nothing to offer.
    async fn latest_counts(&self) -> Result<Option<DemandSnapshot>, DemandError>;
}

/// Provider for deployments without a vehicle counter.
///
/// Every cycle becomes a forced-rotation cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDemandProvider;

#[async_trait]
impl DemandProvider for NullDemandProvider {
    async fn latest_counts(&self) -> Result<Option<DemandSnapshot>, DemandError> {
        Ok(None)
    }
}
