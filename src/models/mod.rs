//! Domain models shared across the whole vault service.

pub mod activity;
pub mod position;
pub mod tranche;
pub mod vault;

pub use activity::{ActivityLog, ActivityRecord};
pub use position::{Position, PositionSummary, POSITION_EPSILON};
pub use tranche::Tranche;
pub use vault::{Vault, VaultId, VaultView};
