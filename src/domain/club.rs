use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only view of a club as published by the club administration service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Club {
    pub id: Uuid,
    pub name: String,
    /// Fee in minor currency units.
    pub membership_fee: i64,
}
