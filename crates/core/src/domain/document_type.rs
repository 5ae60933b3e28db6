use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::role::RoleTag;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentTypeId(pub String);

/// Configured kind of document, carrying the ordered role sequence every
/// document of this type is routed through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: DocumentTypeId,
    pub name: String,
    pub workflow: Vec<RoleTag>,
    pub deadline_hours: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentType {
    pub fn deadline_hours_or(&self, fallback: u32) -> u32 {
        self.deadline_hours.filter(|hours| *hours > 0).unwrap_or(fallback)
    }
}
