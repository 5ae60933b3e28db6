use serde::{Deserialize, Serialize};

use crate::domain::role::RoleTag;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A person as seen by the organisation directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub active_role: Option<RoleTag>,
    pub is_active: bool,
}

/// Narrows a role-holder lookup to part of the organisation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrgScope {
    Unscoped,
    Faculty(String),
    Department(String),
}
