use serde::{Deserialize, Serialize};

/// Symbolic organisational role a workflow step is addressed to.
///
/// Tags that are not recognised are preserved verbatim so that a document
/// type can still be stored and displayed; such steps never resolve to an
/// approver and are skipped when the workflow is created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoleTag {
    DepartmentHead,
    FacultyDean,
    DeanDeputy,
    Director,
    DirectorDeputy,
    AcademicOffice,
    RegistrationOffice,
    Teacher,
    Unrecognized(String),
}

impl RoleTag {
    pub const KNOWN: [RoleTag; 8] = [
        RoleTag::DepartmentHead,
        RoleTag::FacultyDean,
        RoleTag::DeanDeputy,
        RoleTag::Director,
        RoleTag::DirectorDeputy,
        RoleTag::AcademicOffice,
        RoleTag::RegistrationOffice,
        RoleTag::Teacher,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::DepartmentHead => "department_head",
            Self::FacultyDean => "faculty_dean",
            Self::DeanDeputy => "dean_deputy",
            Self::Director => "director",
            Self::DirectorDeputy => "director_deputy",
            Self::AcademicOffice => "academic_office",
            Self::RegistrationOffice => "registration_office",
            Self::Teacher => "teacher",
            Self::Unrecognized(raw) => raw.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        Self::KNOWN
            .iter()
            .find(|known| known.as_str() == normalized)
            .cloned()
            .unwrap_or_else(|| Self::Unrecognized(value.trim().to_string()))
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for RoleTag {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<RoleTag> for String {
    fn from(value: RoleTag) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for RoleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
