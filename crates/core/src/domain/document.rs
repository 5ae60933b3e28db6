use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::directory::UserId;
use crate::domain::document_type::DocumentTypeId;

pub const VERIFICATION_CODE_LEN: usize = 4;
const VERIFICATION_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short human-typable code printed next to the QR code of an approved document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationCode(pub String);

impl VerificationCode {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..VERIFICATION_CODE_LEN)
            .map(|_| {
                let index = rng.gen_range(0..VERIFICATION_ALPHABET.len());
                char::from(VERIFICATION_ALPHABET[index])
            })
            .collect();
        Self(code)
    }

    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn is_well_formed(&self) -> bool {
        self.0.len() == VERIFICATION_CODE_LEN
            && self.0.bytes().all(|byte| VERIFICATION_ALPHABET.contains(&byte))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    PendingApproval,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Some(Self::Uploaded),
            "pending_approval" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Optional academic context attached at upload time. Only the `teacher`
/// role consults it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    pub subject_id: Option<String>,
    pub group_id: Option<String>,
    pub academic_term_id: Option<String>,
}

impl DocumentContext {
    /// Returns the (subject, group, term) triple when all three are present.
    pub fn teaching_slot(&self) -> Option<(&str, &str, &str)> {
        match (&self.subject_id, &self.group_id, &self.academic_term_id) {
            (Some(subject), Some(group), Some(term)) => {
                Some((subject.as_str(), group.as_str(), term.as_str()))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub uuid: Uuid,
    pub verification_code: VerificationCode,
    pub document_type_id: DocumentTypeId,
    pub title: String,
    pub owner: UserId,
    pub context: DocumentContext,
    pub status: DocumentStatus,
    pub current_step: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a fresh upload entering the workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub document_type_id: DocumentTypeId,
    pub title: String,
    pub owner: UserId,
    pub context: DocumentContext,
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::{DocumentContext, DocumentStatus, VerificationCode};

    #[test]
    fn verification_codes_use_uppercase_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = VerificationCode::generate(&mut rng);
            assert!(code.is_well_formed(), "unexpected code {}", code.0);
        }
    }

    #[test]
    fn normalize_uppercases_user_input() {
        let code = VerificationCode::normalize("  ab1z ");
        assert_eq!(code.0, "AB1Z");
        assert!(code.is_well_formed());
        assert!(!VerificationCode::normalize("ab-1").is_well_formed());
    }

    #[test]
    fn status_round_trips_through_storage_names() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::PendingApproval,
            DocumentStatus::Approved,
            DocumentStatus::Rejected,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("archived"), None);
    }

    #[test]
    fn teaching_slot_requires_all_three_attributes() {
        let partial = DocumentContext {
            subject_id: Some("math".to_string()),
            group_id: Some("g1".to_string()),
            academic_term_id: None,
        };
        assert!(partial.teaching_slot().is_none());

        let full =
            DocumentContext { academic_term_id: Some("2026-fall".to_string()), ..partial.clone() };
        assert_eq!(full.teaching_slot(), Some(("math", "g1", "2026-fall")));
    }
}
