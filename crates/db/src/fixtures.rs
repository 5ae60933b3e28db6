use serde::Serialize;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_FACULTY_IDS: &[&str] = &["fac-sci", "fac-hum"];
const SEED_DEPARTMENT_IDS: &[&str] = &["dept-cs", "dept-math", "dept-hist"];
const SEED_DOCUMENT_TYPE_IDS: &[&str] = &["memo", "syllabus", "certificate_request", "study_plan"];
const SEED_USER_COUNT: i64 = 14;

/// Demo organisation used by local runs and directory tests.
///
/// Covers every approver resolution rule, including vacancies: `dept-math`
/// has no head and `fac-hum` has no dean.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            faculties: SEED_FACULTY_IDS.len(),
            departments: SEED_DEPARTMENT_IDS.len(),
            document_types: SEED_DOCUMENT_TYPE_IDS.to_vec(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let faculties: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM org_faculty WHERE id IN {}",
            sql_array_from_ids(SEED_FACULTY_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("faculties", faculties == SEED_FACULTY_IDS.len() as i64));

        let departments: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM org_department WHERE id IN {}",
            sql_array_from_ids(SEED_DEPARTMENT_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("departments", departments == SEED_DEPARTMENT_IDS.len() as i64));

        let users: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM org_user WHERE id LIKE 'u-%'")
            .fetch_one(pool)
            .await?;
        checks.push(("users", users >= SEED_USER_COUNT));

        for id in SEED_DOCUMENT_TYPE_IDS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM document_type WHERE id = ?1 AND is_active = 1)",
            )
            .bind(*id)
            .fetch_one(pool)
            .await?;
            checks.push((*id, exists == 1));
        }

        let allocation: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM teaching_allocation WHERE teacher_user_id = 'u-teacher-cs-b')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("teaching-allocation", allocation == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub faculties: usize,
    pub departments: usize,
    pub document_types: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(DemoSeedDataset::SQL.contains("INSERT OR IGNORE INTO document_type"));
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.document_types.len(), 4);

        DemoSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification = DemoSeedDataset::verify(&pool).await.expect("re-verify");
        assert_eq!(first_verification.checks, second_verification.checks);

        let users: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM org_user")
            .fetch_one(&pool)
            .await
            .expect("count users");
        assert_eq!(users, SEED_USER_COUNT);
    }
}
