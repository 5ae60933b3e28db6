//! Approver resolution.
//!
//! Each role tag maps to one [`ResolutionRule`] in a lookup table. A rule
//! describes which directory query answers "who approves this step", so the
//! rules can be swapped or unit tested without touching the workflow itself.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::directory::{DirectoryUser, OrgScope, UserId};
use crate::domain::document::DocumentContext;
use crate::domain::role::RoleTag;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the organisation directory.
///
/// Every lookup returning "the first" candidate must order by user id so
/// repeated calls agree.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<DirectoryUser>, DirectoryError>;

    async fn department_head(&self, department_id: &str)
        -> Result<Option<UserId>, DirectoryError>;

    async fn faculty_dean(&self, faculty_id: &str) -> Result<Option<UserId>, DirectoryError>;

    async fn first_active_with_role(
        &self,
        role: &RoleTag,
        scope: &OrgScope,
    ) -> Result<Option<UserId>, DirectoryError>;

    async fn allocated_teacher(
        &self,
        subject_id: &str,
        group_id: &str,
        academic_term_id: &str,
    ) -> Result<Option<UserId>, DirectoryError>;
}

/// Facts about the uploader and the document a rule may consult.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    pub department_id: Option<String>,
    pub faculty_id: Option<String>,
    pub document: DocumentContext,
}

impl ResolutionContext {
    pub fn for_uploader(uploader: Option<&DirectoryUser>, document: DocumentContext) -> Self {
        Self {
            department_id: uploader.and_then(|user| user.department_id.clone()),
            faculty_id: uploader.and_then(|user| user.faculty_id.clone()),
            document,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HolderScope {
    UploaderFaculty,
    Unscoped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionRule {
    DepartmentHead,
    FacultyDean,
    /// First active person whose active role equals the step's tag.
    RoleHolder(HolderScope),
    /// Allocated teacher for the document's teaching slot, falling back to any
    /// active teacher in the uploader's department.
    Teacher,
}

#[derive(Clone, Debug)]
pub struct ApproverResolver {
    rules: HashMap<RoleTag, ResolutionRule>,
}

impl Default for ApproverResolver {
    fn default() -> Self {
        Self::standard()
    }
}

impl ApproverResolver {
    pub fn standard() -> Self {
        let rules = HashMap::from([
            (RoleTag::DepartmentHead, ResolutionRule::DepartmentHead),
            (RoleTag::FacultyDean, ResolutionRule::FacultyDean),
            (RoleTag::DeanDeputy, ResolutionRule::RoleHolder(HolderScope::UploaderFaculty)),
            (RoleTag::Director, ResolutionRule::RoleHolder(HolderScope::Unscoped)),
            (RoleTag::DirectorDeputy, ResolutionRule::RoleHolder(HolderScope::Unscoped)),
            (RoleTag::AcademicOffice, ResolutionRule::RoleHolder(HolderScope::Unscoped)),
            (RoleTag::RegistrationOffice, ResolutionRule::RoleHolder(HolderScope::Unscoped)),
            (RoleTag::Teacher, ResolutionRule::Teacher),
        ]);
        Self { rules }
    }

    pub fn with_rule(mut self, role: RoleTag, rule: ResolutionRule) -> Self {
        self.rules.insert(role, rule);
        self
    }

    pub fn rule_for(&self, role: &RoleTag) -> Option<ResolutionRule> {
        self.rules.get(role).copied()
    }

    pub async fn resolve(
        &self,
        directory: &dyn Directory,
        role: &RoleTag,
        context: &ResolutionContext,
    ) -> Result<Option<UserId>, DirectoryError> {
        let Some(rule) = self.rule_for(role) else {
            return Ok(None);
        };

        match rule {
            ResolutionRule::DepartmentHead => match context.department_id.as_deref() {
                Some(department_id) => directory.department_head(department_id).await,
                None => Ok(None),
            },
            ResolutionRule::FacultyDean => match context.faculty_id.as_deref() {
                Some(faculty_id) => directory.faculty_dean(faculty_id).await,
                None => Ok(None),
            },
            ResolutionRule::RoleHolder(HolderScope::Unscoped) => {
                directory.first_active_with_role(role, &OrgScope::Unscoped).await
            }
            ResolutionRule::RoleHolder(HolderScope::UploaderFaculty) => {
                match context.faculty_id.as_deref() {
                    Some(faculty_id) => {
                        let scope = OrgScope::Faculty(faculty_id.to_string());
                        directory.first_active_with_role(role, &scope).await
                    }
                    None => Ok(None),
                }
            }
            ResolutionRule::Teacher => {
                if let Some((subject, group, term)) = context.document.teaching_slot() {
                    if let Some(teacher) = directory.allocated_teacher(subject, group, term).await? {
                        return Ok(Some(teacher));
                    }
                }
                match context.department_id.as_deref() {
                    Some(department_id) => {
                        let scope = OrgScope::Department(department_id.to_string());
                        directory.first_active_with_role(&RoleTag::Teacher, &scope).await
                    }
                    None => Ok(None),
                }
            }
        }
    }

    /// Resolves every role of a workflow in order.
    pub async fn resolve_all(
        &self,
        directory: &dyn Directory,
        roles: &[RoleTag],
        context: &ResolutionContext,
    ) -> Result<Vec<Option<UserId>>, DirectoryError> {
        let mut resolved = Vec::with_capacity(roles.len());
        for role in roles {
            resolved.push(self.resolve(directory, role, context).await?);
        }
        Ok(resolved)
    }
}

/// Directory held in memory, ordered by id for deterministic "first" lookups.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    users: BTreeMap<UserId, DirectoryUser>,
    department_heads: HashMap<String, UserId>,
    faculty_deans: HashMap<String, UserId>,
    allocations: HashMap<(String, String, String), UserId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: DirectoryUser) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn with_department_head(mut self, department_id: &str, head: &str) -> Self {
        self.department_heads.insert(department_id.to_string(), UserId(head.to_string()));
        self
    }

    pub fn with_faculty_dean(mut self, faculty_id: &str, dean: &str) -> Self {
        self.faculty_deans.insert(faculty_id.to_string(), UserId(dean.to_string()));
        self
    }

    pub fn with_allocation(mut self, subject: &str, group: &str, term: &str, teacher: &str) -> Self {
        self.allocations.insert(
            (subject.to_string(), group.to_string(), term.to_string()),
            UserId(teacher.to_string()),
        );
        self
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_user(&self, id: &UserId) -> Result<Option<DirectoryUser>, DirectoryError> {
        Ok(self.users.get(id).cloned())
    }

    async fn department_head(
        &self,
        department_id: &str,
    ) -> Result<Option<UserId>, DirectoryError> {
        Ok(self.department_heads.get(department_id).cloned())
    }

    async fn faculty_dean(&self, faculty_id: &str) -> Result<Option<UserId>, DirectoryError> {
        Ok(self.faculty_deans.get(faculty_id).cloned())
    }

    async fn first_active_with_role(
        &self,
        role: &RoleTag,
        scope: &OrgScope,
    ) -> Result<Option<UserId>, DirectoryError> {
        let found = self.users.values().find(|user| {
            let in_scope = match scope {
                OrgScope::Unscoped => true,
                OrgScope::Faculty(id) => user.faculty_id.as_deref() == Some(id.as_str()),
                OrgScope::Department(id) => user.department_id.as_deref() == Some(id.as_str()),
            };
            user.is_active && user.active_role.as_ref() == Some(role) && in_scope
        });
        Ok(found.map(|user| user.id.clone()))
    }

    async fn allocated_teacher(
        &self,
        subject_id: &str,
        group_id: &str,
        academic_term_id: &str,
    ) -> Result<Option<UserId>, DirectoryError> {
        let key = (subject_id.to_string(), group_id.to_string(), academic_term_id.to_string());
        Ok(self.allocations.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::directory::{DirectoryUser, UserId};
    use crate::domain::document::DocumentContext;
    use crate::domain::role::RoleTag;

    use super::{
        ApproverResolver, HolderScope, InMemoryDirectory, ResolutionContext, ResolutionRule,
    };

    fn user(id: &str, role: Option<RoleTag>, faculty: &str, department: &str) -> DirectoryUser {
        DirectoryUser {
            id: UserId(id.to_string()),
            display_name: id.to_uppercase(),
            email: None,
            faculty_id: Some(faculty.to_string()),
            department_id: Some(department.to_string()),
            active_role: role,
            is_active: true,
        }
    }

    fn context() -> ResolutionContext {
        ResolutionContext {
            department_id: Some("dep-cs".to_string()),
            faculty_id: Some("fac-eng".to_string()),
            document: DocumentContext::default(),
        }
    }

    fn id(value: &str) -> Option<UserId> {
        Some(UserId(value.to_string()))
    }

    #[tokio::test]
    async fn department_head_and_dean_come_from_org_units() {
        let directory = InMemoryDirectory::new()
            .with_department_head("dep-cs", "head-1")
            .with_faculty_dean("fac-eng", "dean-1");
        let resolver = ApproverResolver::standard();

        let head = resolver.resolve(&directory, &RoleTag::DepartmentHead, &context()).await;
        let dean = resolver.resolve(&directory, &RoleTag::FacultyDean, &context()).await;

        assert_eq!(head, Ok(id("head-1")));
        assert_eq!(dean, Ok(id("dean-1")));
    }

    #[tokio::test]
    async fn missing_department_yields_no_head() {
        let directory = InMemoryDirectory::new().with_department_head("dep-cs", "head-1");
        let resolver = ApproverResolver::standard();
        let no_department = ResolutionContext { department_id: None, ..context() };

        let head = resolver.resolve(&directory, &RoleTag::DepartmentHead, &no_department).await;
        assert_eq!(head, Ok(None));
    }

    #[tokio::test]
    async fn dean_deputy_is_scoped_to_uploader_faculty() {
        let directory = InMemoryDirectory::new()
            .with_user(user("a-deputy", Some(RoleTag::DeanDeputy), "fac-law", "dep-law"))
            .with_user(user("b-deputy", Some(RoleTag::DeanDeputy), "fac-eng", "dep-cs"));
        let resolver = ApproverResolver::standard();

        let deputy = resolver.resolve(&directory, &RoleTag::DeanDeputy, &context()).await;
        assert_eq!(deputy, Ok(id("b-deputy")));
    }

    #[tokio::test]
    async fn unscoped_roles_pick_lowest_active_id() {
        let mut inactive = user("a-director", Some(RoleTag::Director), "fac-law", "dep-law");
        inactive.is_active = false;
        let directory = InMemoryDirectory::new()
            .with_user(user("c-director", Some(RoleTag::Director), "fac-law", "dep-law"))
            .with_user(inactive)
            .with_user(user("b-director", Some(RoleTag::Director), "fac-eng", "dep-cs"));
        let resolver = ApproverResolver::standard();

        for _ in 0..3 {
            let director = resolver.resolve(&directory, &RoleTag::Director, &context()).await;
            assert_eq!(director, Ok(id("b-director")));
        }
    }

    #[tokio::test]
    async fn teacher_prefers_allocation_then_department() {
        let directory = InMemoryDirectory::new()
            .with_user(user("t-dept", Some(RoleTag::Teacher), "fac-eng", "dep-cs"))
            .with_allocation("algebra", "g-101", "2026-fall", "t-alloc");
        let resolver = ApproverResolver::standard();

        let with_slot = ResolutionContext {
            document: DocumentContext {
                subject_id: Some("algebra".to_string()),
                group_id: Some("g-101".to_string()),
                academic_term_id: Some("2026-fall".to_string()),
            },
            ..context()
        };
        let allocated = resolver.resolve(&directory, &RoleTag::Teacher, &with_slot).await;
        assert_eq!(allocated, Ok(id("t-alloc")));

        let unallocated_slot = ResolutionContext {
            document: DocumentContext {
                subject_id: Some("physics".to_string()),
                ..with_slot.document.clone()
            },
            ..context()
        };
        let fallback = resolver.resolve(&directory, &RoleTag::Teacher, &unallocated_slot).await;
        assert_eq!(fallback, Ok(id("t-dept")));

        let no_slot = resolver.resolve(&directory, &RoleTag::Teacher, &context()).await;
        assert_eq!(no_slot, Ok(id("t-dept")));
    }

    #[tokio::test]
    async fn unrecognized_tags_resolve_to_none() {
        let directory = InMemoryDirectory::new()
            .with_user(user("x", Some(RoleTag::Unrecognized("archivist".into())), "f", "d"));
        let resolver = ApproverResolver::standard();

        let resolved = resolver
            .resolve(&directory, &RoleTag::Unrecognized("archivist".to_string()), &context())
            .await;
        assert_eq!(resolved, Ok(None));
    }

    #[tokio::test]
    async fn custom_rules_extend_the_table() {
        let archivist = RoleTag::Unrecognized("archivist".to_string());
        let directory = InMemoryDirectory::new()
            .with_user(user("arch-1", Some(archivist.clone()), "fac-eng", "dep-cs"));
        let resolver = ApproverResolver::standard()
            .with_rule(archivist.clone(), ResolutionRule::RoleHolder(HolderScope::Unscoped));

        let resolved = resolver.resolve(&directory, &archivist, &context()).await;
        assert_eq!(resolved, Ok(id("arch-1")));
        assert_eq!(
            resolver.rule_for(&RoleTag::Teacher),
            Some(ResolutionRule::Teacher),
            "standard rules remain in place"
        );
    }

    #[tokio::test]
    async fn resolve_all_preserves_workflow_order() {
        let directory = InMemoryDirectory::new().with_faculty_dean("fac-eng", "dean-1");
        let resolver = ApproverResolver::standard();

        let resolved = resolver
            .resolve_all(
                &directory,
                &[RoleTag::DepartmentHead, RoleTag::FacultyDean],
                &context(),
            )
            .await
            .expect("in-memory directory never fails");
        assert_eq!(resolved, vec![None, id("dean-1")]);
    }
}
