use crate::error::{Error, Result};
use crate::model::{Permission, Project, UserContext};

/// Permission gate: pure checks over the in-memory project record. A global
/// admin bypasses the per-project map; otherwise each capability is checked
/// independently, `write` does not imply `read`.
fn has_permission(project: &Project, user: &UserContext, permission: Permission) -> bool {
    if user.admin {
        return true;
    }
    project
        .permissions
        .get(&user.user_id)
        .map(|granted| granted.contains(&permission))
        .unwrap_or(false)
}

pub fn can_read(project: &Project, user: &UserContext) -> bool {
    has_permission(project, user, Permission::Read)
}

pub fn can_write(project: &Project, user: &UserContext) -> bool {
    has_permission(project, user, Permission::Write)
}

pub fn ensure_read(project: &Project, user: &UserContext) -> Result<()> {
    if can_read(project, user) {
        Ok(())
    } else {
        Err(Error::permission(format!(
            "user '{}' does not have read access to project '{}'",
            user.user_id, project.id
        )))
    }
}

pub fn ensure_write(project: &Project, user: &UserContext) -> Result<()> {
    if can_write(project, user) {
        Ok(())
    } else {
        Err(Error::permission(format!(
            "user '{}' does not have write access to project '{}'",
            user.user_id, project.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project::new("org:proj")
            .with_permission("reader", &[Permission::Read])
            .with_permission("writer", &[Permission::Write])
    }

    #[test]
    fn capabilities_are_independent() {
        let project = project();
        assert!(can_read(&project, &UserContext::new("reader")));
        assert!(!can_write(&project, &UserContext::new("reader")));
        // write does not imply read
        assert!(can_write(&project, &UserContext::new("writer")));
        assert!(!can_read(&project, &UserContext::new("writer")));
        assert!(!can_read(&project, &UserContext::new("stranger")));
    }

    #[test]
    fn global_admin_bypasses_project_map() {
        let project = project();
        let admin = UserContext::admin("root");
        assert!(can_read(&project, &admin));
        assert!(can_write(&project, &admin));
    }

    #[test]
    fn ensure_write_names_user_and_project() {
        let err = ensure_write(&project(), &UserContext::new("reader")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("reader"));
        assert!(message.contains("org:proj"));
    }
}
