//! Explicit session context for the portal commands.
//!
//! The browser pages kept the current user, role and selected child in
//! local storage and read them wherever needed. Here the session is a plain
//! value built once from CLI flags and passed to whatever needs it.

use thiserror::Error;

use crate::models::ChildSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Student,
    Parent,
    Admin,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no user id in session; pass --user-id or set PORTAL_USER_ID")]
    MissingUser,
    #[error("a student may only view their own records (requested {0})")]
    AccessDenied(String),
    #[error("student {0} is not linked to this parent")]
    NotLinked(String),
    #[error("no children are linked to parent {0}")]
    NoChildren(String),
    #[error("admin sessions must name a student with --student")]
    StudentRequired,
    #[error("this operation requires an admin session")]
    AdminOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
    pub selected_child: Option<String>,
}

impl Session {
    pub fn new(
        user_id: Option<String>,
        role: Role,
        selected_child: Option<String>,
    ) -> Result<Self, SessionError> {
        let user_id = user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(SessionError::MissingUser)?;

        Ok(Self {
            user_id,
            role,
            selected_child: selected_child.filter(|id| !id.trim().is_empty()),
        })
    }

    pub fn require_admin(&self) -> Result<(), SessionError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(SessionError::AdminOnly),
        }
    }

    /// Profile edits: admins edit anyone, students only themselves.
    pub fn can_edit_student(&self, student_id: &str) -> Result<(), SessionError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Student if student_id == self.user_id => Ok(()),
            Role::Student => Err(SessionError::AccessDenied(student_id.to_string())),
            Role::Parent => Err(SessionError::AdminOnly),
        }
    }

    /// Which student this session is looking at. `children` only matters for
    /// parent sessions.
    pub fn target_student(
        &self,
        explicit: Option<&str>,
        children: &[ChildSummary],
    ) -> Result<String, SessionError> {
        match self.role {
            Role::Student => match explicit {
                Some(id) if id != self.user_id => Err(SessionError::AccessDenied(id.to_string())),
                _ => Ok(self.user_id.clone()),
            },
            Role::Admin => explicit
                .map(str::to_string)
                .ok_or(SessionError::StudentRequired),
            Role::Parent => {
                let first = children
                    .first()
                    .ok_or_else(|| SessionError::NoChildren(self.user_id.clone()))?;
                match explicit.or(self.selected_child.as_deref()) {
                    Some(id) if children.iter().any(|child| child.id == id) => Ok(id.to_string()),
                    Some(id) => Err(SessionError::NotLinked(id.to_string())),
                    None => Ok(first.id.clone()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: &str) -> ChildSummary {
        ChildSummary {
            id: id.to_string(),
            first_name: Some("Mira".to_string()),
            last_name: None,
            email: None,
        }
    }

    #[test]
    fn session_requires_user_id() {
        assert_eq!(
            Session::new(Some("  ".to_string()), Role::Student, None),
            Err(SessionError::MissingUser)
        );
    }

    #[test]
    fn student_sees_only_self() {
        let session = Session::new(Some("S-1".to_string()), Role::Student, None).unwrap();
        assert_eq!(session.target_student(None, &[]).unwrap(), "S-1");
        assert_eq!(session.target_student(Some("S-1"), &[]).unwrap(), "S-1");
        assert_eq!(
            session.target_student(Some("S-2"), &[]),
            Err(SessionError::AccessDenied("S-2".to_string()))
        );
    }

    #[test]
    fn parent_defaults_to_first_child() {
        let session = Session::new(Some("P-1".to_string()), Role::Parent, None).unwrap();
        let children = vec![child("S-7"), child("S-8")];
        assert_eq!(session.target_student(None, &children).unwrap(), "S-7");
        assert_eq!(session.target_student(Some("S-8"), &children).unwrap(), "S-8");
    }

    #[test]
    fn parent_selection_must_be_linked() {
        let session = Session::new(
            Some("P-1".to_string()),
            Role::Parent,
            Some("S-9".to_string()),
        )
        .unwrap();
        assert_eq!(
            session.target_student(None, &[child("S-7")]),
            Err(SessionError::NotLinked("S-9".to_string()))
        );
        assert_eq!(
            session.target_student(None, &[]),
            Err(SessionError::NoChildren("P-1".to_string()))
        );
    }

    #[test]
    fn admin_must_name_student() {
        let session = Session::new(Some("admin".to_string()), Role::Admin, None).unwrap();
        assert_eq!(
            session.target_student(None, &[]),
            Err(SessionError::StudentRequired)
        );
        assert_eq!(session.target_student(Some("S-3"), &[]).unwrap(), "S-3");
        assert!(session.require_admin().is_ok());
    }

    #[test]
    fn writes_are_admin_only() {
        let session = Session::new(Some("P-1".to_string()), Role::Parent, None).unwrap();
        assert_eq!(session.require_admin(), Err(SessionError::AdminOnly));
    }

    #[test]
    fn students_edit_only_their_own_profile() {
        let student = Session::new(Some("S-1".to_string()), Role::Student, None).unwrap();
        assert!(student.can_edit_student("S-1").is_ok());
        assert_eq!(
            student.can_edit_student("S-2"),
            Err(SessionError::AccessDenied("S-2".to_string()))
        );

        let parent = Session::new(Some("P-1".to_string()), Role::Parent, None).unwrap();
        assert_eq!(parent.can_edit_student("S-1"), Err(SessionError::AdminOnly));

        let admin = Session::new(Some("admin".to_string()), Role::Admin, None).unwrap();
        assert!(admin.can_edit_student("S-2").is_ok());
    }
}
