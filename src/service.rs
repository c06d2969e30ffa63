use chrono::{Duration, NaiveDate};

use crate::auth::{AuthError, AuthProvider};
use crate::policy::{self, Action, Role};
use crate::store::{
    AttendanceRow, MarkStatus, NewStudent, Period, StatusTotals, Store, StoreError, Student,
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const CREDENTIAL_TTL_DAYS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Forbidden,
    NotFound,
    Conflict,
    InvalidCredential,
    Unavailable,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidCredential => "invalid_credential",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> ServiceError {
        ServiceError {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> ServiceError {
        match e {
            StoreError::Duplicate { what } => {
                ServiceError::new(ErrorKind::Conflict, format!("{} already exists", what))
            }
            StoreError::MissingReference { what } => {
                ServiceError::new(ErrorKind::NotFound, format!("{} not found", what))
            }
            StoreError::Unavailable(msg) => ServiceError::new(ErrorKind::Unavailable, msg),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> ServiceError {
        match e {
            AuthError::Invalid => {
                ServiceError::new(ErrorKind::InvalidCredential, "invalid credential")
            }
            AuthError::Provider(msg) => ServiceError::new(ErrorKind::Unavailable, msg),
        }
    }
}

/// A verified caller identity. The role is fixed for the credential's
/// lifetime; later role changes in the store only apply to credentials
/// issued afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: Role,
}

/// The attendance core. Every state-changing operation checks policy
/// before touching the store.
pub struct AttendanceService<S, A> {
    store: S,
    auth: A,
}

impl<S: Store, A: AuthProvider> AttendanceService<S, A> {
    pub fn new(store: S, auth: A) -> AttendanceService<S, A> {
        AttendanceService { store, auth }
    }

    /// Self-service registration. Accounts always start as teachers;
    /// elevation happens out of band, directly against the store.
    pub fn register_user(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::new(
                ErrorKind::InvalidInput,
                "email and password are required",
            ));
        }
        // Character count, not byte count.
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::new(
                ErrorKind::InvalidInput,
                "password must be at least 6 characters",
            ));
        }
        let hashed = self.auth.hash_password(password)?;
        let user_id = self
            .store
            .insert_user(email, &hashed, Role::Teacher.as_str())?;
        Ok(user_id)
    }

    /// Exchange email and password for a signed credential. An unknown
    /// email and a wrong password report differently, matching the
    /// established client contract.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        let email = email.trim();
        let user = self
            .store
            .find_user_by_email(email)?
            .ok_or_else(|| ServiceError::new(ErrorKind::NotFound, "user not found"))?;
        if !self.auth.verify_password(password, &user.password_hash) {
            return Err(ServiceError::new(
                ErrorKind::InvalidCredential,
                "wrong password",
            ));
        }
        // A stored role outside the closed set never yields a credential.
        let role = Role::parse(&user.role).ok_or_else(|| {
            ServiceError::new(ErrorKind::InvalidCredential, "account role is not recognized")
        })?;
        let token = self
            .auth
            .issue(&user.id, role.as_str(), Duration::days(CREDENTIAL_TTL_DAYS))?;
        Ok(token)
    }

    /// Resolve a credential into a session. Unknown roles fail closed.
    pub fn identify(&self, credential: &str) -> Result<Session, ServiceError> {
        let claims = self.auth.verify_credential(credential)?;
        let role = Role::parse(&claims.role).ok_or_else(|| {
            ServiceError::new(
                ErrorKind::InvalidCredential,
                "credential role is not recognized",
            )
        })?;
        Ok(Session {
            user_id: claims.user_id,
            role,
        })
    }

    pub fn current_user(&self, session: &Session) -> Result<UserProfile, ServiceError> {
        let user = self
            .store
            .find_user_by_id(&session.user_id)?
            .ok_or_else(|| ServiceError::new(ErrorKind::NotFound, "user not found"))?;
        Ok(UserProfile {
            id: user.id,
            email: user.email,
            role: session.role,
        })
    }

    /// Re-check the caller's password against the stored digest without
    /// issuing a new credential.
    pub fn reverify(&self, session: &Session, password: &str) -> Result<(), ServiceError> {
        if password.is_empty() {
            return Err(ServiceError::new(
                ErrorKind::InvalidInput,
                "password is required",
            ));
        }
        let user = self
            .store
            .find_user_by_id(&session.user_id)?
            .ok_or_else(|| ServiceError::new(ErrorKind::NotFound, "user not found"))?;
        if !self.auth.verify_password(password, &user.password_hash) {
            return Err(ServiceError::new(
                ErrorKind::InvalidCredential,
                "incorrect password",
            ));
        }
        Ok(())
    }

    pub fn list_students(&self, session: &Session) -> Result<Vec<Student>, ServiceError> {
        self.require(session, Action::ViewStudents)?;
        Ok(self.store.list_students()?)
    }

    pub fn create_student(
        &self,
        session: &Session,
        student: &NewStudent,
    ) -> Result<String, ServiceError> {
        self.require(session, Action::CreateStudent)?;
        let roll = student.roll.trim();
        let name = student.name.trim();
        if roll.is_empty() || name.is_empty() {
            return Err(ServiceError::new(
                ErrorKind::InvalidInput,
                "roll and name are required",
            ));
        }
        let normalized = NewStudent {
            roll: roll.to_string(),
            name: name.to_string(),
            class: student.class.trim().to_string(),
            section: student.section.trim().to_string(),
            mobile: student
                .mobile
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        };
        Ok(self.store.insert_student(&normalized)?)
    }

    /// Deleting an unknown student succeeds. The end state is the same
    /// either way.
    pub fn delete_student(&self, session: &Session, student_id: &str) -> Result<(), ServiceError> {
        self.require(session, Action::DeleteStudent)?;
        self.store.delete_student(student_id)?;
        Ok(())
    }

    pub fn mark_attendance(
        &self,
        session: &Session,
        student_id: &str,
        date: NaiveDate,
        present: bool,
    ) -> Result<(), ServiceError> {
        self.require(session, Action::MarkAttendance)?;
        let student_id = student_id.trim();
        if student_id.is_empty() {
            return Err(ServiceError::new(
                ErrorKind::InvalidInput,
                "studentId is required",
            ));
        }
        if !self.store.student_exists(student_id)? {
            return Err(ServiceError::new(ErrorKind::NotFound, "student not found"));
        }
        self.store
            .upsert_attendance(student_id, date, MarkStatus::from_present(present))?;
        Ok(())
    }

    pub fn list_attendance(
        &self,
        session: &Session,
        period: Period,
    ) -> Result<Vec<AttendanceRow>, ServiceError> {
        self.require(session, Action::ViewAttendance)?;
        Ok(self.store.query_attendance(period)?)
    }

    pub fn attendance_status_totals(
        &self,
        session: &Session,
        period: Period,
    ) -> Result<StatusTotals, ServiceError> {
        self.require(session, Action::ViewAttendance)?;
        Ok(self.store.count_attendance_by_status(period)?)
    }

    fn require(&self, session: &Session, action: Action) -> Result<(), ServiceError> {
        if policy::is_allowed(session.role, action) {
            Ok(())
        } else {
            Err(ServiceError::new(ErrorKind::Forbidden, "insufficient role"))
        }
    }
}
