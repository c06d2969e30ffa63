/// Role carried by a session. Parsed from the stored string exactly once,
/// at the identity boundary; downstream code only ever sees the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Hod,
    Teacher,
}

impl Role {
    /// Case-insensitive parse; anything unrecognized is `None` and the
    /// caller must fail closed.
    pub fn parse(raw: &str) -> Option<Role> {
        let t = raw.trim();
        if t.eq_ignore_ascii_case("hod") {
            Some(Role::Hod)
        } else if t.eq_ignore_ascii_case("teacher") {
            Some(Role::Teacher)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hod => "hod",
            Role::Teacher => "teacher",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewStudents,
    CreateStudent,
    DeleteStudent,
    MarkAttendance,
    ViewAttendance,
}

/// Pure permission predicate. HOD can do everything; a teacher can view
/// and mark but never change the roster.
pub fn is_allowed(role: Role, action: Action) -> bool {
    match (role, action) {
        (Role::Hod, _) => true,
        (
            Role::Teacher,
            Action::ViewStudents | Action::MarkAttendance | Action::ViewAttendance,
        ) => true,
        (Role::Teacher, Action::CreateStudent | Action::DeleteStudent) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hod_is_allowed_every_action() {
        for action in [
            Action::ViewStudents,
            Action::CreateStudent,
            Action::DeleteStudent,
            Action::MarkAttendance,
            Action::ViewAttendance,
        ] {
            assert!(is_allowed(Role::Hod, action), "{:?}", action);
        }
    }

    #[test]
    fn teacher_cannot_touch_roster() {
        assert!(!is_allowed(Role::Teacher, Action::CreateStudent));
        assert!(!is_allowed(Role::Teacher, Action::DeleteStudent));
    }

    #[test]
    fn teacher_can_view_and_mark() {
        assert!(is_allowed(Role::Teacher, Action::ViewStudents));
        assert!(is_allowed(Role::Teacher, Action::MarkAttendance));
        assert!(is_allowed(Role::Teacher, Action::ViewAttendance));
    }

    #[test]
    fn parse_accepts_known_roles_any_case() {
        assert_eq!(Role::parse("hod"), Some(Role::Hod));
        assert_eq!(Role::parse("HOD"), Some(Role::Hod));
        assert_eq!(Role::parse(" Teacher "), Some(Role::Teacher));
    }

    #[test]
    fn parse_rejects_unknown_roles() {
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse("principal"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn role_round_trips_through_as_str() {
        assert_eq!(Role::parse(Role::Hod.as_str()), Some(Role::Hod));
        assert_eq!(Role::parse(Role::Teacher.as_str()), Some(Role::Teacher));
    }
}
