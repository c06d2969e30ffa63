use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// Attendance status for a single student on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkStatus {
    Present,
    Absent,
}

impl MarkStatus {
    pub fn from_present(present: bool) -> MarkStatus {
        if present {
            MarkStatus::Present
        } else {
            MarkStatus::Absent
        }
    }

    pub fn parse(raw: &str) -> Option<MarkStatus> {
        match raw {
            "present" => Some(MarkStatus::Present),
            "absent" => Some(MarkStatus::Absent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkStatus::Present => "present",
            MarkStatus::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    /// Stored as free text; parsed into a role at the session boundary.
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub roll: String,
    pub name: String,
    pub class: String,
    pub section: String,
    pub mobile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: String,
    pub roll: String,
    pub name: String,
    pub class: String,
    pub section: String,
    pub mobile: Option<String>,
}

/// One persisted mark, keyed by (student, day).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceMark {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: MarkStatus,
}

/// A mark joined with the student it belongs to, as returned by period
/// queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRow {
    pub student_id: String,
    pub roll: String,
    pub name: String,
    pub class: String,
    pub section: String,
    pub date: NaiveDate,
    pub status: MarkStatus,
}

impl AttendanceRow {
    pub fn mark(&self) -> AttendanceMark {
        AttendanceMark {
            student_id: self.student_id.clone(),
            date: self.date,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub present: i64,
    pub absent: i64,
}

/// A validated calendar month, held as its first and last day so callers
/// never recompute them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    start: NaiveDate,
    last: NaiveDate,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Period> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return None;
        }
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
        Some(Period { start, last })
    }

    /// First day of the month.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the month. Both bounds stay inside the month so their
    /// date strings keep four-digit years: chrono renders the day after
    /// 9999-12-31 as "+10000-01-01", which sorts before "9999-..." as TEXT.
    pub fn last(&self) -> NaiveDate {
        self.last
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness rule was violated.
    Duplicate { what: &'static str },
    /// A referenced row does not exist.
    MissingReference { what: &'static str },
    /// The backing store failed.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Duplicate { what } => write!(f, "duplicate {}", what),
            StoreError::MissingReference { what } => write!(f, "{} does not exist", what),
            StoreError::Unavailable(msg) => write!(f, "storage failure: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence capability used by the service core. Implementations own
/// ordering and uniqueness; the core owns policy and validation.
pub trait Store {
    fn insert_user(&self, email: &str, password_hash: &str, role: &str)
        -> Result<String, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    fn insert_student(&self, student: &NewStudent) -> Result<String, StoreError>;
    fn delete_student(&self, student_id: &str) -> Result<(), StoreError>;
    fn list_students(&self) -> Result<Vec<Student>, StoreError>;
    fn student_exists(&self, student_id: &str) -> Result<bool, StoreError>;

    fn upsert_attendance(
        &self,
        student_id: &str,
        date: NaiveDate,
        status: MarkStatus,
    ) -> Result<(), StoreError>;
    fn query_attendance(&self, period: Period) -> Result<Vec<AttendanceRow>, StoreError>;
    fn count_attendance_by_status(&self, period: Period) -> Result<StatusTotals, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> SqliteStore {
        SqliteStore { conn }
    }
}

fn read_error(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Classify a write failure using SQLite's extended result codes so
/// constraint violations surface as typed errors instead of opaque ones.
fn write_error(
    e: rusqlite::Error,
    duplicate_what: &'static str,
    missing_what: &'static str,
) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return StoreError::Duplicate {
                what: duplicate_what,
            };
        }
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
            return StoreError::MissingReference { what: missing_what };
        }
    }
    StoreError::Unavailable(e.to_string())
}

impl Store for SqliteStore {
    fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO users(id, email, password_hash, role) VALUES(?, ?, ?, ?)",
                (&id, email, password_hash, role),
            )
            .map_err(|e| write_error(e, "email", "user"))?;
        Ok(id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, email, password_hash, role FROM users WHERE email = ?",
                [email],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password_hash: row.get(2)?,
                        role: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(read_error)
    }

    fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, email, password_hash, role FROM users WHERE id = ?",
                [id],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password_hash: row.get(2)?,
                        role: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(read_error)
    }

    fn insert_student(&self, student: &NewStudent) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO students(id, roll, name, class, section, mobile)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &student.roll,
                    &student.name,
                    &student.class,
                    &student.section,
                    student.mobile.as_deref(),
                ),
            )
            .map_err(|e| write_error(e, "roll", "student"))?;
        Ok(id)
    }

    fn delete_student(&self, student_id: &str) -> Result<(), StoreError> {
        // Marks go with the student via ON DELETE CASCADE. Deleting an
        // unknown id is a no-op.
        self.conn
            .execute("DELETE FROM students WHERE id = ?", [student_id])
            .map_err(read_error)?;
        Ok(())
    }

    fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, roll, name, class, section, mobile
                 FROM students ORDER BY roll ASC",
            )
            .map_err(read_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Student {
                    id: row.get(0)?,
                    roll: row.get(1)?,
                    name: row.get(2)?,
                    class: row.get(3)?,
                    section: row.get(4)?,
                    mobile: row.get(5)?,
                })
            })
            .map_err(read_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;
        Ok(rows)
    }

    fn student_exists(&self, student_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM students WHERE id = ?",
                [student_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(read_error)?;
        Ok(found.is_some())
    }

    fn upsert_attendance(
        &self,
        student_id: &str,
        date: NaiveDate,
        status: MarkStatus,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO attendance(student_id, date, status) VALUES(?, ?, ?)
                 ON CONFLICT(student_id, date) DO UPDATE SET status = excluded.status",
                (student_id, date.to_string(), status.as_str()),
            )
            .map_err(|e| write_error(e, "attendance mark", "student"))?;
        Ok(())
    }

    fn query_attendance(&self, period: Period) -> Result<Vec<AttendanceRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT a.student_id, s.roll, s.name, s.class, s.section, a.date, a.status
                 FROM attendance a
                 JOIN students s ON s.id = a.student_id
                 WHERE a.date >= ?1 AND a.date <= ?2
                 ORDER BY a.date ASC, s.roll ASC",
            )
            .map_err(read_error)?;
        let raw = stmt
            .query_map(
                (period.start().to_string(), period.last().to_string()),
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .map_err(read_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;

        let mut rows = Vec::with_capacity(raw.len());
        for (student_id, roll, name, class, section, date_raw, status_raw) in raw {
            let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d").map_err(|_| {
                StoreError::Unavailable(format!("malformed date in attendance row: {}", date_raw))
            })?;
            let status = MarkStatus::parse(&status_raw).ok_or_else(|| {
                StoreError::Unavailable(format!("unknown status in attendance row: {}", status_raw))
            })?;
            rows.push(AttendanceRow {
                student_id,
                roll,
                name,
                class,
                section,
                date,
                status,
            });
        }
        Ok(rows)
    }

    fn count_attendance_by_status(&self, period: Period) -> Result<StatusTotals, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT status, COUNT(*) FROM attendance
                 WHERE date >= ?1 AND date <= ?2
                 GROUP BY status",
            )
            .map_err(read_error)?;
        let raw = stmt
            .query_map(
                (period.start().to_string(), period.last().to_string()),
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .map_err(read_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;

        let mut totals = StatusTotals::default();
        for (status_raw, count) in raw {
            match MarkStatus::parse(&status_raw) {
                Some(MarkStatus::Present) => totals.present = count,
                Some(MarkStatus::Absent) => totals.absent = count,
                None => {
                    return Err(StoreError::Unavailable(format!(
                        "unknown status in attendance rows: {}",
                        status_raw
                    )))
                }
            }
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteStore {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        crate::db::apply_schema(&conn).expect("apply schema");
        SqliteStore::new(conn)
    }

    fn student(roll: &str, name: &str) -> NewStudent {
        NewStudent {
            roll: roll.to_string(),
            name: name.to_string(),
            class: "10".to_string(),
            section: "A".to_string(),
            mobile: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn period(y: i32, m: u32) -> Period {
        Period::new(y, m).expect("valid period")
    }

    #[test]
    fn period_validates_month_and_year() {
        assert!(Period::new(2024, 0).is_none());
        assert!(Period::new(2024, 13).is_none());
        assert!(Period::new(0, 5).is_none());
        assert!(Period::new(10_000, 5).is_none());

        let p = period(2024, 12);
        assert_eq!(p.start(), date(2024, 12, 1));
        assert_eq!(p.last(), date(2024, 12, 31));
    }

    #[test]
    fn december_of_the_last_supported_year_is_queryable() {
        let store = test_store();
        let sid = store.insert_student(&student("1", "Asha")).expect("insert");
        store
            .upsert_attendance(&sid, date(9999, 12, 15), MarkStatus::Present)
            .expect("mark");

        let rows = store.query_attendance(period(9999, 12)).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, date(9999, 12, 15));

        let totals = store
            .count_attendance_by_status(period(9999, 12))
            .expect("totals");
        assert_eq!(
            totals,
            StatusTotals {
                present: 1,
                absent: 0
            }
        );
    }

    #[test]
    fn duplicate_email_is_reported_as_duplicate() {
        let store = test_store();
        store
            .insert_user("t@school.example", "hash-a", "teacher")
            .expect("first insert");
        let err = store
            .insert_user("t@school.example", "hash-b", "teacher")
            .expect_err("second insert must fail");
        assert_eq!(err, StoreError::Duplicate { what: "email" });
    }

    #[test]
    fn duplicate_roll_is_reported_as_duplicate() {
        let store = test_store();
        store.insert_student(&student("7", "Asha")).expect("insert");
        let err = store
            .insert_student(&student("7", "Binod"))
            .expect_err("duplicate roll must fail");
        assert_eq!(err, StoreError::Duplicate { what: "roll" });

        let names: Vec<String> = store
            .list_students()
            .expect("list")
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Asha".to_string()]);
    }

    #[test]
    fn upsert_keeps_one_row_per_student_day() {
        let store = test_store();
        let sid = store.insert_student(&student("1", "Asha")).expect("insert");

        let day = date(2024, 3, 5);
        store
            .upsert_attendance(&sid, day, MarkStatus::Present)
            .expect("first mark");
        store
            .upsert_attendance(&sid, day, MarkStatus::Absent)
            .expect("second mark");

        let rows = store.query_attendance(period(2024, 3)).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, MarkStatus::Absent);
        assert_eq!(rows[0].date, day);
    }

    #[test]
    fn marking_unknown_student_is_missing_reference() {
        let store = test_store();
        let err = store
            .upsert_attendance("no-such-id", date(2024, 3, 5), MarkStatus::Present)
            .expect_err("fk must reject");
        assert_eq!(err, StoreError::MissingReference { what: "student" });
    }

    #[test]
    fn deleting_student_cascades_marks_and_is_idempotent() {
        let store = test_store();
        let sid = store.insert_student(&student("1", "Asha")).expect("insert");
        store
            .upsert_attendance(&sid, date(2024, 3, 5), MarkStatus::Present)
            .expect("mark");

        store.delete_student(&sid).expect("delete");
        store.delete_student(&sid).expect("repeat delete is a no-op");

        assert!(store.list_students().expect("list").is_empty());
        assert!(store
            .query_attendance(period(2024, 3))
            .expect("query")
            .is_empty());
        assert!(!store.student_exists(&sid).expect("exists"));
    }

    #[test]
    fn query_attendance_is_bounded_to_the_period() {
        let store = test_store();
        let sid = store.insert_student(&student("1", "Asha")).expect("insert");

        store
            .upsert_attendance(&sid, date(2024, 2, 29), MarkStatus::Present)
            .expect("feb mark");
        store
            .upsert_attendance(&sid, date(2024, 3, 1), MarkStatus::Absent)
            .expect("mar mark");
        store
            .upsert_attendance(&sid, date(2024, 4, 1), MarkStatus::Present)
            .expect("apr mark");

        let rows = store.query_attendance(period(2024, 3)).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, date(2024, 3, 1));
        assert_eq!(rows[0].roll, "1");
        assert_eq!(rows[0].name, "Asha");
    }

    #[test]
    fn query_attendance_orders_by_date_then_roll() {
        let store = test_store();
        let a = store.insert_student(&student("2", "Binod")).expect("insert");
        let b = store.insert_student(&student("1", "Asha")).expect("insert");

        store
            .upsert_attendance(&a, date(2024, 3, 5), MarkStatus::Present)
            .expect("mark");
        store
            .upsert_attendance(&b, date(2024, 3, 5), MarkStatus::Present)
            .expect("mark");
        store
            .upsert_attendance(&a, date(2024, 3, 4), MarkStatus::Absent)
            .expect("mark");

        let rows = store.query_attendance(period(2024, 3)).expect("query");
        let keys: Vec<(String, String)> = rows
            .into_iter()
            .map(|r| (r.date.to_string(), r.roll))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-03-04".to_string(), "2".to_string()),
                ("2024-03-05".to_string(), "1".to_string()),
                ("2024-03-05".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn list_students_is_ordered_by_roll() {
        let store = test_store();
        store.insert_student(&student("9", "Asha")).expect("insert");
        store
            .insert_student(&student("10", "Binod"))
            .expect("insert");
        store
            .insert_student(&student("12", "Chitra"))
            .expect("insert");

        let rolls: Vec<String> = store
            .list_students()
            .expect("list")
            .into_iter()
            .map(|s| s.roll)
            .collect();
        // TEXT ordering, same as the roster listing contract.
        assert_eq!(
            rolls,
            vec!["10".to_string(), "12".to_string(), "9".to_string()]
        );
    }

    #[test]
    fn status_totals_count_within_the_period() {
        let store = test_store();
        let a = store.insert_student(&student("1", "Asha")).expect("insert");
        let b = store.insert_student(&student("2", "Binod")).expect("insert");

        store
            .upsert_attendance(&a, date(2024, 3, 4), MarkStatus::Present)
            .expect("mark");
        store
            .upsert_attendance(&a, date(2024, 3, 5), MarkStatus::Absent)
            .expect("mark");
        store
            .upsert_attendance(&b, date(2024, 3, 4), MarkStatus::Present)
            .expect("mark");
        store
            .upsert_attendance(&b, date(2024, 4, 4), MarkStatus::Absent)
            .expect("apr mark");

        let totals = store
            .count_attendance_by_status(period(2024, 3))
            .expect("totals");
        assert_eq!(
            totals,
            StatusTotals {
                present: 2,
                absent: 1
            }
        );
    }

    #[test]
    fn user_lookup_round_trips() {
        let store = test_store();
        let id = store
            .insert_user("t@school.example", "hash-a", "teacher")
            .expect("insert");

        let by_email = store
            .find_user_by_email("t@school.example")
            .expect("lookup")
            .expect("present");
        assert_eq!(by_email.id, id);
        assert_eq!(by_email.role, "teacher");

        let by_id = store.find_user_by_id(&id).expect("lookup").expect("present");
        assert_eq!(by_id.email, "t@school.example");

        assert!(store
            .find_user_by_email("missing@school.example")
            .expect("lookup")
            .is_none());
    }
}
