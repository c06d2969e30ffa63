use chrono::Datelike;
use serde::Serialize;
use std::collections::HashMap;

use crate::store::{AttendanceMark, MarkStatus};

/// In-memory rollup of one period's marks: student id -> day-of-month ->
/// recorded status. A day with no entry is "unmarked", a third state that
/// is never folded into absent.
///
/// Day-of-month runs 1..=31 regardless of the real month length; days past
/// the end of a short month simply never carry a mark.
#[derive(Debug, Clone, Default)]
pub struct Rollup {
    by_student: HashMap<String, HashMap<u32, MarkStatus>>,
}

impl Rollup {
    pub fn status(&self, student_id: &str, day: u32) -> Option<MarkStatus> {
        self.by_student
            .get(student_id)
            .and_then(|days| days.get(&day))
            .copied()
    }
}

/// Group marks by student, then by day-of-month. The store guarantees one
/// mark per (student, date), so collisions are not a concern here.
pub fn build_rollup(marks: &[AttendanceMark]) -> Rollup {
    let mut by_student: HashMap<String, HashMap<u32, MarkStatus>> = HashMap::new();
    for mark in marks {
        by_student
            .entry(mark.student_id.clone())
            .or_default()
            .insert(mark.date.day(), mark.status);
    }
    Rollup { by_student }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub present_count: usize,
    pub absent_count: usize,
    pub present_percent: u32,
    pub absent_percent: u32,
}

/// Present/absent totals for the given students over days 1..=window_days.
/// Percentages are taken over marked cells only; with zero marked cells
/// both percentages are 0 rather than a division error.
pub fn summarize(rollup: &Rollup, student_ids: &[String], window_days: u32) -> WindowSummary {
    let mut present_count = 0usize;
    let mut absent_count = 0usize;

    for sid in student_ids {
        for day in 1..=window_days {
            match rollup.status(sid, day) {
                Some(MarkStatus::Present) => present_count += 1,
                Some(MarkStatus::Absent) => absent_count += 1,
                None => {}
            }
        }
    }

    let marked = present_count + absent_count;
    WindowSummary {
        present_count,
        absent_count,
        present_percent: percent_of(present_count, marked),
        absent_percent: percent_of(absent_count, marked),
    }
}

fn percent_of(count: usize, marked: usize) -> u32 {
    if marked == 0 {
        return 0;
    }
    ((100.0 * count as f64) / (marked as f64)).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySeries {
    pub present: Vec<usize>,
    pub absent: Vec<usize>,
}

/// Per-day counts across the given students, for charting. Both vectors
/// are exactly window_days long; index 0 is day 1. Days beyond the real
/// month length stay at zero.
pub fn daily_series(rollup: &Rollup, student_ids: &[String], window_days: u32) -> DailySeries {
    let mut present = vec![0usize; window_days as usize];
    let mut absent = vec![0usize; window_days as usize];

    for sid in student_ids {
        for day in 1..=window_days {
            match rollup.status(sid, day) {
                Some(MarkStatus::Present) => present[(day - 1) as usize] += 1,
                Some(MarkStatus::Absent) => absent[(day - 1) as usize] += 1,
                None => {}
            }
        }
    }

    DailySeries { present, absent }
}
