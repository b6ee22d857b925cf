use crate::error::{GradebookError, Result};
use crate::model::{Group, Student};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const TOP_STUDENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStats {
    pub grades_count: usize,
    pub avg: f64,
    pub min: i64,
    pub max: i64,
    pub median: f64,
}

impl GradeStats {
    /// `None` for an empty set; there is no average of nothing.
    pub fn from_grades(values: &[i64]) -> Option<GradeStats> {
        let min = *values.iter().min()?;
        let max = *values.iter().max()?;
        Some(GradeStats {
            grades_count: values.len(),
            avg: average(values)?,
            min,
            max,
            median: compute_median(values),
        })
    }
}

pub fn compute_median(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (i128::from(sorted[(n / 2) - 1]) + i128::from(sorted[n / 2])) as f64 / 2.0
    }
}

/// Sums in `i128`, so any number of `i64` grades fits.
pub fn average(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: i128 = values.iter().map(|v| i128::from(*v)).sum();
    Some(sum as f64 / values.len() as f64)
}

fn grades_by_subject<'a, I>(students: I) -> BTreeMap<String, Vec<i64>>
where
    I: IntoIterator<Item = &'a Student>,
{
    let mut out: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for student in students {
        for g in student.grades.values() {
            out.entry(g.subject.clone()).or_default().push(g.grade);
        }
    }
    out
}

fn stats_per_subject(by_subject: BTreeMap<String, Vec<i64>>) -> BTreeMap<String, GradeStats> {
    by_subject
        .into_iter()
        .filter_map(|(subject, grades)| GradeStats::from_grades(&grades).map(|s| (subject, s)))
        .collect()
}

pub fn student_total_stats(student: &Student) -> Result<GradeStats> {
    GradeStats::from_grades(&student.grade_values()).ok_or_else(|| {
        GradebookError::PreconditionFailed(format!(
            "student #{} has no grades yet, check students/{}/grades",
            student.student_id, student.student_id
        ))
    })
}

pub fn student_stats_by_subject(student: &Student) -> BTreeMap<String, GradeStats> {
    stats_per_subject(grades_by_subject([student]))
}

/// Per-subject statistics over every member's grades pooled together.
pub fn group_stats_by_subject(members: &[&Student]) -> BTreeMap<String, GradeStats> {
    stats_per_subject(grades_by_subject(members.iter().copied()))
}

#[derive(Debug, Clone, Copy)]
pub struct RankedStudent<'a> {
    pub student: &'a Student,
    pub avg_grade: Option<f64>,
}

/// Best members by total average, highest first. Equal averages keep
/// membership order; members without grades come last.
pub fn top_three_students<'a>(members: &[&'a Student]) -> Vec<RankedStudent<'a>> {
    let mut ranked: Vec<RankedStudent<'a>> = members
        .iter()
        .copied()
        .map(|s| RankedStudent {
            student: s,
            avg_grade: average(&s.grade_values()),
        })
        .collect();
    ranked.sort_by(|a, b| match (a.avg_grade, b.avg_grade) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    ranked.truncate(TOP_STUDENTS);
    ranked
}

#[derive(Debug, Clone)]
pub struct StudentReport {
    pub subjects: BTreeMap<String, GradeStats>,
    pub total: GradeStats,
}

pub fn student_report(student: &Student) -> Result<StudentReport> {
    let total = student_total_stats(student)?;
    Ok(StudentReport {
        subjects: student_stats_by_subject(student),
        total,
    })
}

#[derive(Debug, Clone)]
pub struct GroupReport<'a> {
    pub grades_stats: BTreeMap<String, GradeStats>,
    pub top_three: Vec<RankedStudent<'a>>,
}

/// Rejects a group with no members, or whose members have no grades at all,
/// before computing anything.
pub fn group_report<'a>(group: &Group, members: &[&'a Student]) -> Result<GroupReport<'a>> {
    if members.is_empty() {
        return Err(GradebookError::PreconditionFailed(format!(
            "group #{} has no students yet",
            group.group_id
        )));
    }
    if members.iter().all(|s| s.grades.is_empty()) {
        return Err(GradebookError::PreconditionFailed(format!(
            "students in group #{} have no grades yet, check groups/{}",
            group.group_id, group.group_id
        )));
    }
    Ok(GroupReport {
        grades_stats: group_stats_by_subject(members),
        top_three: top_three_students(members),
    })
}
