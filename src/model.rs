use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

pub type StudentId = i64;
pub type GradeId = i64;
pub type GroupId = i64;

/// Grade dates are stored as ISO dates and rendered day-first in responses.
pub const STORED_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DISPLAY_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub student_id: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub birth_year: i32,
    pub grades: BTreeMap<GradeId, Grade>,
}

impl Student {
    pub fn grade_values(&self) -> Vec<i64> {
        self.grades.values().map(|g| g.grade).collect()
    }

    pub fn summary(&self) -> StudentSummary {
        StudentSummary {
            id: self.student_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            birth_year: self.birth_year,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub grade_id: GradeId,
    pub subject: String,
    pub grade: i64,
    pub date_grade: NaiveDate,
    /// Lookup of the owning student; the student holds the grade.
    pub student_id: StudentId,
}

impl Grade {
    pub fn summary(&self) -> GradeSummary {
        GradeSummary {
            id: self.grade_id,
            subject: self.subject.clone(),
            grade: self.grade,
            date: self.date_grade.format(DISPLAY_DATE_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    /// Member ids in membership-file order, without repeats.
    pub student_ids: Vec<StudentId>,
}

impl Group {
    pub fn has_member(&self, student_id: StudentId) -> bool {
        self.student_ids.contains(&student_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Membership {
    pub student_id: StudentId,
    pub group_id: GroupId,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub birth_year: i32,
}

#[derive(Debug, Clone)]
pub struct NewGrade {
    pub subject: String,
    pub grade: i64,
    pub date_grade: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub birth_year: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub id: GradeId,
    pub subject: String,
    pub grade: i64,
    pub date: String,
}
