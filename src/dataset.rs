//! Rebuilds the student/grade/group graph from the relation files.

use crate::config::Settings;
use crate::error::{Entity, GradebookError, Result};
use crate::model::{
    Grade, GradeId, Group, GroupId, Membership, Student, StudentId, STORED_DATE_FORMAT,
};
use crate::table::{Row, Table};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

pub const STUDENT_HEADERS: [&str; 4] = ["id", "first_name", "last_name", "birth_year"];
pub const GRADE_HEADERS: [&str; 5] = ["id", "subject", "grade", "date", "student_id"];
pub const GROUP_HEADERS: [&str; 2] = ["id", "name"];
pub const MEMBERSHIP_HEADERS: [&str; 2] = ["student_id", "group_id"];

/// The four relation files, parsed but not yet linked.
#[derive(Debug, Clone)]
pub struct RelationTables {
    pub students: Table,
    pub grades: Table,
    pub groups: Table,
    pub membership: Table,
}

/// Everything loaded for one request.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub groups: BTreeMap<GroupId, Group>,
    pub students: BTreeMap<StudentId, Student>,
}

impl Dataset {
    pub fn load(settings: &Settings) -> Result<Dataset> {
        Dataset::from_tables(&RelationTables {
            students: Table::read(&settings.students_file)?,
            grades: Table::read(&settings.grades_file)?,
            groups: Table::read(&settings.groups_file)?,
            membership: Table::read(&settings.membership_file)?,
        })
    }

    /// Links already parsed relation tables. Nothing is read from disk.
    pub fn from_tables(tables: &RelationTables) -> Result<Dataset> {
        let mut groups = groups_from(&tables.groups)?;
        let mut students = students_from(&tables.students)?;
        let grades = grades_from(&tables.grades)?;
        let relations = membership_from(&tables.membership)?;

        attach(&mut groups, &students, &relations, &tables.membership.file)?;
        attach_grades(&mut students, grades, &tables.grades.file)?;

        tracing::debug!(
            groups = groups.len(),
            students = students.len(),
            relations = relations.len(),
            "dataset loaded"
        );
        Ok(Dataset { groups, students })
    }

    pub fn student(&self, id: StudentId) -> Result<&Student> {
        self.students
            .get(&id)
            .ok_or_else(|| GradebookError::not_found(Entity::Student, id))
    }

    pub fn group(&self, id: GroupId) -> Result<&Group> {
        self.groups
            .get(&id)
            .ok_or_else(|| GradebookError::not_found(Entity::Group, id))
    }

    /// Member students of `group`, borrowed from this dataset, in membership order.
    pub fn members(&self, group: &Group) -> Vec<&Student> {
        group
            .student_ids
            .iter()
            .filter_map(|id| self.students.get(id))
            .collect()
    }
}

pub fn load_students(path: &Path) -> Result<BTreeMap<StudentId, Student>> {
    students_from(&Table::read(path)?)
}

/// Ids are unique within a relation file; a repeat is malformed data.
fn insert_unique<V>(
    out: &mut BTreeMap<i64, V>,
    t: &Table,
    row: &Row,
    id: i64,
    value: V,
) -> Result<()> {
    if out.contains_key(&id) {
        return Err(GradebookError::Malformed {
            file: t.file.clone(),
            line: row.line,
            reason: format!("duplicate id {id}"),
        });
    }
    out.insert(id, value);
    Ok(())
}

fn students_from(t: &Table) -> Result<BTreeMap<StudentId, Student>> {
    let id_col = t.column("id")?;
    let first_col = t.column("first_name")?;
    let last_col = t.column("last_name")?;
    let year_col = t.column("birth_year")?;

    let mut out = BTreeMap::new();
    for row in &t.rows {
        let student_id = t.int_cell(row, id_col)?;
        let birth_year = t.int_cell(row, year_col)?;
        let birth_year = i32::try_from(birth_year).map_err(|_| GradebookError::Malformed {
            file: t.file.clone(),
            line: row.line,
            reason: format!("birth_year {birth_year} out of range"),
        })?;
        insert_unique(
            &mut out,
            t,
            row,
            student_id,
            Student {
                student_id,
                first_name: t.cell(row, first_col)?.to_string(),
                last_name: t.cell(row, last_col)?.to_string(),
                birth_year,
                grades: BTreeMap::new(),
            },
        )?;
    }
    Ok(out)
}

fn grades_from(t: &Table) -> Result<BTreeMap<GradeId, Grade>> {
    let id_col = t.column("id")?;
    let subject_col = t.column("subject")?;
    let grade_col = t.column("grade")?;
    let date_col = t.column("date")?;
    let student_col = t.column("student_id")?;

    let mut out = BTreeMap::new();
    for row in &t.rows {
        let grade_id = t.int_cell(row, id_col)?;
        let raw_date = t.cell(row, date_col)?.trim();
        let date_grade = NaiveDate::parse_from_str(raw_date, STORED_DATE_FORMAT).map_err(|_| {
            GradebookError::Malformed {
                file: t.file.clone(),
                line: row.line,
                reason: format!("'{raw_date}' is not a YYYY-MM-DD date"),
            }
        })?;
        insert_unique(
            &mut out,
            t,
            row,
            grade_id,
            Grade {
                grade_id,
                subject: t.cell(row, subject_col)?.to_string(),
                grade: t.int_cell(row, grade_col)?,
                date_grade,
                student_id: t.int_cell(row, student_col)?,
            },
        )?;
    }
    Ok(out)
}

fn groups_from(t: &Table) -> Result<BTreeMap<GroupId, Group>> {
    let id_col = t.column("id")?;
    let name_col = t.column("name")?;

    let mut out = BTreeMap::new();
    for row in &t.rows {
        let group_id = t.int_cell(row, id_col)?;
        insert_unique(
            &mut out,
            t,
            row,
            group_id,
            Group {
                group_id,
                name: t.cell(row, name_col)?.to_string(),
                student_ids: Vec::new(),
            },
        )?;
    }
    Ok(out)
}

fn membership_from(t: &Table) -> Result<Vec<Membership>> {
    let student_col = t.column("student_id")?;
    let group_col = t.column("group_id")?;
    t.rows
        .iter()
        .map(|row| {
            Ok(Membership {
                student_id: t.int_cell(row, student_col)?,
                group_id: t.int_cell(row, group_col)?,
            })
        })
        .collect()
}

/// Fills each group's member list from the membership relation.
///
/// A pair naming a missing student or group aborts the whole load.
pub fn attach(
    groups: &mut BTreeMap<GroupId, Group>,
    students: &BTreeMap<StudentId, Student>,
    relations: &[Membership],
    file: &str,
) -> Result<()> {
    for rel in relations {
        if !students.contains_key(&rel.student_id) {
            return Err(GradebookError::DataIntegrity {
                file: file.to_string(),
                message: format!(
                    "membership ({}, {}) references missing student #{}",
                    rel.student_id, rel.group_id, rel.student_id
                ),
            });
        }
        let Some(group) = groups.get_mut(&rel.group_id) else {
            return Err(GradebookError::DataIntegrity {
                file: file.to_string(),
                message: format!(
                    "membership ({}, {}) references missing group #{}",
                    rel.student_id, rel.group_id, rel.group_id
                ),
            });
        };
        if !group.has_member(rel.student_id) {
            group.student_ids.push(rel.student_id);
        }
    }
    Ok(())
}

/// Moves each grade into its owning student's collection.
pub fn attach_grades(
    students: &mut BTreeMap<StudentId, Student>,
    grades: BTreeMap<GradeId, Grade>,
    file: &str,
) -> Result<()> {
    for (grade_id, grade) in grades {
        let Some(student) = students.get_mut(&grade.student_id) else {
            return Err(GradebookError::DataIntegrity {
                file: file.to_string(),
                message: format!(
                    "grade #{} references missing student #{}",
                    grade_id, grade.student_id
                ),
            });
        };
        student.grades.insert(grade_id, grade);
    }
    Ok(())
}
