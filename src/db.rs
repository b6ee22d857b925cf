//! Flat-file persistence for students, grades, groups and membership.
//!
//! All read-compute-write sequences run under one process-wide lock, so ids
//! computed from a scan cannot collide and rewrites cannot lose updates within
//! this process. Whole-file rewrites are staged and renamed into place.

use crate::config::Settings;
use crate::dataset::{
    self, Dataset, GRADE_HEADERS, GROUP_HEADERS, MEMBERSHIP_HEADERS, STUDENT_HEADERS,
};
use crate::error::{Entity, GradebookError, Result};
use crate::model::{
    Grade, Group, GroupId, Membership, NewGrade, NewStudent, Student, StudentId,
    STORED_DATE_FORMAT,
};
use crate::table::{self, file_label, StagedWrite, Table};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;

pub struct Store {
    settings: Settings,
    lock: Mutex<()>,
}

/// Opens the store, creating any missing relation file with its header row.
pub fn open_store(settings: Settings) -> Result<Store> {
    let files: [(&Path, &[&str]); 4] = [
        (&settings.students_file, &STUDENT_HEADERS),
        (&settings.grades_file, &GRADE_HEADERS),
        (&settings.groups_file, &GROUP_HEADERS),
        (&settings.membership_file, &MEMBERSHIP_HEADERS),
    ];
    for (path, headers) in files {
        if table::ensure_file(path, headers)? {
            tracing::info!(file = %path.display(), "created relation file");
        }
    }
    Ok(Store {
        settings,
        lock: Mutex::new(()),
    })
}

/// Unlocked file operations. Only reachable through [`Store::exclusive`].
pub struct Tables<'a> {
    settings: &'a Settings,
}

impl Store {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs `f` while holding the store lock.
    pub fn exclusive<T>(&self, f: impl FnOnce(&Tables<'_>) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        f(&Tables {
            settings: &self.settings,
        })
    }

    pub fn load(&self) -> Result<Dataset> {
        self.exclusive(|t| t.load())
    }

    pub fn create_student(&self, new: &NewStudent) -> Result<Student> {
        self.exclusive(|t| {
            let path = &t.settings.students_file;
            let student_id = next_id(path, "id")?;
            table::append_record(
                path,
                &[
                    ("id", student_id.to_string()),
                    ("first_name", new.first_name.clone()),
                    ("last_name", new.last_name.clone()),
                    ("birth_year", new.birth_year.to_string()),
                ],
            )?;
            tracing::info!(student_id, "student created");
            Ok(Student {
                student_id,
                first_name: new.first_name.clone(),
                last_name: new.last_name.clone(),
                birth_year: new.birth_year,
                grades: BTreeMap::new(),
            })
        })
    }

    pub fn create_grade(&self, student_id: StudentId, new: &NewGrade) -> Result<Grade> {
        self.exclusive(|t| {
            let students = dataset::load_students(&t.settings.students_file)?;
            if !students.contains_key(&student_id) {
                return Err(GradebookError::not_found(Entity::Student, student_id));
            }
            let path = &t.settings.grades_file;
            let grade_id = next_id(path, "id")?;
            let date_grade = new
                .date_grade
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            table::append_record(
                path,
                &[
                    ("id", grade_id.to_string()),
                    ("subject", new.subject.clone()),
                    ("grade", new.grade.to_string()),
                    ("date", date_grade.format(STORED_DATE_FORMAT).to_string()),
                    ("student_id", student_id.to_string()),
                ],
            )?;
            tracing::info!(grade_id, student_id, "grade created");
            Ok(Grade {
                grade_id,
                subject: new.subject.clone(),
                grade: new.grade,
                date_grade,
                student_id,
            })
        })
    }

    /// Appends the group row, then one membership row per distinct student.
    pub fn create_group(&self, name: &str, student_ids: &[StudentId]) -> Result<Group> {
        self.exclusive(|t| {
            let students = dataset::load_students(&t.settings.students_file)?;
            let mut members: Vec<StudentId> = Vec::new();
            for id in student_ids {
                if !students.contains_key(id) {
                    return Err(GradebookError::not_found(Entity::Student, *id));
                }
                if !members.contains(id) {
                    members.push(*id);
                }
            }

            let path = &t.settings.groups_file;
            let group_id = next_id(path, "id")?;
            table::append_record(
                path,
                &[("id", group_id.to_string()), ("name", name.to_string())],
            )?;
            for student_id in &members {
                t.append_membership(Membership {
                    student_id: *student_id,
                    group_id,
                })?;
            }
            tracing::info!(group_id, members = members.len(), "group created");
            Ok(Group {
                group_id,
                name: name.to_string(),
                student_ids: members,
            })
        })
    }

    /// Removes the student's grades, membership rows and record.
    ///
    /// All three files are staged before any is replaced.
    pub fn delete_all_student_data(&self, student_id: StudentId) -> Result<()> {
        self.exclusive(|t| {
            t.load()?.student(student_id)?;

            let mut grades = Table::read(&t.settings.grades_file)?;
            let col = grades.column("student_id")?;
            let grades_removed = grades.drop_where(&[col], |v| v[0] == student_id)?;

            let mut membership = Table::read(&t.settings.membership_file)?;
            let col = membership.column("student_id")?;
            let memberships_removed = membership.drop_where(&[col], |v| v[0] == student_id)?;

            let mut students = Table::read(&t.settings.students_file)?;
            let col = students.column("id")?;
            students.drop_where(&[col], |v| v[0] == student_id)?;

            let mut staged = StagedWrite::new();
            staged.stage_table(&t.settings.grades_file, &grades)?;
            staged.stage_table(&t.settings.membership_file, &membership)?;
            staged.stage_table(&t.settings.students_file, &students)?;
            staged.commit()?;

            tracing::info!(
                student_id,
                grades_removed,
                memberships_removed,
                "student deleted"
            );
            Ok(())
        })
    }

    /// Removes the group's membership rows and record. Students and grades stay.
    pub fn delete_all_group_data(&self, group_id: GroupId) -> Result<()> {
        self.exclusive(|t| {
            t.load()?.group(group_id)?;

            let mut membership = Table::read(&t.settings.membership_file)?;
            let col = membership.column("group_id")?;
            let memberships_removed = membership.drop_where(&[col], |v| v[0] == group_id)?;

            let mut groups = Table::read(&t.settings.groups_file)?;
            let col = groups.column("id")?;
            groups.drop_where(&[col], |v| v[0] == group_id)?;

            let mut staged = StagedWrite::new();
            staged.stage_table(&t.settings.membership_file, &membership)?;
            staged.stage_table(&t.settings.groups_file, &groups)?;
            staged.commit()?;

            tracing::info!(group_id, memberships_removed, "group deleted");
            Ok(())
        })
    }
}

impl Tables<'_> {
    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn load(&self) -> Result<Dataset> {
        Dataset::load(self.settings)
    }

    pub fn append_membership(&self, m: Membership) -> Result<()> {
        table::append_record(
            &self.settings.membership_file,
            &[
                ("student_id", m.student_id.to_string()),
                ("group_id", m.group_id.to_string()),
            ],
        )
    }

    /// Returns how many rows matched the pair.
    pub fn remove_membership(&self, m: Membership) -> Result<usize> {
        let path = &self.settings.membership_file;
        let mut membership = Table::read(path)?;
        let cols = [
            membership.column("student_id")?,
            membership.column("group_id")?,
        ];
        let removed =
            membership.drop_where(&cols, |v| v[0] == m.student_id && v[1] == m.group_id)?;
        if removed > 0 {
            let mut staged = StagedWrite::new();
            staged.stage_table(path, &membership)?;
            staged.commit()?;
        }
        Ok(removed)
    }

    /// Rewrites the name cell of one group row; every other cell is kept.
    pub fn rename_group(&self, group_id: GroupId, name: &str) -> Result<()> {
        let path = &self.settings.groups_file;
        let mut groups = Table::read(path)?;
        let id_col = groups.column("id")?;
        let name_col = groups.column("name")?;

        let mut target = None;
        for (idx, row) in groups.rows.iter().enumerate() {
            if groups.int_cell(row, id_col)? == group_id {
                target = Some(idx);
            }
        }
        let Some(idx) = target else {
            return Err(GradebookError::not_found(Entity::Group, group_id));
        };
        let row = &mut groups.rows[idx];
        if row.cells.len() <= name_col {
            row.cells.resize(name_col + 1, String::new());
        }
        row.cells[name_col] = name.to_string();

        let mut staged = StagedWrite::new();
        staged.stage_table(path, &groups)?;
        staged.commit()
    }
}

/// `max(existing ids) + 1`, or 1 for a file without rows. Freed ids below the
/// maximum are never handed out again.
pub fn next_id(path: &Path, column: &str) -> Result<i64> {
    let t = Table::read(path)?;
    let col = t.column(column)?;
    let mut max: Option<i64> = None;
    for row in &t.rows {
        let id = t.int_cell(row, col)?;
        max = Some(max.map_or(id, |m| m.max(id)));
    }
    let next = match max {
        None => 1,
        Some(m) => m.checked_add(1).ok_or_else(|| GradebookError::DataIntegrity {
            file: file_label(path),
            message: format!("no id left above {m} in column '{column}'"),
        })?,
    };
    tracing::debug!(file = %file_label(path), next, "next id");
    Ok(next)
}
