use crate::error::{Entity, GradebookError};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::students::grades_json;
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use crate::model::NewGrade;
use serde_json::json;

fn handle_grades_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params::id(req, "studentId")?;
    let ds = params::store(state)?.load()?;
    let grades = grades_json(ds.student(student_id)?);
    Ok(json!({
        "gradesCount": grades.len(),
        "grades": grades,
    }))
}

fn handle_grades_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params::id(req, "studentId")?;
    let grade_id = params::id(req, "gradeId")?;
    let ds = params::store(state)?.load()?;
    let student = ds.student(student_id)?;
    let Some(grade) = student.grades.get(&grade_id) else {
        // The grade may exist but belong to someone else; either way it is not this student's.
        return Err(GradebookError::not_found(Entity::Grade, grade_id).into());
    };
    Ok(json!(grade.summary()))
}

fn handle_grades_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = params::store(state)?;
    let student_id = params::id(req, "studentId")?;
    let subject = params::text(req, "subject")?;
    let grade = params::id(req, "grade")?;
    let date_grade = params::opt_date(req, "date")?;

    let created = store.create_grade(
        student_id,
        &NewGrade {
            subject,
            grade,
            date_grade,
        },
    )?;
    Ok(json!(created.summary()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.list" => handle_grades_list(state, req),
        "grades.get" => handle_grades_get(state, req),
        "grades.create" => handle_grades_create(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
