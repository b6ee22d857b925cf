use crate::calc;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use crate::model::{GradeSummary, NewStudent, Student};
use serde_json::json;

pub(crate) fn grades_json(student: &Student) -> Vec<GradeSummary> {
    student.grades.values().map(|g| g.summary()).collect()
}

fn handle_students_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ds = params::store(state)?.load()?;
    let students: Vec<_> = ds.students.values().map(Student::summary).collect();
    Ok(json!({ "students": students }))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params::id(req, "studentId")?;
    let ds = params::store(state)?.load()?;
    Ok(json!(ds.student(student_id)?.summary()))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = params::store(state)?;
    let first_name = params::text(req, "firstName")?;
    let last_name = params::text(req, "lastName")?;
    let birth_year = params::id(req, "birthYear")?;
    let birth_year = i32::try_from(birth_year)
        .map_err(|_| HandlerErr::bad_params("birthYear out of range"))?;

    let student = store.create_student(&NewStudent {
        first_name,
        last_name,
        birth_year,
    })?;
    Ok(json!(student.summary()))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params::id(req, "studentId")?;
    params::store(state)?.delete_all_student_data(student_id)?;
    Ok(json!({ "deleted": true, "studentId": student_id }))
}

fn handle_students_stats(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params::id(req, "studentId")?;
    let ds = params::store(state)?.load()?;
    let student = ds.student(student_id)?;
    let report = calc::student_report(student)?;

    let mut out = json!(student.summary());
    out["grades"] = json!(grades_json(student));
    out["subjects"] = json!(report.subjects);
    out["totalGrades"] = json!(report.total);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.stats" => handle_students_stats(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
