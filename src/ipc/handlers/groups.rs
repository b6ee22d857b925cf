use crate::calc;
use crate::dataset::Dataset;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::students::grades_json;
use crate::ipc::params;
use crate::ipc::types::{AppState, Request};
use crate::model::{Group, Student};
use crate::relations;
use serde_json::json;

fn group_json(group: &Group) -> serde_json::Value {
    json!({
        "id": group.group_id,
        "name": group.name,
        "studentsCount": group.student_ids.len(),
    })
}

fn group_with_students_json(ds: &Dataset, group: &Group) -> serde_json::Value {
    let students: Vec<_> = ds.members(group).into_iter().map(Student::summary).collect();
    let mut out = group_json(group);
    out["students"] = json!(students);
    out
}

fn handle_groups_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let ds = params::store(state)?.load()?;
    let groups: Vec<_> = ds
        .groups
        .values()
        .map(|g| group_with_students_json(&ds, g))
        .collect();
    Ok(json!({ "groups": groups }))
}

fn handle_groups_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let group_id = params::id(req, "groupId")?;
    let ds = params::store(state)?.load()?;
    Ok(group_with_students_json(&ds, ds.group(group_id)?))
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = params::store(state)?;
    let name = params::text(req, "name")?;
    let student_ids = params::id_list(req, "students")?;

    let group = store.create_group(&name, &student_ids)?;
    let ds = store.load()?;
    Ok(group_with_students_json(&ds, &group))
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let group_id = params::id(req, "groupId")?;
    params::store(state)?.delete_all_group_data(group_id)?;
    Ok(json!({ "deleted": true, "groupId": group_id }))
}

fn handle_groups_rename(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let group_id = params::id(req, "groupId")?;
    let name = params::text(req, "name")?;
    let group = relations::rename_group(params::store(state)?, group_id, &name)?;
    Ok(group_json(&group))
}

fn handle_groups_stats(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let group_id = params::id(req, "groupId")?;
    let ds = params::store(state)?.load()?;
    let group = ds.group(group_id)?;
    let members = ds.members(group);
    let report = calc::group_report(group, &members)?;

    let top: Vec<serde_json::Value> = report
        .top_three
        .iter()
        .map(|r| {
            let mut s = json!(r.student.summary());
            s["avgGrade"] = json!(r.avg_grade);
            s
        })
        .collect();
    let mut out = group_json(group);
    out["gradesStats"] = json!(report.grades_stats);
    out["topThreeStudents"] = json!(top);
    Ok(out)
}

fn handle_groups_students_add(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let group_id = params::id(req, "groupId")?;
    let student_id = params::id(req, "studentId")?;
    let store = params::store(state)?;
    let group = relations::add_membership(store, student_id, group_id)?;
    let ds = store.load()?;
    Ok(group_with_students_json(&ds, &group))
}

fn handle_groups_students_remove(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let group_id = params::id(req, "groupId")?;
    let student_id = params::id(req, "studentId")?;
    let store = params::store(state)?;
    let removed = relations::remove_membership(store, student_id, group_id)?;

    let ds = store.load()?;
    let students: Vec<_> = match ds.groups.get(&group_id) {
        Some(g) => ds.members(g).into_iter().map(Student::summary).collect(),
        None => Vec::new(),
    };
    Ok(json!({ "removed": removed, "students": students }))
}

fn handle_groups_students_grades(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let group_id = params::id(req, "groupId")?;
    let student_id = params::id(req, "studentId")?;
    let ds = params::store(state)?.load()?;
    let group = ds.group(group_id)?;
    let student = ds.student(student_id)?;
    if !group.has_member(student_id) {
        return Err(HandlerErr::new(
            "not_found",
            404,
            format!(
                "student #{student_id} is not a member of group #{group_id}, check groups/{group_id}"
            ),
        ));
    }

    let mut out = json!(student.summary());
    out["grades"] = json!(grades_json(student));
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.list" => handle_groups_list(state, req),
        "groups.get" => handle_groups_get(state, req),
        "groups.create" => handle_groups_create(state, req),
        "groups.delete" => handle_groups_delete(state, req),
        "groups.rename" => handle_groups_rename(state, req),
        "groups.stats" => handle_groups_stats(state, req),
        "groups.students.add" => handle_groups_students_add(state, req),
        "groups.students.remove" => handle_groups_students_remove(state, req),
        "groups.students.grades" => handle_groups_students_grades(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
