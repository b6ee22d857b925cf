//! Membership and group-level invariants checked before touching the files.

use crate::db::Store;
use crate::error::{GradebookError, Result};
use crate::model::{Group, GroupId, Membership, StudentId};

/// Adds `student_id` to `group_id`. Both must exist and the pair must be new.
pub fn add_membership(store: &Store, student_id: StudentId, group_id: GroupId) -> Result<Group> {
    store.exclusive(|t| {
        let ds = t.load()?;
        let group = ds.group(group_id)?;
        ds.student(student_id)?;
        if group.has_member(student_id) {
            return Err(GradebookError::DuplicateRelation {
                student_id,
                group_id,
            });
        }
        t.append_membership(Membership {
            student_id,
            group_id,
        })?;
        tracing::info!(student_id, group_id, "membership added");

        let mut group = group.clone();
        group.student_ids.push(student_id);
        Ok(group)
    })
}

/// Removes the pair if present. Returns whether a row was removed.
pub fn remove_membership(store: &Store, student_id: StudentId, group_id: GroupId) -> Result<bool> {
    store.exclusive(|t| {
        let removed = t.remove_membership(Membership {
            student_id,
            group_id,
        })?;
        if removed > 0 {
            tracing::info!(student_id, group_id, "membership removed");
        } else {
            tracing::debug!(student_id, group_id, "membership absent, nothing removed");
        }
        Ok(removed > 0)
    })
}

/// Changes only the group's name; id and membership are untouched.
pub fn rename_group(store: &Store, group_id: GroupId, new_name: &str) -> Result<Group> {
    store.exclusive(|t| {
        let ds = t.load()?;
        let mut group = ds.group(group_id)?.clone();
        t.rename_group(group_id, new_name)?;
        tracing::info!(group_id, "group renamed");
        group.name = new_name.to_string();
        Ok(group)
    })
}
