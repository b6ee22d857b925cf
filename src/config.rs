use anyhow::Context;
use std::path::{Path, PathBuf};

pub const STUDENTS_FILE_VAR: &str = "STUDENTS_FILE";
pub const GRADES_FILE_VAR: &str = "GRADES_FILE";
pub const GROUPS_FILE_VAR: &str = "GROUPS_FILE";
pub const MEMBERSHIP_FILE_VAR: &str = "STUDENTS_IN_GROUPS_FILE";

/// Locations of the four relation files, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub students_file: PathBuf,
    pub grades_file: PathBuf,
    pub groups_file: PathBuf,
    pub membership_file: PathBuf,
}

impl Settings {
    /// Default file names inside a workspace directory.
    pub fn in_workspace(dir: &Path) -> Self {
        Self {
            students_file: dir.join("students.csv"),
            grades_file: dir.join("grades.csv"),
            groups_file: dir.join("groups.csv"),
            membership_file: dir.join("students_in_groups.csv"),
        }
    }

    /// Reads the four path variables, after loading `.env` from the working
    /// directory when one exists.
    ///
    /// Returns `Ok(None)` when none of the variables are set, so the host can
    /// pick a workspace later. A partial set is an error.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let cwd = std::env::current_dir().context("failed to determine current directory")?;
        let env_path = cwd.join(".env");
        if env_path.exists() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("failed to load dotenv file at {}", env_path.display()))?;
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Option<Self>> {
        let vars = [
            STUDENTS_FILE_VAR,
            GRADES_FILE_VAR,
            GROUPS_FILE_VAR,
            MEMBERSHIP_FILE_VAR,
        ];
        let values: Vec<Option<String>> = vars
            .iter()
            .map(|k| lookup(k).filter(|v| !v.trim().is_empty()))
            .collect();

        if values.iter().all(Option::is_none) {
            return Ok(None);
        }
        let missing: Vec<&str> = vars
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("incomplete file configuration, missing {}", missing.join(", "));
        }

        let mut it = values.into_iter().flatten().map(PathBuf::from);
        let (Some(students_file), Some(grades_file), Some(groups_file), Some(membership_file)) =
            (it.next(), it.next(), it.next(), it.next())
        else {
            anyhow::bail!("incomplete file configuration");
        };
        Ok(Some(Self {
            students_file,
            grades_file,
            groups_file,
            membership_file,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn no_variables_means_no_settings() {
        let s = Settings::from_lookup(lookup(&[])).expect("lookup");
        assert_eq!(s, None);
    }

    #[test]
    fn all_variables_resolve_in_order() {
        let s = Settings::from_lookup(lookup(&[
            (STUDENTS_FILE_VAR, "/data/s.csv"),
            (GRADES_FILE_VAR, "/data/g.csv"),
            (GROUPS_FILE_VAR, "/data/gr.csv"),
            (MEMBERSHIP_FILE_VAR, "/data/m.csv"),
        ]))
        .expect("lookup")
        .expect("settings");
        assert_eq!(s.students_file, PathBuf::from("/data/s.csv"));
        assert_eq!(s.grades_file, PathBuf::from("/data/g.csv"));
        assert_eq!(s.groups_file, PathBuf::from("/data/gr.csv"));
        assert_eq!(s.membership_file, PathBuf::from("/data/m.csv"));
    }

    #[test]
    fn partial_configuration_is_rejected() {
        let e = Settings::from_lookup(lookup(&[(STUDENTS_FILE_VAR, "/data/s.csv")]))
            .expect_err("partial config");
        let msg = e.to_string();
        assert!(msg.contains(GRADES_FILE_VAR));
        assert!(msg.contains(MEMBERSHIP_FILE_VAR));
    }
}
