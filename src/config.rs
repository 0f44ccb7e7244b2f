use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "recordbook.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub accounts_file: String,
    pub credentials_file: String,
    pub grades_file: String,
    pub activities_file: String,
    pub student_id_prefix: String,
    pub admin_id_prefix: String,
    pub id_width: usize,
    pub subjects: Vec<String>,
    pub seed_admin: SeedAdmin,
    pub activity_categories: Vec<ActivityCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SeedAdmin {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCategory {
    pub name: String,
    pub activities: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for SeedAdmin {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin123".to_string(),
            full_name: "Admin User".to_string(),
            email: "admin@example.com".to_string(),
            phone: "1234567890".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            accounts_file: "users.txt".to_string(),
            credentials_file: "passwords.txt".to_string(),
            grades_file: "grades.txt".to_string(),
            activities_file: "eca.txt".to_string(),
            student_id_prefix: "STU".to_string(),
            admin_id_prefix: "ADM".to_string(),
            id_width: 3,
            subjects: strings(&[
                "Mathematics",
                "Science",
                "English",
                "History",
                "Computer Science",
            ]),
            seed_admin: SeedAdmin::default(),
            activity_categories: vec![
                ActivityCategory {
                    name: "Sports".to_string(),
                    activities: strings(&["Football", "Basketball", "Cricket", "Tennis"]),
                },
                ActivityCategory {
                    name: "Arts".to_string(),
                    activities: strings(&["Drama", "Music", "Dance", "Art"]),
                },
                ActivityCategory {
                    name: "Academic".to_string(),
                    activities: strings(&["Debate", "Science Club", "Math Club"]),
                },
                ActivityCategory {
                    name: "Other".to_string(),
                    activities: strings(&["Community Service", "Environmental Club"]),
                },
            ],
        }
    }
}

impl StoreConfig {
    /// The four store files in a fixed order: accounts, credentials, grades, activities.
    pub fn store_files(&self) -> [&str; 4] {
        [
            self.accounts_file.as_str(),
            self.credentials_file.as_str(),
            self.grades_file.as_str(),
            self.activities_file.as_str(),
        ]
    }

    pub fn is_known_subject(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s == subject)
    }
}

pub fn config_path(workspace: &Path) -> PathBuf {
    workspace.join(CONFIG_FILE_NAME)
}

pub fn read_config(path: &Path) -> anyhow::Result<StoreConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is invalid JSON", path.to_string_lossy()))
}

/// Best-effort: a broken config file must not prevent the workspace from opening.
pub fn load_workspace_config(workspace: &Path) -> StoreConfig {
    let path = config_path(workspace);
    if !path.is_file() {
        return StoreConfig::default();
    }
    match read_config(&path) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), "loaded workspace config");
            cfg
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "falling back to default config");
            StoreConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_workspace_config(dir.path());
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(
            cfg.store_files(),
            ["users.txt", "passwords.txt", "grades.txt", "eca.txt"]
        );
    }

    #[test]
    fn partial_config_overrides_only_given_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            config_path(dir.path()),
            r#"{ "studentIdPrefix": "S", "gradesFile": "marks.txt", "subjects": ["Art"] }"#,
        )
        .expect("write config");
        let cfg = load_workspace_config(dir.path());
        assert_eq!(cfg.student_id_prefix, "S");
        assert_eq!(cfg.grades_file, "marks.txt");
        assert_eq!(cfg.accounts_file, "users.txt");
        assert!(cfg.is_known_subject("Art"));
        assert!(!cfg.is_known_subject("Science"));
        assert_eq!(cfg.seed_admin.username, "admin");
    }

    #[test]
    fn invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(config_path(dir.path()), "{ not json").expect("write config");
        assert!(read_config(&config_path(dir.path())).is_err());
        assert_eq!(load_workspace_config(dir.path()), StoreConfig::default());
    }
}
