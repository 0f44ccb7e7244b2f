use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Literal written into the account file's password column. The real password
/// only ever lives in the credentials file.
pub const PASSWORD_PLACEHOLDER: &str = "password";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_placeholder: String,
    pub role: Role,
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub username: String,
    pub subject: String,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub username: String,
    pub activity: String,
}

/// One line of a store file.
pub trait Record: Sized {
    /// Collection name used in log events.
    const KIND: &'static str;

    fn parse_line(line: &str) -> Option<Self>;
    fn to_line(&self) -> String;
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(|x| x.trim()).collect()
}

impl Record for Account {
    const KIND: &'static str = "accounts";

    fn parse_line(line: &str) -> Option<Self> {
        // username,password,role,id,name,email,phone
        let parts = split_fields(line);
        if parts.len() != 7 {
            return None;
        }
        let role = Role::parse(parts[2])?;
        if parts[0].is_empty() {
            return None;
        }
        Some(Account {
            username: parts[0].to_string(),
            password_placeholder: parts[1].to_string(),
            role,
            id: parts[3].to_string(),
            full_name: parts[4].to_string(),
            email: parts[5].to_string(),
            phone: parts[6].to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.username,
            self.password_placeholder,
            self.role,
            self.id,
            self.full_name,
            self.email,
            self.phone
        )
    }
}

impl Record for Credential {
    const KIND: &'static str = "credentials";

    fn parse_line(line: &str) -> Option<Self> {
        // Passwords are compared exactly, so only the line terminator is stripped.
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 2 || parts[0].trim().is_empty() {
            return None;
        }
        Some(Credential {
            username: parts[0].trim().to_string(),
            password: parts[1].trim_end_matches(['\r', '\n']).to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!("{},{}", self.username, self.password)
    }
}

impl Record for GradeEntry {
    const KIND: &'static str = "grades";

    fn parse_line(line: &str) -> Option<Self> {
        let parts = split_fields(line);
        if parts.len() != 3 || parts[0].is_empty() {
            return None;
        }
        let score = parts[2].parse::<u8>().ok().filter(|s| *s <= 100)?;
        Some(GradeEntry {
            username: parts[0].to_string(),
            subject: parts[1].to_string(),
            score,
        })
    }

    fn to_line(&self) -> String {
        format!("{},{},{}", self.username, self.subject, self.score)
    }
}

impl Record for ActivityEntry {
    const KIND: &'static str = "activities";

    fn parse_line(line: &str) -> Option<Self> {
        let parts = split_fields(line);
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return None;
        }
        Some(ActivityEntry {
            username: parts[0].to_string(),
            activity: parts[1].to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!("{},{}", self.username, self.activity)
    }
}

/// First field of a raw store line, whether or not the rest parses.
pub fn owner_of(line: &str) -> Option<&str> {
    line.split(',').next().map(|s| s.trim()).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_no: usize,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedLine>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

pub fn parse_collection<T: Record>(text: &str, source: &str) -> Loaded<T> {
    let mut loaded = Loaded::default();
    for (idx, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        match T::parse_line(raw) {
            Some(rec) => loaded.records.push(rec),
            None => {
                tracing::warn!(
                    collection = T::KIND,
                    file = source,
                    line = idx + 1,
                    raw,
                    "skipping malformed line"
                );
                loaded.skipped.push(SkippedLine {
                    line_no: idx + 1,
                    raw: raw.to_string(),
                });
            }
        }
    }
    loaded
}

/// Reads a whole store file. A missing file is an empty collection.
pub fn load_collection<T: Record>(path: &Path) -> std::io::Result<Loaded<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::default()),
        Err(e) => return Err(e),
    };
    let text = String::from_utf8_lossy(&bytes);
    Ok(parse_collection(&text, &path.to_string_lossy()))
}
