use crate::calc::{self, LetterBand};
use crate::config::{self, StoreConfig};
use crate::records::{
    load_collection, owner_of, Account, ActivityEntry, Credential, GradeEntry, Loaded, Record,
    Role, PASSWORD_PLACEHOLDER,
};
use anyhow::Context;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("invalid email format: {email}")]
    InvalidEmail { email: String },

    #[error("phone number must contain only digits")]
    InvalidPhone,

    #[error("{subject} mark must be a whole number between 0 and 100 (got '{value}')")]
    InvalidMark { subject: String, value: String },

    #[error("unknown subject: {subject}")]
    UnknownSubject { subject: String },

    #[error("{field} must not contain commas or line breaks")]
    EmbeddedDelimiter { field: &'static str },

    #[error("username '{username}' already exists")]
    DuplicateUsername { username: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::InvalidEmail { .. } => "invalid_email",
            ValidationError::InvalidPhone => "invalid_phone",
            ValidationError::InvalidMark { .. } => "invalid_mark",
            ValidationError::UnknownSubject { .. } => "unknown_subject",
            ValidationError::EmbeddedDelimiter { .. } => "embedded_delimiter",
            ValidationError::DuplicateUsername { .. } => "duplicate_username",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no account named '{username}'")]
    NotFound { username: String },

    #[error("no {prefix} ids left: highest id suffix is already {max}")]
    IdExhausted { prefix: String, max: u64 },

    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Validation(v) => v.code(),
            StoreError::NotFound { .. } => "not_found",
            StoreError::IdExhausted { .. } => "id_exhausted",
            StoreError::Io { .. } => "io_failed",
        }
    }
}

fn io_err<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> StoreError + 'a {
    move |source| StoreError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Input for `add_account`. Fields are taken as typed by the user and
/// trimmed during validation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    /// (subject, raw mark). Blank marks are ignored.
    pub marks: Vec<(String, String)>,
    /// Activity names separated by commas or semicolons.
    pub activities: String,
}

impl Default for NewAccount {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            full_name: String::new(),
            email: String::new(),
            phone: String::new(),
            role: Role::Student,
            marks: Vec::new(),
            activities: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub account: Account,
    /// Non-fatal write failures after the account and credential were saved.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub accounts: usize,
    pub credentials: usize,
    pub grades: usize,
    pub activities: usize,
}

impl From<[usize; 4]> for DeleteSummary {
    fn from(removed: [usize; 4]) -> Self {
        let [accounts, credentials, grades, activities] = removed;
        Self {
            accounts,
            credentials,
            grades,
            activities,
        }
    }
}

impl DeleteSummary {
    pub fn deleted(&self) -> bool {
        self.accounts > 0
    }
}

struct ValidatedAccount {
    username: String,
    password: String,
    full_name: String,
    email: String,
    phone: String,
    role: Role,
    marks: Vec<(String, u8)>,
    activities: Vec<String>,
}

fn has_delimiter(s: &str) -> bool {
    s.contains([',', '\n', '\r'])
}

fn parse_mark(raw: &str) -> Option<u8> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>()
        .ok()
        .filter(|m| *m <= 100)
        .map(|m| m as u8)
}

/// Splits the free-text activity field on commas and semicolons.
pub fn split_activities(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(|a| a.to_string())
        .collect()
}

fn validate(input: &NewAccount, config: &StoreConfig) -> Result<ValidatedAccount, ValidationError> {
    let fields: [(&'static str, &str); 5] = [
        ("username", input.username.trim()),
        ("password", input.password.trim()),
        ("fullName", input.full_name.trim()),
        ("email", input.email.trim()),
        ("phone", input.phone.trim()),
    ];
    for (field, value) in fields {
        if value.is_empty() {
            return Err(ValidationError::MissingField { field });
        }
    }
    for (field, value) in fields {
        if has_delimiter(value) {
            return Err(ValidationError::EmbeddedDelimiter { field });
        }
    }
    let [(_, username), (_, password), (_, full_name), (_, email), (_, phone)] = fields;

    if !email.contains('@') || !email.contains('.') {
        return Err(ValidationError::InvalidEmail {
            email: email.to_string(),
        });
    }
    if !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPhone);
    }

    let mut marks = Vec::new();
    for (subject, raw) in &input.marks {
        let subject = subject.trim();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        if !config.is_known_subject(subject) {
            return Err(ValidationError::UnknownSubject {
                subject: subject.to_string(),
            });
        }
        let Some(score) = parse_mark(raw) else {
            return Err(ValidationError::InvalidMark {
                subject: subject.to_string(),
                value: raw.to_string(),
            });
        };
        marks.push((subject.to_string(), score));
    }

    if input.activities.contains(['\n', '\r']) {
        return Err(ValidationError::EmbeddedDelimiter {
            field: "activities",
        });
    }

    Ok(ValidatedAccount {
        username: username.to_string(),
        password: password.to_string(),
        full_name: full_name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        role: input.role,
        marks,
        activities: split_activities(&input.activities),
    })
}

/// Next id for `prefix`: highest numeric suffix in use plus one, starting at 1.
pub fn next_id(accounts: &[Account], prefix: &str, width: usize) -> Result<String, StoreError> {
    let max = accounts
        .iter()
        .filter_map(|a| a.id.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|rest| rest.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let next = max.checked_add(1).ok_or_else(|| StoreError::IdExhausted {
        prefix: prefix.to_string(),
        max,
    })?;
    Ok(format!("{}{:0width$}", prefix, next, width = width))
}

fn ends_without_newline(path: &Path) -> std::io::Result<bool> {
    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if f.metadata()?.len() == 0 {
        return Ok(false);
    }
    f.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn append_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let mut buf = String::new();
    if ends_without_newline(path)? {
        buf.push('\n');
    }
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(buf.as_bytes())?;
    f.flush()
}

/// Writes to a sibling temp file and renames it over `path`.
fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".rewriting");
    let tmp = path.with_file_name(tmp_name);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        e
    })
}

/// First comma-separated field of a raw line, trimmed.
fn line_owner(line: &[u8]) -> &[u8] {
    line.split(|b| *b == b',')
        .next()
        .unwrap_or_default()
        .trim_ascii()
}

/// Rewrites `path` without the lines owned by `username`; returns how many
/// lines were dropped. Untouched if nothing matches or the file is missing.
/// Kept lines are copied byte for byte, whatever their encoding.
fn rewrite_without_owner(path: &Path, username: &str) -> std::io::Result<usize> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let body = bytes.strip_suffix(b"\n").unwrap_or(&bytes[..]);
    let mut kept = Vec::with_capacity(bytes.len());
    let mut removed = 0;
    if !body.is_empty() {
        for line in body.split(|b| *b == b'\n') {
            let owner = line_owner(line);
            if !owner.is_empty() && owner == username.as_bytes() {
                removed += 1;
                continue;
            }
            kept.extend_from_slice(line);
            kept.push(b'\n');
        }
    }
    if removed > 0 {
        write_replacing(path, &kept)?;
    }
    Ok(removed)
}

pub struct RecordStore {
    workspace: PathBuf,
    config: StoreConfig,
}

impl RecordStore {
    /// Opens a workspace using its `recordbook.json` (or defaults).
    pub fn open(workspace: &Path) -> anyhow::Result<RecordStore> {
        std::fs::create_dir_all(workspace).with_context(|| {
            format!("failed to create workspace {}", workspace.to_string_lossy())
        })?;
        let cfg = config::load_workspace_config(workspace);
        Self::open_with_config(workspace, cfg)
    }

    pub fn open_with_config(workspace: &Path, config: StoreConfig) -> anyhow::Result<RecordStore> {
        std::fs::create_dir_all(workspace).with_context(|| {
            format!("failed to create workspace {}", workspace.to_string_lossy())
        })?;
        let store = RecordStore {
            workspace: workspace.to_path_buf(),
            config,
        };
        store.seed_missing_files()?;
        Ok(store)
    }

    fn seed_missing_files(&self) -> anyhow::Result<()> {
        let seed = &self.config.seed_admin;
        let admin = Account {
            username: seed.username.clone(),
            password_placeholder: PASSWORD_PLACEHOLDER.to_string(),
            role: Role::Admin,
            id: format!(
                "{}{:0width$}",
                self.config.admin_id_prefix,
                1,
                width = self.config.id_width
            ),
            full_name: seed.full_name.clone(),
            email: seed.email.clone(),
            phone: seed.phone.clone(),
        };
        let cred = Credential {
            username: seed.username.clone(),
            password: seed.password.clone(),
        };
        let seeds = [
            (self.accounts_path(), format!("{}\n", admin.to_line())),
            (self.credentials_path(), format!("{}\n", cred.to_line())),
            (self.grades_path(), String::new()),
            (self.activities_path(), String::new()),
        ];
        for (path, content) in seeds {
            if path.exists() {
                continue;
            }
            std::fs::write(&path, content)
                .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
            tracing::info!(path = %path.display(), "created store file");
        }
        Ok(())
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.workspace.join(&self.config.accounts_file)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.workspace.join(&self.config.credentials_file)
    }

    pub fn grades_path(&self) -> PathBuf {
        self.workspace.join(&self.config.grades_file)
    }

    pub fn activities_path(&self) -> PathBuf {
        self.workspace.join(&self.config.activities_file)
    }

    fn load<T: Record>(&self, path: &Path) -> Result<Loaded<T>, StoreError> {
        load_collection(path).map_err(io_err("read", path))
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let path = self.credentials_path();
        match self.load::<Credential>(&path) {
            Ok(creds) => creds
                .records
                .iter()
                .any(|c| c.username == username && c.password == password),
            Err(e) => {
                tracing::warn!(error = %e, "credential lookup failed");
                false
            }
        }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        match self.load::<Account>(&self.accounts_path()) {
            Ok(accounts) => accounts
                .records
                .iter()
                .any(|a| a.username == username && a.role == Role::Admin),
            Err(e) => {
                tracing::warn!(error = %e, "account lookup failed");
                false
            }
        }
    }

    /// All accounts, optionally restricted to one role. `skipped` reports the
    /// malformed lines of the whole file, not just the filtered role.
    pub fn list_accounts(&self, role: Option<Role>) -> Result<Loaded<Account>, StoreError> {
        let mut loaded = self.load::<Account>(&self.accounts_path())?;
        if let Some(role) = role {
            loaded.records.retain(|a| a.role == role);
        }
        Ok(loaded)
    }

    pub fn account(&self, username: &str) -> Result<Account, StoreError> {
        self.load::<Account>(&self.accounts_path())?
            .records
            .into_iter()
            .find(|a| a.username == username)
            .ok_or_else(|| StoreError::NotFound {
                username: username.to_string(),
            })
    }

    pub fn add_account(&self, input: &NewAccount) -> Result<AddOutcome, StoreError> {
        let v = validate(input, &self.config)?;

        let accounts_path = self.accounts_path();
        let credentials_path = self.credentials_path();
        let accounts = self.load::<Account>(&accounts_path)?;
        let credentials = self.load::<Credential>(&credentials_path)?;
        let taken = accounts.records.iter().any(|a| a.username == v.username)
            || accounts
                .skipped
                .iter()
                .any(|s| owner_of(&s.raw) == Some(v.username.as_str()))
            || credentials.records.iter().any(|c| c.username == v.username);
        if taken {
            return Err(ValidationError::DuplicateUsername {
                username: v.username,
            }
            .into());
        }

        let prefix = match v.role {
            Role::Admin => &self.config.admin_id_prefix,
            Role::Student => &self.config.student_id_prefix,
        };
        let account = Account {
            username: v.username.clone(),
            password_placeholder: PASSWORD_PLACEHOLDER.to_string(),
            role: v.role,
            id: next_id(&accounts.records, prefix, self.config.id_width)?,
            full_name: v.full_name,
            email: v.email,
            phone: v.phone,
        };
        let credential = Credential {
            username: v.username.clone(),
            password: v.password,
        };

        append_lines(&accounts_path, &[account.to_line()])
            .map_err(io_err("append to", &accounts_path))?;

        if let Err(e) = append_lines(&credentials_path, &[credential.to_line()]) {
            match rewrite_without_owner(&accounts_path, &account.username) {
                Ok(_) => tracing::info!(
                    username = %account.username,
                    "rolled back account after credential write failure"
                ),
                Err(cleanup) => tracing::error!(
                    username = %account.username,
                    error = %cleanup,
                    "failed to roll back account after credential write failure"
                ),
            }
            return Err(io_err("append to", &credentials_path)(e));
        }

        let mut warnings = Vec::new();

        let grade_lines: Vec<String> = v
            .marks
            .iter()
            .map(|(subject, score)| {
                GradeEntry {
                    username: v.username.clone(),
                    subject: subject.clone(),
                    score: *score,
                }
                .to_line()
            })
            .collect();
        let grades_path = self.grades_path();
        if let Err(e) = append_lines(&grades_path, &grade_lines) {
            let msg = format!("account created but grades not saved: {e}");
            tracing::warn!(username = %v.username, path = %grades_path.display(), "{msg}");
            warnings.push(msg);
        }

        let activity_lines: Vec<String> = v
            .activities
            .iter()
            .map(|name| {
                ActivityEntry {
                    username: v.username.clone(),
                    activity: name.clone(),
                }
                .to_line()
            })
            .collect();
        let activities_path = self.activities_path();
        if let Err(e) = append_lines(&activities_path, &activity_lines) {
            let msg = format!("account created but activities not saved: {e}");
            tracing::warn!(username = %v.username, path = %activities_path.display(), "{msg}");
            warnings.push(msg);
        }

        tracing::info!(
            username = %account.username,
            id = %account.id,
            role = %account.role,
            grades = grade_lines.len(),
            activities = activity_lines.len(),
            "account created"
        );
        Ok(AddOutcome { account, warnings })
    }

    /// Best-effort cascade: each file is rewritten in turn and a failure stops
    /// the cascade without restoring files already rewritten.
    pub fn delete_account(&self, username: &str) -> Result<DeleteSummary, StoreError> {
        let paths = [
            self.accounts_path(),
            self.credentials_path(),
            self.grades_path(),
            self.activities_path(),
        ];
        let mut removed = [0usize; 4];
        for (i, path) in paths.iter().enumerate() {
            match rewrite_without_owner(path, username) {
                Ok(n) => removed[i] = n,
                Err(e) => {
                    tracing::error!(
                        username,
                        path = %path.display(),
                        error = %e,
                        done = ?DeleteSummary::from(removed),
                        "cascade delete stopped; earlier files stay rewritten"
                    );
                    return Err(io_err("rewrite", path)(e));
                }
            }
        }
        let summary = DeleteSummary::from(removed);
        if summary.deleted() {
            tracing::info!(username, removed = ?summary, "account deleted");
        } else {
            tracing::info!(username, "delete requested for unknown account");
        }
        Ok(summary)
    }

    pub fn grades_for(
        &self,
        username: &str,
        is_admin: bool,
    ) -> Result<Vec<GradeEntry>, StoreError> {
        let mut grades = self.load::<GradeEntry>(&self.grades_path())?.records;
        if !is_admin {
            grades.retain(|g| g.username == username);
        }
        Ok(grades)
    }

    pub fn activities_for(
        &self,
        username: &str,
        is_admin: bool,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let mut activities = self.load::<ActivityEntry>(&self.activities_path())?.records;
        if !is_admin {
            activities.retain(|a| a.username == username);
        }
        Ok(activities)
    }

    fn all_grades(&self) -> Result<Vec<GradeEntry>, StoreError> {
        Ok(self.load::<GradeEntry>(&self.grades_path())?.records)
    }

    fn all_activities(&self) -> Result<Vec<ActivityEntry>, StoreError> {
        Ok(self.load::<ActivityEntry>(&self.activities_path())?.records)
    }

    pub fn aggregate_student_averages(&self) -> Result<BTreeMap<String, f64>, StoreError> {
        Ok(calc::student_averages(&self.all_grades()?))
    }

    pub fn aggregate_subject_averages(&self) -> Result<BTreeMap<String, f64>, StoreError> {
        Ok(calc::subject_averages(&self.all_grades()?))
    }

    pub fn aggregate_grade_distribution(&self) -> Result<BTreeMap<LetterBand, usize>, StoreError> {
        Ok(calc::grade_distribution(&self.all_grades()?))
    }

    pub fn aggregate_activity_counts(&self) -> Result<BTreeMap<String, usize>, StoreError> {
        Ok(calc::activity_counts(&self.all_activities()?))
    }
}
