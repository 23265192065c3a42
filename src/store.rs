//! JSON document store for users and uploaded file metadata.
//!
//! Both collections are cached in memory and rewritten in full on every mutation.
//! Writes go to a temporary file in the data directory that is then renamed over
//! the collection file, so a crash never leaves a half-written document behind.

use crate::error::{AppError, AppResult};
use crate::login::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;

const USERS_FILE: &str = "users.json";
const FILES_FILE: &str = "files.json";
const UPLOADS_DIR: &str = "uploads";

/// Chart types a user can record an analysis for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Scatter,
    Pie,
    Bubble,
    Radar,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Scatter => "scatter",
            ChartType::Pie => "pie",
            ChartType::Bubble => "bubble",
            ChartType::Radar => "radar",
        }
    }
}

impl FromStr for ChartType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "line" => Ok(ChartType::Line),
            "bar" => Ok(ChartType::Bar),
            "scatter" => Ok(ChartType::Scatter),
            "pie" => Ok(ChartType::Pie),
            "bubble" => Ok(ChartType::Bubble),
            "radar" => Ok(ChartType::Radar),
            other => Err(AppError::InvalidInput(format!(
                "Invalid chart type: {}",
                other
            ))),
        }
    }
}

/// One chart a user built from a file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub chart_type: ChartType,

    #[serde(default)]
    pub x_axis: Option<String>,

    #[serde(default)]
    pub y_axis: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Metadata of a stored upload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,

    /// Name of the stored file under `uploads/`
    pub filename: String,

    /// Name the file was uploaded with
    pub original_name: String,

    /// Id of the owning user
    pub user: String,

    /// Size in bytes
    pub size: u64,

    pub uploaded_at: DateTime<Utc>,

    pub last_accessed: DateTime<Utc>,

    /// Analyses in the order they were recorded
    #[serde(default)]
    pub analyses: Vec<Analysis>,
}

impl FileRecord {
    pub fn new(filename: String, original_name: String, user: String, size: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename,
            original_name,
            user,
            size,
            uploaded_at: now,
            last_accessed: now,
            analyses: Vec::new(),
        }
    }
}

/// Users and file metadata backed by JSON documents in one directory
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    users: RwLock<Vec<User>>,
    files: RwLock<Vec<FileRecord>>,
}

impl Store {
    /// Open (or initialize) the store rooted at `dir`
    ///
    /// Creates the directory and its `uploads/` folder if missing and loads both
    /// collections. Missing collection files are treated as empty.
    ///
    /// # Errors
    /// * `AppError::Io` if the directories cannot be created or a file cannot be read
    /// * `AppError::Storage` if a collection file is not valid JSON
    pub fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(UPLOADS_DIR))?;

        let users = load_collection(&dir.join(USERS_FILE))?;
        let files = load_collection(&dir.join(FILES_FILE))?;

        Ok(Self {
            dir,
            users: RwLock::new(users),
            files: RwLock::new(files),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding stored spreadsheets
    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.join(UPLOADS_DIR)
    }

    /// Full path of a stored upload
    ///
    /// Only the final path component of `filename` is used, so a stored name can
    /// never point outside the uploads directory.
    pub fn upload_path(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.uploads_dir().join(name)
    }

    /// Read the bytes of a stored upload
    pub fn read_upload(&self, filename: &str) -> AppResult<Vec<u8>> {
        let path = self.upload_path(filename);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound("File not found on server".to_string())
            } else {
                AppError::Io(e)
            }
        })
    }

    // Users

    pub fn users(&self) -> AppResult<Vec<User>> {
        Ok(read_lock(&self.users)?.clone())
    }

    pub fn find_user(&self, id: &str) -> AppResult<Option<User>> {
        Ok(read_lock(&self.users)?.iter().find(|u| u.id == id).cloned())
    }

    pub fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(read_lock(&self.users)?
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    /// Add a new user
    ///
    /// # Errors
    /// * `AppError::InvalidInput` if the username or email is already taken
    pub fn insert_user(&self, user: User) -> AppResult<User> {
        let mut users = write_lock(&self.users)?;
        if users.iter().any(|u| {
            u.username == user.username || u.email.eq_ignore_ascii_case(&user.email)
        }) {
            return Err(AppError::InvalidInput("User already exists".to_string()));
        }

        let mut updated = users.clone();
        updated.push(user.clone());
        write_collection(&self.dir, USERS_FILE, &updated)?;
        *users = updated;

        Ok(user)
    }

    /// Apply `change` to the user with `id` and persist the result
    ///
    /// # Errors
    /// * `AppError::NotFound` if no such user exists
    pub fn update_user<F>(&self, id: &str, change: F) -> AppResult<User>
    where
        F: FnOnce(&mut User),
    {
        let mut users = write_lock(&self.users)?;
        let mut updated = users.clone();
        let user = updated
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        change(user);
        user.updated_at = Utc::now();
        let user = user.clone();

        write_collection(&self.dir, USERS_FILE, &updated)?;
        *users = updated;

        Ok(user)
    }

    // Files

    pub fn files(&self) -> AppResult<Vec<FileRecord>> {
        Ok(read_lock(&self.files)?.clone())
    }

    /// Files owned by `user_id`, newest upload first
    pub fn files_for_user(&self, user_id: &str) -> AppResult<Vec<FileRecord>> {
        let mut files: Vec<FileRecord> = read_lock(&self.files)?
            .iter()
            .filter(|f| f.user == user_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    /// File `filename` if it is owned by `user_id`
    pub fn find_file(&self, user_id: &str, filename: &str) -> AppResult<Option<FileRecord>> {
        Ok(read_lock(&self.files)?
            .iter()
            .find(|f| f.user == user_id && f.filename == filename)
            .cloned())
    }

    pub fn insert_file(&self, record: FileRecord) -> AppResult<FileRecord> {
        let mut files = write_lock(&self.files)?;
        let mut updated = files.clone();
        updated.push(record.clone());
        write_collection(&self.dir, FILES_FILE, &updated)?;
        *files = updated;

        Ok(record)
    }

    /// Apply `change` to the file `filename` owned by `user_id` and persist it
    ///
    /// # Errors
    /// * `AppError::NotFound` if the user owns no such file
    pub fn update_file<F>(&self, user_id: &str, filename: &str, change: F) -> AppResult<FileRecord>
    where
        F: FnOnce(&mut FileRecord),
    {
        let mut files = write_lock(&self.files)?;
        let mut updated = files.clone();
        let record = updated
            .iter_mut()
            .find(|f| f.user == user_id && f.filename == filename)
            .ok_or_else(|| AppError::NotFound("File not found or unauthorized".to_string()))?;

        change(record);
        let record = record.clone();

        write_collection(&self.dir, FILES_FILE, &updated)?;
        *files = updated;

        Ok(record)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> AppResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| AppError::Storage("Store lock poisoned".to_string()))
}

fn write_lock<T>(lock: &RwLock<T>) -> AppResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| AppError::Storage("Store lock poisoned".to_string()))
}

fn load_collection<T: DeserializeOwned>(path: &Path) -> AppResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

fn write_collection<T: Serialize>(dir: &Path, name: &str, items: &[T]) -> AppResult<()> {
    let json = serde_json::to_vec_pretty(items)
        .map_err(|e| AppError::Storage(format!("Failed to serialize {}: {}", name, e)))?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name))
        .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", name, e)))?;

    Ok(())
}
