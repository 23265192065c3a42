//! Read-only projections over all stored users and files.
//!
//! Every figure is recomputed from the collections on each call; nothing here is
//! cached or persisted.

#[cfg(feature = "web")]
use crate::app::AppState;
#[cfg(feature = "web")]
use crate::error::{AppError, AppResult};
use crate::loader::MAX_UPLOAD_BYTES;
use crate::login::{PublicUser, User};
use crate::store::{ChartType, FileRecord};
#[cfg(feature = "web")]
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
#[cfg(feature = "web")]
use serde::Deserialize;
use std::collections::HashMap;
#[cfg(feature = "web")]
use std::sync::Arc;

/// Uploads listed in the admin activity feed
pub const RECENT_UPLOAD_LIMIT: usize = 10;

/// Files listed on a user's dashboard
pub const DASHBOARD_FILE_LIMIT: usize = 5;

/// A user with their file totals
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(flatten)]
    pub user: PublicUser,
    pub files_count: usize,
    pub total_storage: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct UserCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

/// Number of recorded analyses of one chart type
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChartUsage {
    pub chart_type: ChartType,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total: usize,
    pub total_storage: u64,
    pub average_file_size: f64,
}

/// An upload joined with its uploader
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentUpload {
    pub filename: String,
    pub original_name: String,
    pub username: String,
    pub uploaded_at: DateTime<Utc>,
    pub analyses: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub users: UserCounts,
    pub files: StorageStats,
    pub chart_usage: Vec<ChartUsage>,
    pub recent_activity: Vec<RecentUpload>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StorageUsage {
    pub used: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub analyses: usize,
}

/// Per-user dashboard figures
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub storage: StorageUsage,
    pub chart_usage: Vec<ChartUsage>,
    pub recent_files: Vec<FileRecord>,
    pub activities: Vec<Activity>,
}

/// Every user with the number and total size of the files they own
pub fn user_summaries(users: &[User], files: &[FileRecord]) -> Vec<UserSummary> {
    let mut totals: HashMap<&str, (usize, u64)> = HashMap::new();
    for file in files {
        let entry = totals.entry(file.user.as_str()).or_default();
        entry.0 += 1;
        entry.1 += file.size;
    }

    users
        .iter()
        .map(|user| {
            let (files_count, total_storage) =
                totals.get(user.id.as_str()).copied().unwrap_or_default();
            UserSummary {
                user: PublicUser::from(user),
                files_count,
                total_storage,
            }
        })
        .collect()
}

pub fn user_counts(users: &[User]) -> UserCounts {
    let active = users.iter().filter(|u| u.is_active).count();
    UserCounts {
        total: users.len(),
        active,
        inactive: users.len() - active,
    }
}

/// Histogram of chart types over all analyses of `files`
///
/// Sorted by descending count; equal counts keep the order in which each chart type
/// was first seen.
pub fn chart_usage<'a, I>(files: I) -> Vec<ChartUsage>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let mut usage: Vec<ChartUsage> = Vec::new();
    for analysis in files.into_iter().flat_map(|f| f.analyses.iter()) {
        match usage.iter_mut().find(|u| u.chart_type == analysis.chart_type) {
            Some(entry) => entry.count += 1,
            None => usage.push(ChartUsage {
                chart_type: analysis.chart_type,
                count: 1,
            }),
        }
    }

    // sort_by is stable, so ties stay in first-seen order
    usage.sort_by(|a, b| b.count.cmp(&a.count));
    usage
}

pub fn storage_stats(files: &[FileRecord]) -> StorageStats {
    let total_storage: u64 = files.iter().map(|f| f.size).sum();
    let average_file_size = if files.is_empty() {
        0.0
    } else {
        total_storage as f64 / files.len() as f64
    };

    StorageStats {
        total: files.len(),
        total_storage,
        average_file_size,
    }
}

/// The `limit` newest uploads with their uploader's username
///
/// Files whose owner is not a known user are left out.
pub fn recent_uploads(users: &[User], files: &[FileRecord], limit: usize) -> Vec<RecentUpload> {
    let usernames: HashMap<&str, &str> = users
        .iter()
        .map(|u| (u.id.as_str(), u.username.as_str()))
        .collect();

    let mut joined: Vec<RecentUpload> = files
        .iter()
        .filter_map(|file| {
            let username = usernames.get(file.user.as_str())?;
            Some(RecentUpload {
                filename: file.filename.clone(),
                original_name: file.original_name.clone(),
                username: username.to_string(),
                uploaded_at: file.uploaded_at,
                analyses: file.analyses.len(),
            })
        })
        .collect();

    joined.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    joined.truncate(limit);
    joined
}

pub fn admin_stats(users: &[User], files: &[FileRecord]) -> AdminStats {
    AdminStats {
        users: user_counts(users),
        files: storage_stats(files),
        chart_usage: chart_usage(files),
        recent_activity: recent_uploads(users, files, RECENT_UPLOAD_LIMIT),
    }
}

/// Dashboard figures for one user
///
/// `files` must be that user's files; the newest uploads come first in
/// `recent_files` and `activities` regardless of the input order.
pub fn dashboard_stats(files: &[FileRecord]) -> DashboardStats {
    let mut newest: Vec<&FileRecord> = files.iter().collect();
    newest.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    newest.truncate(DASHBOARD_FILE_LIMIT);

    DashboardStats {
        storage: StorageUsage {
            used: files.iter().map(|f| f.size).sum(),
            limit: MAX_UPLOAD_BYTES,
        },
        chart_usage: chart_usage(files),
        recent_files: newest.iter().map(|f| (*f).clone()).collect(),
        activities: newest
            .iter()
            .map(|f| Activity {
                kind: "file".to_string(),
                filename: f.filename.clone(),
                timestamp: f.uploaded_at,
                description: format!("Uploaded {}", f.original_name),
                analyses: f.analyses.len(),
            })
            .collect(),
    }
}

// Web handlers (admin routes sit behind require_auth and require_admin)

#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub is_active: bool,
}

#[cfg(feature = "web")]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<serde_json::Value>> {
    let users = state.store.users()?;
    let files = state.store.files()?;

    Ok(Json(serde_json::json!({
        "users": user_summaries(&users, &files),
    })))
}

#[cfg(feature = "web")]
pub async fn stats(State(state): State<Arc<AppState>>) -> AppResult<Json<AdminStats>> {
    let users = state.store.users()?;
    let files = state.store.files()?;

    Ok(Json(admin_stats(&users, &files)))
}

/// Activate or deactivate an account
#[cfg(feature = "web")]
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<crate::login::CurrentUser>,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> AppResult<Json<serde_json::Value>> {
    if id == admin.id && !update.is_active {
        return Err(AppError::InvalidInput(
            "Admins cannot deactivate their own account".to_string(),
        ));
    }

    let user = state
        .store
        .update_user(&id, |user| user.is_active = update.is_active)?;

    log::info!(
        "Admin '{}' set user '{}' active={}",
        admin.username,
        user.username,
        user.is_active
    );

    Ok(Json(serde_json::json!({
        "message": "User status updated",
        "user": PublicUser::from(&user),
    })))
}
