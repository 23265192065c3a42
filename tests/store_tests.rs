use chrono::{Duration, Utc};
use excel_analytics::error::AppError;
use excel_analytics::login::{Role, User};
use excel_analytics::store::{Analysis, ChartType, FileRecord, Store};
use tempfile::tempdir;

fn user(name: &str) -> User {
    User::new(name, &format!("{name}@example.com"), "hash".to_string(), Role::User)
}

#[test]
fn open_creates_layout_and_starts_empty() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("db")).unwrap();

    assert!(store.uploads_dir().is_dir());
    assert!(store.users().unwrap().is_empty());
    assert!(store.files().unwrap().is_empty());
}

#[test]
fn users_persist_across_reopen() {
    let dir = tempdir().unwrap();
    let id = {
        let store = Store::open(dir.path()).unwrap();
        store.insert_user(user("ana")).unwrap().id
    };

    let store = Store::open(dir.path()).unwrap();
    let found = store.find_user(&id).unwrap().unwrap();
    assert_eq!(found.username, "ana");
    assert_eq!(
        store.find_user_by_email("ANA@example.com").unwrap().map(|u| u.id),
        Some(id)
    );
}

#[test]
fn duplicate_username_or_email_is_rejected() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store.insert_user(user("ana")).unwrap();

    let same_name = User::new("ana", "other@example.com", "h".into(), Role::User);
    assert!(matches!(
        store.insert_user(same_name),
        Err(AppError::InvalidInput(_))
    ));

    let same_email = User::new("other", "ana@example.com", "h".into(), Role::User);
    assert!(store.insert_user(same_email).is_err());
    assert_eq!(store.users().unwrap().len(), 1);
}

#[test]
fn update_user_bumps_updated_at() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let created = store.insert_user(user("ana")).unwrap();

    let updated = store.update_user(&created.id, |u| u.is_active = false).unwrap();
    assert!(!updated.is_active);
    assert!(updated.updated_at >= created.updated_at);

    assert!(matches!(
        store.update_user("missing", |_| {}),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn files_are_scoped_to_owner_and_newest_first() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut older = FileRecord::new("1-a.xlsx".into(), "a.xlsx".into(), "u1".into(), 10);
    older.uploaded_at = Utc::now() - Duration::hours(1);
    store.insert_file(older).unwrap();
    store
        .insert_file(FileRecord::new("2-b.xlsx".into(), "b.xlsx".into(), "u1".into(), 20))
        .unwrap();
    store
        .insert_file(FileRecord::new("3-c.xlsx".into(), "c.xlsx".into(), "u2".into(), 30))
        .unwrap();

    let names: Vec<String> = store
        .files_for_user("u1")
        .unwrap()
        .into_iter()
        .map(|f| f.filename)
        .collect();
    assert_eq!(names, vec!["2-b.xlsx", "1-a.xlsx"]);

    assert!(store.find_file("u2", "1-a.xlsx").unwrap().is_none());
    assert!(store.find_file("u1", "1-a.xlsx").unwrap().is_some());
}

#[test]
fn analyses_are_appended_and_persisted() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        store
            .insert_file(FileRecord::new("1-a.xlsx".into(), "a.xlsx".into(), "u1".into(), 10))
            .unwrap();

        for chart_type in [ChartType::Bar, ChartType::Pie] {
            store
                .update_file("u1", "1-a.xlsx", |f| {
                    f.analyses.push(Analysis {
                        chart_type,
                        x_axis: Some("Region".into()),
                        y_axis: Some("Sales".into()),
                        created_at: Utc::now(),
                    })
                })
                .unwrap();
        }

        assert!(matches!(
            store.update_file("u2", "1-a.xlsx", |_| {}),
            Err(AppError::NotFound(_))
        ));
    }

    let store = Store::open(dir.path()).unwrap();
    let file = store.find_file("u1", "1-a.xlsx").unwrap().unwrap();
    let kinds: Vec<ChartType> = file.analyses.iter().map(|a| a.chart_type).collect();
    assert_eq!(kinds, vec![ChartType::Bar, ChartType::Pie]);
}

#[test]
fn chart_type_parsing() {
    assert_eq!("Scatter".parse::<ChartType>().unwrap(), ChartType::Scatter);
    assert_eq!(" radar ".parse::<ChartType>().unwrap(), ChartType::Radar);
    assert!(matches!(
        "histogram".parse::<ChartType>(),
        Err(AppError::InvalidInput(_))
    ));
}

#[test]
fn upload_paths_cannot_escape_uploads_dir() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let path = store.upload_path("../users.json");
    assert_eq!(path, store.uploads_dir().join("users.json"));
    assert!(matches!(
        store.read_upload("missing.xlsx"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn corrupt_collection_is_a_storage_error() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("users.json"), "{not json").unwrap();

    assert!(matches!(
        Store::open(dir.path()),
        Err(AppError::Storage(_))
    ));
}
