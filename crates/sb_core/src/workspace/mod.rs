use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

fn validate_db_path(path: &Path) -> Result<(), AppError> {
    if path.as_os_str().is_empty() {
        return Err(AppError::new(
            "WORKSPACE_INVALID_PATH",
            "Workspace DB path is empty",
        ));
    }
    if path.exists() && path.is_dir() {
        return Err(AppError::new(
            "WORKSPACE_INVALID_PATH",
            "Workspace DB path must be a file (not a directory)",
        )
        .with_details(path.display().to_string()));
    }
    Ok(())
}

pub fn open_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;

    if !db_path.exists() {
        return Err(AppError::new(
            "WORKSPACE_DB_NOT_FOUND",
            "Workspace database file not found",
        )
        .with_details(db_path.display().to_string()));
    }
    if !db_path.is_file() {
        return Err(AppError::new(
            "WORKSPACE_INVALID_PATH",
            "Workspace DB path must point to a file",
        )
        .with_details(db_path.display().to_string()));
    }

    let mut conn = crate::db::open(db_path).map_err(|e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new("WORKSPACE_OPEN_FAILED", "Failed to open workspace database")
            .with_details(details)
    })?;

    crate::db::migrate(&mut conn).map_err(|e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new(
            "WORKSPACE_MIGRATION_FAILED",
            "Failed to migrate workspace database",
        )
        .with_details(details)
    })?;

    Ok(conn)
}

pub fn create_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;

    if db_path.exists() {
        return Err(AppError::new(
            "WORKSPACE_CREATE_FAILED",
            "Workspace DB file already exists",
        )
        .with_details(db_path.display().to_string()));
    }

    let parent = db_path.parent().ok_or_else(|| {
        AppError::new(
            "WORKSPACE_INVALID_PATH",
            "Workspace DB path must have a parent directory",
        )
        .with_details(db_path.display().to_string())
    })?;
    std::fs::create_dir_all(parent).map_err(|e| {
        AppError::new(
            "WORKSPACE_CREATE_FAILED",
            "Failed to create workspace directory",
        )
        .with_details(format!("path={}; err={}", parent.display(), e))
    })?;

    // Opening a non-existent SQLite path creates the file.
    let mut conn = crate::db::open(db_path).map_err(|e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new("WORKSPACE_CREATE_FAILED", "Failed to create workspace database")
            .with_details(details)
    })?;

    crate::db::migrate(&mut conn).map_err(|e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new(
            "WORKSPACE_MIGRATION_FAILED",
            "Failed to migrate newly created workspace database",
        )
        .with_details(details)
    })?;

    Ok(conn)
}

/// Open the workspace database, creating and migrating it on first use.
pub fn open_or_create_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;
    if db_path.exists() {
        open_workspace_connection(db_path)
    } else {
        tracing::info!(path = %db_path.display(), "creating workspace database");
        create_workspace_connection(db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_or_create_creates_then_reopens() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("studybot.sqlite");

        let conn = open_or_create_workspace_connection(&db_path).expect("create");
        crate::repo::create_session(&conn, "abc", "notes.txt", "2026-01-01T00:00:00Z")
            .expect("session");
        drop(conn);

        let conn = open_or_create_workspace_connection(&db_path).expect("reopen");
        assert_eq!(
            crate::repo::get_session(&conn, 1).expect("get").doc_id,
            "abc"
        );
    }

    #[test]
    fn open_requires_existing_file() {
        let dir = tempdir().unwrap();
        let err = open_workspace_connection(&dir.path().join("missing.sqlite")).unwrap_err();
        assert_eq!(err.code, "WORKSPACE_DB_NOT_FOUND");

        let err = open_workspace_connection(dir.path()).unwrap_err();
        assert_eq!(err.code, "WORKSPACE_INVALID_PATH");
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("w.sqlite");
        create_workspace_connection(&db_path).expect("create");
        let err = create_workspace_connection(&db_path).unwrap_err();
        assert_eq!(err.code, "WORKSPACE_CREATE_FAILED");
    }
}
