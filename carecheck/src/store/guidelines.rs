// In carecheck/src/store/guidelines.rs

use crate::{Error, UploadedFile};
use chrono::Utc;
use rusqlite::{params, Connection};

// === Queries for the 'guideline_files' table ===

/// Clears the table and inserts `files` in a single transaction.
/// A repeated name overwrites the earlier row's content.
pub fn replace_all(conn: &mut Connection, files: &[UploadedFile]) -> Result<(), Error> {
    let now = Utc::now();
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM guideline_files", [])?;
    {
        let mut stmt = tx.prepare(concat!(
            "INSERT INTO guideline_files (name, content, saved_at) VALUES (?1, ?2, ?3) ",
            "ON CONFLICT(name) DO UPDATE SET content = excluded.content, ",
            "saved_at = excluded.saved_at"
        ))?;
        for file in files {
            stmt.execute(params![file.name, file.content, &now])?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Lists all stored files in the order they were saved.
pub fn list(conn: &Connection) -> Result<Vec<UploadedFile>, Error> {
    let mut stmt = conn.prepare("SELECT name, content FROM guideline_files ORDER BY rowid")?;

    let file_iter = stmt.query_map([], |row| {
        Ok(UploadedFile {
            name: row.get(0)?,
            content: row.get(1)?,
        })
    })?;

    let files = file_iter.collect::<Result<Vec<UploadedFile>, _>>()?;
    Ok(files)
}

/// Deletes every row, returning how many were removed.
pub fn delete_all(conn: &Connection) -> Result<usize, Error> {
    Ok(conn.execute("DELETE FROM guideline_files", [])?)
}
