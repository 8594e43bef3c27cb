use rusqlite::{params, OptionalExtension};

use super::apps::parse_rfc3339;
use super::IndexedStore;
use crate::error::StoreError;
use crate::models::{Crash, CrashGroup, GroupStatus};

/// Filters accepted by [`IndexedStore::list_groups`]. Missing filters are
/// wildcards.
#[derive(Debug, Default, Clone)]
pub struct GroupFilter {
    pub app_id: Option<String>,
    pub status: Option<GroupStatus>,
    pub error_type: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSort {
    FirstSeen,
    LastSeen,
    OccurrenceCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

pub struct GroupPage {
    pub groups: Vec<CrashGroup>,
    pub total: i64,
}

impl IndexedStore {
    /// The atomic primitive: selects the group for `(app_id,
    /// fingerprint)`, bumping it if present or inserting a fresh row if
    /// not, returning whether the row was newly created.
    pub fn get_or_create_group(&mut self, crash: &Crash) -> Result<(CrashGroup, bool), StoreError> {
        let tx = self.conn.transaction()?;

        let existing: Option<(String, String, i64)> = tx
            .query_row(
                "SELECT id, last_seen, occurrence_count FROM crash_groups
                 WHERE app_id = ?1 AND fingerprint = ?2",
                params![crash.app_id, crash.fingerprint],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (group_id, is_new) = if let Some((id, last_seen_str, occurrence_count)) = existing {
            let last_seen = parse_rfc3339(&last_seen_str).max(crash.created_at);
            tx.execute(
                "UPDATE crash_groups SET last_seen = ?1, occurrence_count = ?2 WHERE id = ?3",
                params![last_seen.to_rfc3339(), occurrence_count + 1, id],
            )?;
            (id, false)
        } else {
            let id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO crash_groups
                    (id, app_id, fingerprint, error_type, error_message,
                     first_seen, last_seen, occurrence_count, status, assigned_to, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1, 'open', NULL, NULL)",
                params![
                    id,
                    crash.app_id,
                    crash.fingerprint,
                    crash.error_type,
                    crash.error_message,
                    crash.created_at.to_rfc3339(),
                ],
            )?;
            (id, true)
        };

        let group = query_group_in(&tx, &group_id)?.ok_or(StoreError::NotFound)?;
        tx.commit()?;
        Ok((group, is_new))
    }

    pub fn get_group(&self, id: &str) -> Result<Option<CrashGroup>, StoreError> {
        query_group_in(&self.conn, id)
    }

    pub fn list_groups(
        &self,
        filter: &GroupFilter,
        sort: GroupSort,
        direction: SortDirection,
        offset: i64,
        limit: i64,
    ) -> Result<GroupPage, StoreError> {
        let mut where_clauses = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(app_id) = &filter.app_id {
            where_clauses.push("app_id = ?".to_string());
            args.push(Box::new(app_id.clone()));
        }
        if let Some(status) = &filter.status {
            where_clauses.push("status = ?".to_string());
            args.push(Box::new(status.as_str().to_string()));
        }
        if let Some(error_type) = &filter.error_type {
            where_clauses.push("error_type = ?".to_string());
            args.push(Box::new(error_type.clone()));
        }
        if let Some(search) = &filter.search {
            where_clauses.push("(error_type || error_message) LIKE ?".to_string());
            args.push(Box::new(format!("%{}%", search)));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM crash_groups {}", where_sql);
        let total: i64 = self.conn.query_row(
            &count_sql,
            rusqlite::params_from_iter(args.iter().map(|b| b.as_ref())),
            |row| row.get(0),
        )?;

        let sort_col = match sort {
            GroupSort::FirstSeen => "first_seen",
            GroupSort::LastSeen => "last_seen",
            GroupSort::OccurrenceCount => "occurrence_count",
        };
        let dir = match direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };

        let sql = format!(
            "SELECT id, app_id, fingerprint, error_type, error_message,
                    first_seen, last_seen, occurrence_count, status, assigned_to, notes
             FROM crash_groups {} ORDER BY {} {} LIMIT ? OFFSET ?",
            where_sql, sort_col, dir
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut all_args = args;
        all_args.push(Box::new(limit));
        all_args.push(Box::new(offset));

        let rows = stmt.query_map(
            rusqlite::params_from_iter(all_args.iter().map(|b| b.as_ref())),
            row_to_group,
        )?;
        let groups = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(GroupPage { groups, total })
    }

    /// Updates the mutable fields of a group. Per Open Question 1, this
    /// never fires an alert.
    pub fn update_group(
        &self,
        id: &str,
        status: Option<GroupStatus>,
        assigned_to: Option<Option<&str>>,
        notes: Option<Option<&str>>,
    ) -> Result<(), StoreError> {
        if let Some(status) = status {
            self.conn.execute(
                "UPDATE crash_groups SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
        }
        if let Some(assigned_to) = assigned_to {
            self.conn.execute(
                "UPDATE crash_groups SET assigned_to = ?1 WHERE id = ?2",
                params![assigned_to, id],
            )?;
        }
        if let Some(notes) = notes {
            self.conn.execute(
                "UPDATE crash_groups SET notes = ?1 WHERE id = ?2",
                params![notes, id],
            )?;
        }
        Ok(())
    }
}

fn query_group_in(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<Option<CrashGroup>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, app_id, fingerprint, error_type, error_message,
                first_seen, last_seen, occurrence_count, status, assigned_to, notes
         FROM crash_groups WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map([id], row_to_group)?;
    rows.next().transpose().map_err(StoreError::from)
}

fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<CrashGroup> {
    let first_seen: String = row.get(5)?;
    let last_seen: String = row.get(6)?;
    let status: String = row.get(8)?;
    Ok(CrashGroup {
        id: row.get(0)?,
        app_id: row.get(1)?,
        fingerprint: row.get(2)?,
        error_type: row.get(3)?,
        error_message: row.get(4)?,
        first_seen: parse_rfc3339(&first_seen),
        last_seen: parse_rfc3339(&last_seen),
        occurrence_count: row.get(7)?,
        status: GroupStatus::parse(&status).unwrap_or(GroupStatus::Open),
        assigned_to: row.get(9)?,
        notes: row.get(10)?,
    })
}
