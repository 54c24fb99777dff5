use crate::Database;
use crate::models::{
    ContentRow, ContributorRow, NewContent, NewWall, UserRow, WallChanges, WallRow,
};
use anyhow::{Result, anyhow, bail};
use rusqlite::{Connection, Row, params};
use tracing::debug;

/// Give up on random identifiers after this many collisions in a row.
const MAX_ID_ATTEMPTS: usize = 100;

const USER_COLUMNS: &str = "id, email, full_name, password, is_active, is_admin, created_at";
const WALL_COLUMNS: &str =
    "id, title, description, unique_url, passcode, is_public, admin_id, created_at, updated_at";
const CONTRIBUTOR_COLUMNS: &str =
    "id, email, wall_id, is_active, invite_token, invited_at, accepted_at";
const CONTENT_COLUMNS: &str = "id, wall_id, contributor_id, content_type, text, image_url, image_urls, author_name, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, full_name: &str, password_hash: &str) -> Result<UserRow> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (email, full_name, password) VALUES (?1, ?2, ?3)",
                (email, full_name, password_hash),
            )?;
            let id = tx.last_insert_rowid();
            query_user_by_id(tx, id)?.ok_or_else(|| anyhow!("User {} missing after insert", id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Walls --

    /// Inserts a wall under a fresh slug. `next_slug` is called until it
    /// yields one no other wall uses.
    pub fn create_wall(
        &self,
        new: &NewWall<'_>,
        mut next_slug: impl FnMut() -> String,
    ) -> Result<WallRow> {
        self.with_tx(|tx| {
            let slug = unused_value(&mut next_slug, |candidate| {
                exists(tx, "SELECT 1 FROM walls WHERE unique_url = ?1", candidate)
            })?;

            tx.execute(
                "INSERT INTO walls (title, description, unique_url, passcode, admin_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.title, new.description, slug, new.passcode, new.admin_id],
            )?;
            let id = tx.last_insert_rowid();
            query_wall(tx, id)?.ok_or_else(|| anyhow!("Wall {} missing after insert", id))
        })
    }

    pub fn get_wall(&self, id: i64) -> Result<Option<WallRow>> {
        self.with_conn(|conn| query_wall(conn, id))
    }

    pub fn get_wall_by_url(&self, unique_url: &str) -> Result<Option<WallRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {WALL_COLUMNS} FROM walls WHERE unique_url = ?1"),
                [unique_url],
                wall_from_row,
            )
            .optional()
        })
    }

    pub fn list_walls_by_admin(&self, admin_id: i64) -> Result<Vec<WallRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WALL_COLUMNS} FROM walls WHERE admin_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([admin_id], wall_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Applies the provided fields. Returns `None` if the wall does not exist.
    pub fn update_wall(&self, id: i64, changes: &WallChanges<'_>) -> Result<Option<WallRow>> {
        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE walls
                 SET title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     is_public = COALESCE(?4, is_public),
                     updated_at = datetime('now')
                 WHERE id = ?1",
                params![id, changes.title, changes.description, changes.is_public],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_wall(tx, id)
        })
    }

    /// Deletes a wall together with its contributors and content.
    /// Returns the stored image URLs the removed content referenced.
    pub fn delete_wall(&self, id: i64) -> Result<Vec<String>> {
        self.with_tx(|tx| {
            let images = images_where(tx, "wall_id = ?1", id)?;
            tx.execute("DELETE FROM walls WHERE id = ?1", [id])?;
            Ok(images)
        })
    }

    // -- Contributors --

    /// Creates an invited (not yet accepted) contributor.
    /// Returns `None` if the email is already on this wall.
    pub fn invite_contributor(
        &self,
        wall_id: i64,
        email: &str,
        mut next_token: impl FnMut() -> String,
    ) -> Result<Option<ContributorRow>> {
        self.with_tx(|tx| {
            if query_contributor_by_email(tx, wall_id, email)?.is_some() {
                return Ok(None);
            }
            insert_contributor(tx, wall_id, email, false, &mut next_token).map(Some)
        })
    }

    /// Passcode self-registration. Reuses the existing row (and its token)
    /// when the email is already on the wall, otherwise creates an accepted
    /// contributor. Revoked contributors are returned untouched; callers
    /// must check `is_active`.
    pub fn find_or_create_contributor(
        &self,
        wall_id: i64,
        email: &str,
        mut next_token: impl FnMut() -> String,
    ) -> Result<ContributorRow> {
        self.with_tx(|tx| match query_contributor_by_email(tx, wall_id, email)? {
            Some(existing) if existing.is_active && existing.accepted_at.is_none() => {
                mark_accepted(tx, existing.id)?;
                query_contributor(tx, existing.id)?
                    .ok_or_else(|| anyhow!("Contributor {} missing after update", existing.id))
            }
            Some(existing) => Ok(existing),
            None => insert_contributor(tx, wall_id, email, true, &mut next_token),
        })
    }

    pub fn get_contributor(&self, id: i64) -> Result<Option<ContributorRow>> {
        self.with_conn(|conn| query_contributor(conn, id))
    }

    pub fn get_contributor_by_token(&self, token: &str) -> Result<Option<ContributorRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE invite_token = ?1"),
                [token],
                contributor_from_row,
            )
            .optional()
        })
    }

    pub fn get_contributor_by_email(&self, wall_id: i64, email: &str) -> Result<Option<ContributorRow>> {
        self.with_conn(|conn| query_contributor_by_email(conn, wall_id, email))
    }

    pub fn list_contributors(&self, wall_id: i64) -> Result<Vec<ContributorRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE wall_id = ?1
                 ORDER BY invited_at, id"
            ))?;
            let rows = stmt
                .query_map([wall_id], contributor_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_contributor_active(&self, id: i64, is_active: bool) -> Result<Option<ContributorRow>> {
        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE contributors SET is_active = ?2 WHERE id = ?1",
                params![id, is_active],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_contributor(tx, id)
        })
    }

    /// Deletes a contributor and their content.
    /// Returns the stored image URLs the removed content referenced.
    pub fn delete_contributor(&self, id: i64) -> Result<Vec<String>> {
        self.with_tx(|tx| {
            let images = images_where(tx, "contributor_id = ?1", id)?;
            tx.execute("DELETE FROM contributors WHERE id = ?1", [id])?;
            Ok(images)
        })
    }

    // -- Content --

    /// Persists a post and marks its contributor accepted if this is their first.
    pub fn create_content(&self, new: &NewContent<'_>) -> Result<ContentRow> {
        let image_urls = new.image_urls.map(serde_json::to_string).transpose()?;

        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO contents
                    (wall_id, contributor_id, content_type, text, image_url, image_urls, author_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.wall_id,
                    new.contributor_id,
                    new.content_type,
                    new.text,
                    new.image_url,
                    image_urls,
                    new.author_name,
                ],
            )?;
            let id = tx.last_insert_rowid();
            mark_accepted(tx, new.contributor_id)?;
            query_content(tx, id)?.ok_or_else(|| anyhow!("Content {} missing after insert", id))
        })
    }

    /// A wall's posts, newest first.
    pub fn list_contents(&self, wall_id: i64) -> Result<Vec<ContentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTENT_COLUMNS} FROM contents WHERE wall_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([wall_id], content_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_content(&self, id: i64) -> Result<Option<ContentRow>> {
        self.with_conn(|conn| query_content(conn, id))
    }

    pub fn delete_content(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM contents WHERE id = ?1", [id])? > 0))
    }
}

fn unused_value(
    next: &mut impl FnMut() -> String,
    mut taken: impl FnMut(&str) -> Result<bool>,
) -> Result<String> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = next();
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        debug!("Generated identifier collided, retrying");
    }
    bail!("No unused identifier after {} attempts", MAX_ID_ATTEMPTS)
}

fn exists(conn: &Connection, sql: &str, value: &str) -> Result<bool> {
    Ok(conn.query_row(sql, [value], |_| Ok(())).optional()?.is_some())
}

fn insert_contributor(
    conn: &Connection,
    wall_id: i64,
    email: &str,
    accepted: bool,
    next_token: &mut impl FnMut() -> String,
) -> Result<ContributorRow> {
    let token = unused_value(next_token, |candidate| {
        exists(conn, "SELECT 1 FROM contributors WHERE invite_token = ?1", candidate)
    })?;

    conn.execute(
        "INSERT INTO contributors (email, wall_id, invite_token, accepted_at)
         VALUES (?1, ?2, ?3, CASE WHEN ?4 THEN datetime('now') END)",
        params![email, wall_id, token, accepted],
    )?;
    let id = conn.last_insert_rowid();
    query_contributor(conn, id)?.ok_or_else(|| anyhow!("Contributor {} missing after insert", id))
}

fn mark_accepted(conn: &Connection, contributor_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE contributors SET accepted_at = datetime('now')
         WHERE id = ?1 AND accepted_at IS NULL",
        [contributor_id],
    )?;
    Ok(())
}

fn images_where(conn: &Connection, filter: &str, id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("SELECT {CONTENT_COLUMNS} FROM contents WHERE {filter}"))?;
    let rows = stmt
        .query_map([id], content_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.iter().flat_map(ContentRow::stored_images).collect())
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        user_from_row,
    )
    .optional()
}

fn query_wall(conn: &Connection, id: i64) -> Result<Option<WallRow>> {
    conn.query_row(
        &format!("SELECT {WALL_COLUMNS} FROM walls WHERE id = ?1"),
        [id],
        wall_from_row,
    )
    .optional()
}

fn query_contributor(conn: &Connection, id: i64) -> Result<Option<ContributorRow>> {
    conn.query_row(
        &format!("SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE id = ?1"),
        [id],
        contributor_from_row,
    )
    .optional()
}

fn query_contributor_by_email(
    conn: &Connection,
    wall_id: i64,
    email: &str,
) -> Result<Option<ContributorRow>> {
    conn.query_row(
        &format!("SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE wall_id = ?1 AND email = ?2"),
        params![wall_id, email],
        contributor_from_row,
    )
    .optional()
}

fn query_content(conn: &Connection, id: i64) -> Result<Option<ContentRow>> {
    conn.query_row(
        &format!("SELECT {CONTENT_COLUMNS} FROM contents WHERE id = ?1"),
        [id],
        content_from_row,
    )
    .optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password: row.get(3)?,
        is_active: row.get(4)?,
        is_admin: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn wall_from_row(row: &Row<'_>) -> rusqlite::Result<WallRow> {
    Ok(WallRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        unique_url: row.get(3)?,
        passcode: row.get(4)?,
        is_public: row.get(5)?,
        admin_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn contributor_from_row(row: &Row<'_>) -> rusqlite::Result<ContributorRow> {
    Ok(ContributorRow {
        id: row.get(0)?,
        email: row.get(1)?,
        wall_id: row.get(2)?,
        is_active: row.get(3)?,
        invite_token: row.get(4)?,
        invited_at: row.get(5)?,
        accepted_at: row.get(6)?,
    })
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<ContentRow> {
    // image_urls is a JSON array of strings
    let image_urls = row
        .get::<_, Option<String>>(6)?
        .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ContentRow {
        id: row.get(0)?,
        wall_id: row.get(1)?,
        contributor_id: row.get(2)?,
        content_type: row.get(3)?,
        text: row.get(4)?,
        image_url: row.get(5)?,
        image_urls,
        author_name: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
