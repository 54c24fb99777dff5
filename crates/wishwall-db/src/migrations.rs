use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                email       TEXT NOT NULL UNIQUE,
                full_name   TEXT NOT NULL,
                password    TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                is_admin    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE walls (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                description TEXT,
                unique_url  TEXT NOT NULL UNIQUE,
                passcode    TEXT NOT NULL,
                is_public   INTEGER NOT NULL DEFAULT 0,
                admin_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT
            );

            CREATE INDEX idx_walls_admin ON walls(admin_id);

            CREATE TABLE contributors (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                email        TEXT NOT NULL,
                wall_id      INTEGER NOT NULL REFERENCES walls(id) ON DELETE CASCADE,
                is_active    INTEGER NOT NULL DEFAULT 1,
                invite_token TEXT NOT NULL UNIQUE,
                invited_at   TEXT NOT NULL DEFAULT (datetime('now')),
                accepted_at  TEXT,
                UNIQUE(email, wall_id)
            );

            CREATE TABLE contents (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                wall_id         INTEGER NOT NULL REFERENCES walls(id) ON DELETE CASCADE,
                contributor_id  INTEGER NOT NULL REFERENCES contributors(id) ON DELETE CASCADE,
                content_type    TEXT NOT NULL,
                text            TEXT,
                image_url       TEXT,
                image_urls      TEXT,
                author_name     TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_contents_wall ON contents(wall_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
