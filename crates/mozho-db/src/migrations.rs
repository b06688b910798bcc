use rusqlite::Connection;
use tracing::info;

/// Timestamps are RFC 3339 UTC with microseconds so text order is time order.
pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chat_rooms (
            id          TEXT PRIMARY KEY,
            name        TEXT,
            is_group    INTEGER NOT NULL DEFAULT 0,
            -- 'low:high' user ids of a direct room, NULL for groups
            pair_key    TEXT UNIQUE,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_room_members (
            room_id     TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (room_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON chat_room_members(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            room_id         TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            algorithm       TEXT NOT NULL,
            encryption_key  TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);

        CREATE TABLE IF NOT EXISTS attachments (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            object_key  TEXT NOT NULL,
            file_name   TEXT NOT NULL,
            mime_type   TEXT NOT NULL,
            size        INTEGER NOT NULL,
            url         TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_message
            ON attachments(message_id);

        CREATE TABLE IF NOT EXISTS message_status (
            message_id    TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id       TEXT NOT NULL,
            is_delivered  INTEGER NOT NULL DEFAULT 0,
            is_read       INTEGER NOT NULL DEFAULT 0,
            updated_at    TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
