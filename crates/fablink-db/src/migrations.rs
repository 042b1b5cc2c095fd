use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Minimal identity projection; onboarding owns the full profile
        -- elsewhere. Only what counterpart resolution needs lives here.
        CREATE TABLE IF NOT EXISTS profiles (
            id            TEXT PRIMARY KEY,
            role          TEXT NOT NULL,
            display_name  TEXT NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id                 TEXT PRIMARY KEY,
            buyer_id           TEXT NOT NULL,
            manufacturer_id    TEXT NOT NULL,
            last_message_text  TEXT,
            last_message_at    TEXT,
            archived           INTEGER NOT NULL DEFAULT 0,
            created_at         TEXT NOT NULL,
            UNIQUE(buyer_id, manufacturer_id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_buyer
            ON conversations(buyer_id, last_message_at);
        CREATE INDEX IF NOT EXISTS idx_conversations_manufacturer
            ON conversations(manufacturer_id, last_message_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_role     TEXT NOT NULL,
            sender_id       TEXT NOT NULL,
            body            TEXT NOT NULL DEFAULT '',
            summary         TEXT NOT NULL DEFAULT '',
            requirement_id  TEXT,
            ai_design_id    TEXT,
            client_temp_id  TEXT,
            read            INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(conversation_id, read);

        CREATE TABLE IF NOT EXISTS attachments (
            id             TEXT PRIMARY KEY,
            message_id     TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            url            TEXT NOT NULL,
            mime_type      TEXT,
            byte_size      INTEGER,
            file_type      TEXT NOT NULL,
            original_name  TEXT,
            width          INTEGER,
            height         INTEGER,
            duration_secs  REAL,
            thumbnail_url  TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_message
            ON attachments(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
