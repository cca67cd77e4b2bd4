//! MySQL backend (`fetch_cycles`, `telegram_sessions`, `attachments`, `messages`).

use async_trait::async_trait;
use mysql_async::{params, prelude::Queryable, OptsBuilder, Params, Pool, TxOpts};
use tracing::{debug, info, trace};

use super::{split_batch, ArchiveStore};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{ArchiveStats, AttachmentInput, BatchReport, Cursor, MessageInput, MessageRow};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS fetch_cycles (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        channel VARCHAR(255) NOT NULL,
        offset_id INT NOT NULL DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
        UNIQUE KEY uq_fetch_cycle_channel (channel)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS telegram_sessions (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        session_string MEDIUMTEXT NOT NULL,
        created_at DATETIME(6) DEFAULT CURRENT_TIMESTAMP(6),
        KEY idx_session_created (created_at)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attachments (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        media_id VARCHAR(64) NOT NULL,
        attachment_type ENUM('PHOTO', 'DOCUMENT', 'WEBPAGE') NOT NULL,
        mime_type VARCHAR(255) NULL,
        UNIQUE KEY uq_attachment_media (media_id, attachment_type)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        channel_id BIGINT NOT NULL,
        channel_name VARCHAR(255) NOT NULL,
        message_id INT NOT NULL,
        date DATETIME NULL,
        message MEDIUMTEXT NULL,
        reply_to_msg_id INT NULL,
        replies INT NOT NULL DEFAULT 0,
        attachments JSON NOT NULL,
        UNIQUE KEY uq_channel_message (channel_id, message_id),
        INDEX idx_channel_name (channel_name)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
    "#,
];

const UPSERT_ATTACHMENT_SQL: &str = r#"
    INSERT INTO attachments (media_id, attachment_type, mime_type)
    VALUES (:media_id, :attachment_type, :mime_type)
    ON DUPLICATE KEY UPDATE
        mime_type = VALUES(mime_type)
"#;

const UPSERT_MESSAGE_SQL: &str = r#"
    INSERT INTO messages
    (channel_id, channel_name, message_id, date, message, reply_to_msg_id, replies, attachments)
    VALUES (:channel_id, :channel_name, :message_id, :date, :message, :reply_to_msg_id,
            :replies, :attachments)
    ON DUPLICATE KEY UPDATE
        date = VALUES(date),
        message = VALUES(message),
        reply_to_msg_id = VALUES(reply_to_msg_id),
        replies = VALUES(replies),
        attachments = VALUES(attachments)
"#;

pub struct MySqlStore {
    pool: Pool,
}

impl MySqlStore {
    /// Build the pool. No connection is opened until the first query.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = match &config.url {
            Some(url) => Pool::from_url(url.as_str())
                .map_err(|e| Error::Config(format!("Invalid DATABASE_URL: {}", e)))?,
            None => {
                let opts = OptsBuilder::default()
                    .ip_or_hostname(config.host.clone())
                    .tcp_port(config.port)
                    .db_name(Some(config.database.clone()))
                    .user(Some(config.user.clone()))
                    .pass(Some(config.password.clone()));
                Pool::new(opts)
            }
        };

        Ok(Self { pool })
    }

    /// Build the pool and make sure every table exists.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let store = Self::new(config)?;
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        for statement in SCHEMA {
            conn.query_drop(statement).await?;
        }
        debug!("MySQL schema is up to date");
        Ok(())
    }

    async fn conn(&self) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| Error::ConnectionError(e.to_string()))
    }
}

fn attachment_params(attachment: &AttachmentInput) -> Params {
    params! {
        "media_id" => &attachment.media_id,
        "attachment_type" => attachment.attachment_type.as_str(),
        "mime_type" => &attachment.mime_type,
    }
}

fn message_params(row: &MessageRow) -> Result<Params> {
    Ok(params! {
        "channel_id" => row.channel_id,
        "channel_name" => &row.channel_name,
        "message_id" => row.message_id,
        "date" => row.date.map(|d| d.naive_utc()),
        "message" => &row.message,
        "reply_to_msg_id" => row.reply_to_msg_id,
        "replies" => row.replies,
        "attachments" => serde_json::to_string(&row.attachments)?,
    })
}

#[async_trait]
impl ArchiveStore for MySqlStore {
    async fn get_cursor(&self, channel: &str) -> Result<Cursor> {
        let mut conn = self.conn().await?;

        let existing: Option<i32> = conn
            .exec_first(
                "SELECT offset_id FROM fetch_cycles WHERE channel = :channel",
                params! { "channel" => channel },
            )
            .await?;

        let offset_id = match existing {
            Some(offset_id) => offset_id,
            None => {
                conn.exec_drop(
                    "INSERT IGNORE INTO fetch_cycles (channel) VALUES (:channel)",
                    params! { "channel" => channel },
                )
                .await?;
                debug!(channel, "Created fetch cycle");
                0
            }
        };

        Ok(Cursor {
            channel: channel.to_string(),
            offset_id,
        })
    }

    async fn save_cursor(&self, channel: &str, offset_id: i32) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.exec_drop(
            r#"
            INSERT INTO fetch_cycles (channel, offset_id)
            VALUES (:channel, :offset_id)
            ON DUPLICATE KEY UPDATE offset_id = VALUES(offset_id)
            "#,
            params! { "channel" => channel, "offset_id" => offset_id },
        )
        .await?;
        Ok(())
    }

    async fn latest_session(&self) -> Result<String> {
        let mut conn = self.conn().await?;
        let session: Option<String> = conn
            .query_first(
                "SELECT session_string FROM telegram_sessions ORDER BY created_at DESC, id DESC LIMIT 1",
            )
            .await?;
        Ok(session.unwrap_or_default())
    }

    async fn save_session(&self, session: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.exec_drop(
            "INSERT INTO telegram_sessions (session_string) VALUES (:session_string)",
            params! { "session_string" => session },
        )
        .await?;
        Ok(())
    }

    async fn write_batch(&self, messages: Vec<MessageInput>) -> Result<BatchReport> {
        let (attachments, rows) = split_batch(messages);
        let attachment_rows: Vec<Params> = attachments.iter().map(attachment_params).collect();
        let message_rows = rows.iter().map(message_params).collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn().await?;
        // Dropping the transaction without commit rolls it back.
        let mut tx = conn.start_transaction(TxOpts::default()).await?;
        if !attachment_rows.is_empty() {
            tx.exec_batch(UPSERT_ATTACHMENT_SQL, attachment_rows).await?;
        }
        if !message_rows.is_empty() {
            tx.exec_batch(UPSERT_MESSAGE_SQL, message_rows).await?;
        }
        tx.commit().await?;

        trace!(
            "Messages {} processed",
            rows.iter()
                .map(|r| r.message_id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(BatchReport {
            attachments: attachments.len(),
            messages: rows.len(),
        })
    }

    async fn stats(&self, channel: &str) -> Result<ArchiveStats> {
        let mut conn = self.conn().await?;

        let cursor: Option<i32> = conn
            .exec_first(
                "SELECT offset_id FROM fetch_cycles WHERE channel = :channel",
                params! { "channel" => channel },
            )
            .await?;
        let messages: Option<u64> = conn
            .exec_first(
                "SELECT COUNT(*) FROM messages WHERE channel_name = :channel",
                params! { "channel" => channel },
            )
            .await?;
        let attachments: Option<u64> = conn.query_first("SELECT COUNT(*) FROM attachments").await?;
        let sessions: Option<u64> = conn
            .query_first("SELECT COUNT(*) FROM telegram_sessions")
            .await?;

        Ok(ArchiveStats {
            cursor: cursor.map(|offset_id| Cursor {
                channel: channel.to_string(),
                offset_id,
            }),
            messages: messages.unwrap_or(0),
            attachments: attachments.unwrap_or(0),
            sessions: sessions.unwrap_or(0),
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.clone().disconnect().await?;
        info!("MySQL connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachmentType;

    fn db_config() -> DatabaseConfig {
        DatabaseConfig {
            url: None,
            host: "127.0.0.1".into(),
            port: 3306,
            database: "telegram_history".into(),
            user: "telegram_history".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn new_builds_pool_without_connecting() {
        assert!(MySqlStore::new(&db_config()).is_ok());
    }

    #[tokio::test]
    async fn close_after_failed_schema_setup() {
        let mut config = db_config();
        // Nothing listens on port 1
        config.port = 1;
        let store = MySqlStore::new(&config).unwrap();

        assert!(store.ensure_schema().await.is_err());
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn new_rejects_malformed_url() {
        let mut config = db_config();
        config.url = Some("postgres://nope".into());

        let err = MySqlStore::new(&config).err().expect("invalid url");
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn message_params_encode_attachment_list_as_json() {
        let row = MessageRow {
            channel_id: 1,
            channel_name: "demo".into(),
            message_id: 102,
            date: None,
            message: None,
            reply_to_msg_id: None,
            replies: 0,
            attachments: vec!["555".into()],
        };

        let params = message_params(&row).unwrap();
        match params {
            Params::Named(map) => {
                let value = map.get("attachments".as_bytes()).expect("attachments param");
                assert_eq!(value, &mysql_async::Value::from("[\"555\"]"));
            }
            other => panic!("expected named params, got {:?}", other),
        }
    }

    #[test]
    fn attachment_params_use_enum_labels() {
        let attachment = AttachmentInput {
            media_id: "9".into(),
            attachment_type: AttachmentType::Document,
            mime_type: Some("image/png".into()),
        };

        match attachment_params(&attachment) {
            Params::Named(map) => {
                assert_eq!(
                    map.get("attachment_type".as_bytes()),
                    Some(&mysql_async::Value::from("DOCUMENT"))
                );
            }
            other => panic!("expected named params, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore] // Requires a running MySQL (DATABASE_URL)
    async fn cursor_and_batch_round_trip_against_mysql() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let mut config = db_config();
        config.url = Some(url);

        let store = MySqlStore::connect(&config).await.expect("connect");
        let cursor = store.get_cursor("integration_test").await.expect("cursor");
        store
            .save_cursor("integration_test", cursor.offset_id)
            .await
            .expect("save cursor");
        store.close().await.expect("close");
    }
}
