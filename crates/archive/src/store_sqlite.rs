use std::path::Path;

use {
    async_trait::async_trait,
    chrono::NaiveDateTime,
    dmrecall_common::{Error, Message, Result, format_timestamp, parse_timestamp},
    sqlx::{
        QueryBuilder, Sqlite, SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::debug,
};

use crate::store::MessageStore;

const SELECT_COLUMNS: &str =
    "SELECT message_id, name, timestamp, contents, attachments, link FROM messages";

/// Open (creating if needed) the archive database and run migrations.
///
/// `:memory:` opens a single-connection in-memory database.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let connected = if db_path == ":memory:" {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
    } else {
        if let Some(parent) = Path::new(db_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        SqlitePoolOptions::new().connect_with(options).await
    };
    let pool =
        connected.map_err(|e| Error::StoreRead(format!("failed to open {db_path}: {e}")))?;

    crate::schema::run_migrations(&pool).await?;
    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    message_id: i64,
    name: String,
    timestamp: String,
    contents: String,
    attachments: String,
    link: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let timestamp = parse_timestamp(&row.timestamp).map_err(|e| {
            Error::StoreRead(format!(
                "message {} has malformed timestamp {:?}: {e}",
                row.message_id, row.timestamp
            ))
        })?;
        Ok(Message {
            message_id: row.message_id,
            author: row.name,
            timestamp,
            contents: row.contents,
            attachments: row.attachments,
            link: row.link,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

fn read_err(e: sqlx::Error) -> Error {
    Error::StoreRead(e.to_string())
}

fn write_err(e: sqlx::Error) -> Error {
    Error::StoreWrite(e.to_string())
}

/// SQLite-backed message store.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_one<'e, E>(executor: E, message: &Message) -> std::result::Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO messages (message_id, name, timestamp, contents, attachments, link) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(message.message_id)
    .bind(&message.author)
    .bind(format_timestamp(&message.timestamp))
    .bind(&message.contents)
    .bind(&message.attachments)
    .bind(&message.link)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        insert_one(&self.pool, message).await.map_err(write_err)
    }

    async fn insert_batch(&self, messages: &[Message]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for message in messages {
            insert_one(&mut *tx, message).await.map_err(|e| {
                Error::StoreWrite(format!("message {}: {e}", message.message_id))
            })?;
        }
        tx.commit().await.map_err(write_err)?;
        Ok(messages.len())
    }

    async fn find_by_substring(&self, keywords: &[String]) -> Result<Vec<Message>> {
        let keywords: Vec<&str> = keywords
            .iter()
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(Error::InvalidQuery(
                "at least one non-blank keyword is required".into(),
            ));
        }

        // Keywords are bound, never spliced into the SQL text. `instr` matches
        // literally and case-sensitively, so LIKE wildcards need no escaping.
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE ");
        let mut clauses = qb.separated(" OR ");
        for keyword in &keywords {
            clauses.push("instr(contents, ");
            clauses.push_bind_unseparated(keyword.to_string());
            clauses.push_unseparated(") > 0");
        }
        qb.push(" ORDER BY id ASC");

        let rows: Vec<MessageRow> = qb
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;
        debug!(
            keywords = keywords.len(),
            matches = rows.len(),
            "substring search"
        );
        into_messages(rows)
    }

    async fn find_by_time_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE timestamp >= ? AND timestamp <= ? \
             ORDER BY timestamp ASC, id ASC"
        );
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(format_timestamp(&start))
            .bind(format_timestamp(&end))
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;
        into_messages(rows)
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(n as u64)
    }

    async fn author_counts(&self) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT name, COUNT(*) FROM messages GROUP BY name ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(read_err)?;
        Ok(rows.into_iter().map(|(name, n)| (name, n as u64)).collect())
    }

    async fn first_timestamp(&self) -> Result<Option<NaiveDateTime>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT MIN(timestamp) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;
        raw.map(|ts| {
            parse_timestamp(&ts)
                .map_err(|e| Error::StoreRead(format!("malformed timestamp {ts:?}: {e}")))
        })
        .transpose()
    }
}
