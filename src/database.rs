use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use thiserror::Error;

use crate::data::{Dataset, RowDocument};

pub const DEFAULT_LOAD_LIMIT: i64 = 100;

const ACCOUNT_INDEXES: [&str; 2] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users (username)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to the database: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("Failed to encode student document: {0}")]
    Document(#[from] serde_json::Error),
    /// A unique index rejected the write; holds the `table.column` that clashed.
    #[error("Duplicate value for {0}")]
    Duplicate(String),
}

/// Turns SQLite's `UNIQUE constraint failed: users.username` into [`StoreError::Duplicate`].
fn unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            let column = message.rsplit(':').next().unwrap_or(message).trim();
            return StoreError::Duplicate(column.to_string());
        }
    }
    StoreError::Query(err)
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub role: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub document: RowDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub users: i64,
    pub students: i64,
    pub courses: i64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and makes sure the collections exist.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::Connection)?
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database.
        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;

        let db = Database { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                full_name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'user',
                created_at DATETIME NOT NULL,
                last_login DATETIME
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT,
                course TEXT,
                semester TEXT,
                document TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                uploaded_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_code TEXT NOT NULL,
                course_title TEXT NOT NULL DEFAULT '',
                credit_unit REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in ACCOUNT_INDEXES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Lookup indexes for students and courses on top of the account indexes.
    pub async fn create_indexes(&self) -> Result<(), StoreError> {
        const INDEXES: [&str; 5] = [
            "CREATE INDEX IF NOT EXISTS idx_students_student_id ON students (student_id)",
            "CREATE INDEX IF NOT EXISTS idx_students_uploaded_by ON students (uploaded_by)",
            "CREATE INDEX IF NOT EXISTS idx_students_uploaded_at ON students (uploaded_at)",
            "CREATE INDEX IF NOT EXISTS idx_students_course_semester ON students (course, semester)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_courses_code ON courses (course_code)",
        ];

        for statement in INDEXES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            async move {
                let sql = format!("SELECT COUNT(*) FROM {table}");
                sqlx::query_scalar::<_, i64>(&sql).fetch_one(&pool).await
            }
        };

        Ok(StoreStats {
            users: count("users").await?,
            students: count("students").await?,
            courses: count("courses").await?,
        })
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, full_name, role, created_at, last_login
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn insert_user(&self, user: &NewUser<'_>) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, role, created_at, last_login)
            VALUES (?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.full_name)
        .bind(user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(unique_violation)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stores each row as a JSON document of all its columns, tagged with its owner.
    pub async fn save_records(&self, owner: &str, dataset: &Dataset) -> Result<u64, StoreError> {
        let uploaded_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut saved = 0;

        for row in 0..dataset.n_rows() {
            let document = serde_json::to_string(&dataset.row_document(row))?;
            sqlx::query(
                r#"
                INSERT INTO students (student_id, course, semester, document, uploaded_by, uploaded_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(dataset.cell_text("student_id", row))
            .bind(dataset.cell_text("course", row))
            .bind(dataset.cell_text("semester", row))
            .bind(document)
            .bind(owner)
            .bind(uploaded_at)
            .execute(&mut *tx)
            .await?;
            saved += 1;
        }

        tx.commit().await?;
        Ok(saved)
    }

    /// The owner's records, newest upload first.
    pub async fn load_records(&self, owner: &str, limit: i64) -> Result<Vec<StoredRecord>, StoreError> {
        let rows: Vec<(i64, String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, document, uploaded_by, uploaded_at
            FROM students
            WHERE uploaded_by = ?
            ORDER BY uploaded_at DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, document, uploaded_by, uploaded_at)| -> Result<StoredRecord, StoreError> {
                Ok(StoredRecord {
                    id,
                    uploaded_by,
                    uploaded_at,
                    document: serde_json::from_str(&document)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{normalize, sample_table, RawTable};

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    fn user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            email,
            password_hash: "hash",
            full_name: "Avery Lee",
            role: "user",
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_round_trip_per_owner() {
        let db = memory_db().await;
        let dataset = normalize(&sample_table()).unwrap();
        let single = normalize(
            &RawTable::from_reader("hours_studied,final_grade,extra_curricular\n3,55,No\n".as_bytes()).unwrap(),
        )
        .unwrap();

        assert_eq!(db.save_records("avery", &dataset).await.unwrap(), 10);
        assert_eq!(db.save_records("blake", &single).await.unwrap(), 1);

        let loaded = db.load_records("avery", DEFAULT_LOAD_LIMIT).await.unwrap();
        assert_eq!(loaded.len(), 10);
        assert!(loaded.iter().all(|r| r.uploaded_by == "avery"));
        assert_eq!(loaded[0].document, dataset.row_document(0));

        let limited = db.load_records("avery", 3).await.unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[tokio::test]
    async fn newest_upload_comes_first() {
        let db = memory_db().await;
        let first = RawTable::from_reader(
            "student_id,hours_studied,final_grade,extra_curricular\nSTU001,3,55,No\n".as_bytes(),
        )
        .unwrap();
        let second = RawTable::from_reader(
            "student_id,hours_studied,final_grade,extra_curricular\nSTU002,6,71,Yes\n".as_bytes(),
        )
        .unwrap();

        db.save_records("avery", &normalize(&first).unwrap()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        db.save_records("avery", &normalize(&second).unwrap()).await.unwrap();

        let loaded = db.load_records("avery", DEFAULT_LOAD_LIMIT).await.unwrap();
        assert_eq!(loaded[0].document["student_id"], "STU002");
        assert_eq!(loaded[1].document["student_id"], "STU001");
    }

    #[tokio::test]
    async fn columns_outside_the_typed_record_are_persisted() {
        let db = memory_db().await;
        let raw = RawTable::from_reader(
            "student_id,hours_studied,final_grade,extra_curricular,advisor,attendance\n\
             STU001,4,62,Yes,Dr. Okafor,0.9\n"
                .as_bytes(),
        )
        .unwrap();
        db.save_records("avery", &normalize(&raw).unwrap()).await.unwrap();

        let loaded = db.load_records("avery", DEFAULT_LOAD_LIMIT).await.unwrap();
        assert_eq!(loaded[0].document["advisor"], "Dr. Okafor");
        assert_eq!(loaded[0].document["attendance"], 0.9);

        let json = serde_json::to_value(&loaded[0]).unwrap();
        assert_eq!(json["advisor"], "Dr. Okafor");
        assert_eq!(json["uploaded_by"], "avery");
    }

    #[tokio::test]
    async fn account_uniqueness_holds_without_init_db() {
        let db = memory_db().await;

        db.insert_user(&user("avery", "avery@example.com")).await.unwrap();
        assert!(db.username_exists("avery").await.unwrap());
        assert!(db.email_exists("avery@example.com").await.unwrap());

        match db.insert_user(&user("avery", "other@example.com")).await {
            Err(StoreError::Duplicate(column)) => assert_eq!(column, "users.username"),
            other => panic!("unexpected result: {other:?}"),
        }
        match db.insert_user(&user("blake", "avery@example.com")).await {
            Err(StoreError::Duplicate(column)) => assert_eq!(column, "users.email"),
            other => panic!("unexpected result: {other:?}"),
        }

        db.create_indexes().await.unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(
            stats,
            StoreStats {
                users: 1,
                students: 0,
                courses: 0
            }
        );
    }
}
