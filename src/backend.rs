use std::path::{Path, PathBuf};

use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool};

use log::{error, info};

use crate::session::SessionData;
use crate::time::Timestamp;
use crate::user::User;

#[derive(Debug)]
pub enum StoreError {
    /// A uniqueness constraint fired, i.e. the username is taken.
    Duplicate,
    Other(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            // sqlite SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
            if let Some(code) = db.code() {
                if matches!(&*code, "1555" | "2067") {
                    return Self::Duplicate;
                }
            }
        }

        Self::Other(e.to_string())
    }
}

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct Backend(pub Pool<Sqlite>);

fn into_sql(path: &Path) -> PathBuf {
    path.join("club.sql")
}

pub async fn init(data_dir: &Path) {
    let final_path = format!(
        "sqlite://{}",
        into_sql(data_dir).to_str().expect("non utf-8 data")
    );
    match Sqlite::create_database(&final_path).await {
        Ok(()) => {
            info!("Using {}", &final_path);
        }
        Err(e) => {
            let sqlx::Error::Database(db_err) = e else {
                panic!("error creating database: {e}");
            };

            panic!("sql db error: {db_err:?}");
        }
    }
}

async fn ensure_sessions_table(pool: &Pool<Sqlite>) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            sid TEXT NOT NULL PRIMARY KEY,
            data TEXT NOT NULL,
            expires INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .map(|_| ())
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Self {
        let db_pathbuf = into_sql(data_dir);
        let db_path = db_pathbuf.to_str().expect("non utf-8 data");
        let pool = match SqlitePool::connect(db_path).await {
            Ok(pool) => pool,
            Err(_err) => {
                init(data_dir).await;
                SqlitePool::connect(db_path).await.expect("db connection")
            }
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migration");

        ensure_sessions_table(&pool).await.expect("sessions table");

        Self(pool)
    }
}

impl Backend {
    pub async fn add_user(&self, username: &str, pwhash: &str) -> Result<User> {
        sqlx::query(
            "
            INSERT INTO users (username, pwhash)
            VALUES (?, ?)
            ",
        )
        .bind(username)
        .bind(pwhash)
        .execute(&self.0)
        .await
        .map_err(|e| {
            let e = StoreError::from(e);
            match &e {
                StoreError::Duplicate => info!("username {username} already taken"),
                StoreError::Other(msg) => error!("couldn't insert user {username}: {msg}"),
            }
            e
        })?;

        Ok(User {
            username: username.to_string(),
            pwhash: pwhash.to_string(),
        })
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "
            SELECT username, pwhash
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't query for user {username}: {e:?}");
            e.into()
        })
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, User>(
            "
            SELECT username, pwhash
            FROM users
            ORDER BY username
            ",
        )
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't list users: {e:?}");
            e.into()
        })
    }
}

impl Backend {
    pub async fn create_session(
        &self,
        sid: &str,
        data: &SessionData,
        expires: Timestamp,
    ) -> Result<()> {
        let blob = serde_json::to_string(data)
            .map_err(|e| StoreError::Other(format!("couldn't serialise session: {e}")))?;

        sqlx::query(
            "
            INSERT INTO sessions (sid, data, expires)
            VALUES (?, ?, ?)
            ",
        )
        .bind(sid)
        .bind(blob)
        .bind(expires)
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| {
            error!("couldn't insert session: {e:?}");
            e.into()
        })
    }

    /// Expired sessions are indistinguishable from absent ones.
    pub async fn find_session(&self, sid: &str, now: Timestamp) -> Result<Option<SessionData>> {
        let row = sqlx::query_as::<_, (String,)>(
            "
            SELECT data
            FROM sessions
            WHERE sid = ?
                AND expires > ?
            ",
        )
        .bind(sid)
        .bind(now)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't query for session {sid}: {e:?}");
            StoreError::from(e)
        })?;

        match row {
            None => Ok(None),
            Some((blob,)) => match serde_json::from_str(&blob) {
                Ok(data) => Ok(Some(data)),
                Err(e) => {
                    error!("corrupt session blob for {sid}: {e:?}");
                    Ok(None)
                }
            },
        }
    }

    pub async fn delete_expired_sessions(&self, now: Timestamp) -> Result<u64> {
        sqlx::query(
            "
            DELETE FROM sessions
            WHERE expires <= ?
            ",
        )
        .bind(now)
        .execute(&self.0)
        .await
        .map(|done| done.rows_affected())
        .map_err(|e| {
            error!("couldn't purge sessions: {e:?}");
            e.into()
        })
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    use sqlx::sqlite::SqlitePoolOptions;

    pub async fn create_db() -> Backend {
        // a single connection, so the in-memory db is shared
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        ensure_sessions_table(&pool).await.unwrap();

        Backend(pool)
    }

    fn session(username: &str) -> SessionData {
        SessionData {
            logged_in: true,
            username: username.into(),
        }
    }

    #[tokio::test]
    async fn duplicate_usernames_rejected() {
        let db = create_db().await;

        db.add_user("alice", "hash1").await.unwrap();
        let err = db.add_user("alice", "hash2").await.unwrap_err();

        assert!(matches!(err, StoreError::Duplicate));

        // the original row is untouched
        let user = db.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.pwhash, "hash1");
    }

    #[tokio::test]
    async fn find_user_absent() {
        let db = create_db().await;

        assert!(db.find_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_expiry_filters_lookup() {
        let db = create_db().await;
        let now = Timestamp::from_i64(100);

        db.create_session("live", &session("alice"), Timestamp::from_i64(200))
            .await
            .unwrap();
        db.create_session("stale", &session("bob"), Timestamp::from_i64(50))
            .await
            .unwrap();

        let found = db.find_session("live", now).await.unwrap().unwrap();
        assert_eq!(found.username, "alice");
        assert!(found.logged_in);

        assert!(db.find_session("stale", now).await.unwrap().is_none());
        assert!(db.find_session("missing", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let db = create_db().await;
        let now = Timestamp::from_i64(100);

        db.create_session("live", &session("alice"), Timestamp::from_i64(200))
            .await
            .unwrap();
        db.create_session("stale", &session("bob"), Timestamp::from_i64(50))
            .await
            .unwrap();

        assert_eq!(db.delete_expired_sessions(now).await.unwrap(), 1);

        assert!(db.find_session("live", now).await.unwrap().is_some());
        assert_eq!(db.delete_expired_sessions(now).await.unwrap(), 0);
    }
}
