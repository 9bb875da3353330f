use async_trait::async_trait;
use sqlx::{postgres::PgRow, types::Json, Connection, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{conflict, not_found, registration_keys, UserStore, SCHEMA};
use crate::auth::{
    error::{ErrorKind, Result},
    keys::{Key, KeyAttribs, KeyId},
    models::{User, UserData},
    utils::{hash_token, random_token},
};

const USER_COLUMNS: &str =
    "id, kind, username, email, password_hash, data, created_at, verified_at";

/// Postgres-backed [`UserStore`].
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema.
    ///
    /// # Errors
    /// Returns `InternalIssue` if any statement fails.
    pub async fn migrate(&self) -> Result<()> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| ErrorKind::InternalIssue.hint("failed to apply schema").caused_by(err))?;
        Ok(())
    }

    /// Keys bound to a user, oldest first.
    ///
    /// # Errors
    /// Returns `InternalIssue` on query failure.
    pub async fn keys_of(&self, user_id: Uuid) -> Result<Vec<Key>> {
        let query = "SELECT key, attribs FROM keys WHERE user_id = $1 ORDER BY key";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .map_err(internal("failed to load keys"))?;

        rows.iter()
            .map(|row| {
                let key: String = row.try_get("key").map_err(internal("bad key row"))?;
                let Json(attribs): Json<KeyAttribs> =
                    row.try_get("attribs").map_err(internal("bad key row"))?;
                Ok(Key {
                    key: KeyId::parse(&key)?,
                    attribs,
                })
            })
            .collect()
    }
}

fn internal(hint: &'static str) -> impl Fn(sqlx::Error) -> crate::auth::error::Error {
    move |err| ErrorKind::InternalIssue.hint(hint).caused_by(err)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> std::result::Result<User, sqlx::Error> {
    let Json(data): Json<UserData> = row.try_get("data")?;
    Ok(User {
        id: row.try_get("id")?,
        kind: row.try_get("kind")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        data,
        created_at: row.try_get("created_at")?,
        verified_at: row.try_get("verified_at")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn register(&self, user: User, extra_keys: Vec<Key>) -> Result<User> {
        let keys = registration_keys(&user, extra_keys)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(internal("begin register transaction"))?;

        let query = r"
            INSERT INTO users
                (id, kind, username, email, password_hash, data, created_at, verified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user.id)
            .bind(&user.kind)
            .bind(user.username.as_deref())
            .bind(user.email.as_deref())
            .bind(user.password_hash.as_deref())
            .bind(Json(&user.data))
            .bind(user.created_at)
            .bind(user.verified_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .map_err(internal("failed to insert user"))?;

        let query = "INSERT INTO keys (key, user_id, attribs) VALUES ($1, $2, $3)";
        for key in &keys {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let inserted = sqlx::query(query)
                .bind(key.key.as_str())
                .bind(user.id)
                .bind(Json(&key.attribs))
                .execute(&mut *tx)
                .instrument(span)
                .await;

            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    let _ = tx.rollback().await;
                    return Err(conflict(&key.key));
                }
                Err(err) => return Err(internal("failed to insert key")(err)),
            }
        }

        tx.commit()
            .await
            .map_err(internal("commit register transaction"))?;

        Ok(user)
    }

    async fn resolve(&self, key: &KeyId) -> Result<Uuid> {
        let query = "SELECT user_id FROM keys WHERE key = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(internal("failed to resolve key"))?;

        match row {
            Some(row) => row.try_get("user_id").map_err(internal("bad key row")),
            None => Err(not_found()),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(internal("failed to load user"))?;

        match row {
            Some(row) => user_from_row(&row).map_err(internal("bad user row")),
            None => Err(not_found()),
        }
    }

    async fn issue_verification(&self, id: Uuid) -> Result<String> {
        let token = random_token(32)?;
        let query = "UPDATE users SET verify_token_hash = $2 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(hash_token(&token))
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(internal("failed to store verification token"))?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(token)
    }

    async fn verify(&self, id: Uuid, token: &str) -> Result<User> {
        let query = format!(
            "UPDATE users SET verified_at = NOW(), verify_token_hash = NULL \
             WHERE id = $1 AND verify_token_hash = $2 RETURNING {USER_COLUMNS}"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(hash_token(token))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(internal("failed to verify user"))?;

        match row {
            Some(row) => user_from_row(&row).map_err(internal("bad user row")),
            None => Err(not_found()),
        }
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .map_err(internal("failed to acquire database connection"))?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .map_err(internal("failed to ping database"))
    }
}
