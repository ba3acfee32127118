use async_trait::async_trait;
use sqlx::postgres::PgDatabaseError;

use super::{Entity, FindOptions, Record};

/// Postgres SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `detail` names the offending column in parentheses, e.g. `Key (email)=(a@x.com) already exists.`
    #[error("unique violation ({code}): {detail}")]
    UniqueViolation { code: String, detail: String },

    #[error("unknown field {0}")]
    UnknownField(String),

    /// The targeted row vanished between lookup and write.
    #[error("row not found")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return StoreError::NotFound;
        }
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let detail = db
                    .try_downcast_ref::<PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .unwrap_or_else(|| db.message())
                    .to_string();
                return StoreError::UniqueViolation {
                    code: UNIQUE_VIOLATION.to_string(),
                    detail,
                };
            }
        }
        StoreError::Other(err.to_string())
    }
}

/// Durable typed storage for one entity type.
///
/// Every read excludes soft-deleted rows. Unique constraints are enforced by
/// the store and reported as [`StoreError::UniqueViolation`].
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    async fn insert(&self, record: Record) -> Result<E, StoreError>;
    async fn find(&self, options: &FindOptions) -> Result<Vec<E>, StoreError>;
    /// Page of rows plus the number of matching rows ignoring `skip`/`take`.
    async fn find_and_count(&self, options: &FindOptions) -> Result<(Vec<E>, i64), StoreError>;
    async fn find_one(&self, filter: &Record, relations: &[String]) -> Result<Option<E>, StoreError>;
    async fn save(&self, entity: &E) -> Result<E, StoreError>;
    async fn soft_remove(&self, id: i64) -> Result<E, StoreError>;
    async fn count(&self, filter: &Record) -> Result<i64, StoreError>;
    async fn update_where(&self, filter: &Record, changes: &Record) -> Result<u64, StoreError>;
}
