use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::entity::{EntityStore, FindOptions, Record, StoreError};
use crate::users::repo_types::{Role, User};

const SELECT_USER: &str = "SELECT id, created_at, updated_at, deleted_at, created_by, updated_by, deleted_by, \
     username, email, password, role, is_active FROM users";

const RETURNING_USER: &str = " RETURNING id, created_at, updated_at, deleted_at, created_by, updated_by, deleted_by, \
     username, email, password, role, is_active";

/// Maps a record field onto its column; `cast` is appended to bound values.
struct Column {
    name: &'static str,
    cast: &'static str,
}

fn column_for(field: &str) -> Result<Column, StoreError> {
    let (name, cast) = match field {
        "id" => ("id", ""),
        "createdAt" => ("created_at", "::timestamptz"),
        "updatedAt" => ("updated_at", "::timestamptz"),
        "deletedAt" => ("deleted_at", "::timestamptz"),
        "createdBy" => ("created_by", ""),
        "updatedBy" => ("updated_by", ""),
        "deletedBy" => ("deleted_by", ""),
        "username" => ("username", ""),
        "email" => ("email", ""),
        "password" => ("password", ""),
        "role" => ("role", "::user_role"),
        "isActive" => ("is_active", ""),
        other => return Err(StoreError::UnknownField(other.to_string())),
    };
    Ok(Column { name, cast })
}

fn push_value(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &Column,
    value: &Value,
) -> Result<(), StoreError> {
    match value {
        Value::Null => qb.push("NULL"),
        Value::Bool(b) => qb.push_bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => qb.push_bind(i),
            None => qb.push_bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => qb.push_bind(s.clone()),
        _ => {
            return Err(StoreError::Other(format!(
                "unsupported value for column {}",
                column.name
            )))
        }
    };
    qb.push(column.cast);
    Ok(())
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Record) -> Result<(), StoreError> {
    qb.push(" WHERE deleted_at IS NULL");
    for (field, value) in filter {
        let column = column_for(field)?;
        qb.push(" AND ").push(column.name);
        if value.is_null() {
            qb.push(" IS NULL");
        } else {
            qb.push(" = ");
            push_value(qb, &column, value)?;
        }
    }
    Ok(())
}

/// Substring pattern with `\\`, `%` and `_` matched literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.trim().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    if let Some(term) = search {
        let pattern = like_pattern(term);
        qb.push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewUser {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    role: Role,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    created_by: Option<String>,
}

/// Postgres-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn select(options: &FindOptions) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
        let mut qb = QueryBuilder::new(SELECT_USER);
        push_filter(&mut qb, &options.filter)?;
        push_search(&mut qb, options.search.as_deref());

        let mut order = options.order.iter().peekable();
        if order.peek().is_some() {
            qb.push(" ORDER BY ");
            let mut first = true;
            for (field, direction) in order {
                if !first {
                    qb.push(", ");
                }
                first = false;
                qb.push(column_for(field)?.name).push(" ").push(direction.as_sql());
            }
        }
        if let Some(take) = options.take {
            qb.push(" LIMIT ").push_bind(take as i64);
        }
        if options.skip > 0 {
            qb.push(" OFFSET ").push_bind(options.skip as i64);
        }
        Ok(qb)
    }

    fn count_query(options: &FindOptions) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filter(&mut qb, &options.filter)?;
        push_search(&mut qb, options.search.as_deref());
        Ok(qb)
    }
}

#[async_trait]
impl EntityStore<User> for PgUserStore {
    async fn insert(&self, record: Record) -> Result<User, StoreError> {
        let new: NewUser = serde_json::from_value(Value::Object(record))
            .map_err(|e| StoreError::Other(format!("invalid user record: {e}")))?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password, role, is_active, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            {RETURNING_USER}
            "#
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.password)
        .bind(new.role)
        .bind(new.is_active)
        .bind(new.created_by)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn find(&self, options: &FindOptions) -> Result<Vec<User>, StoreError> {
        if !options.relations.is_empty() {
            debug!(relations = ?options.relations, "users have no relations to load");
        }
        let mut qb = Self::select(options)?;
        Ok(qb.build_query_as::<User>().fetch_all(&self.db).await?)
    }

    async fn find_and_count(&self, options: &FindOptions) -> Result<(Vec<User>, i64), StoreError> {
        let rows = self.find(options).await?;
        let mut qb = Self::count_query(options)?;
        let total = qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        Ok((rows, total))
    }

    async fn find_one(&self, filter: &Record, _relations: &[String]) -> Result<Option<User>, StoreError> {
        let options = FindOptions {
            filter: filter.clone(),
            take: Some(1),
            ..FindOptions::default()
        };
        let mut qb = Self::select(&options)?;
        Ok(qb.build_query_as::<User>().fetch_optional(&self.db).await?)
    }

    async fn save(&self, user: &User) -> Result<User, StoreError> {
        let saved = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET username = $2, email = $3, password = $4, role = $5, is_active = $6,
                   updated_by = $7, deleted_by = $8, updated_at = now()
             WHERE id = $1
            {RETURNING_USER}
            "#
        ))
        .bind(user.base.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.role)
        .bind(user.is_active)
        .bind(&user.base.updated_by)
        .bind(&user.base.deleted_by)
        .fetch_one(&self.db)
        .await?;
        Ok(saved)
    }

    async fn soft_remove(&self, id: i64) -> Result<User, StoreError> {
        let removed = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET deleted_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            {RETURNING_USER}
            "#
        ))
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        Ok(removed)
    }

    async fn count(&self, filter: &Record) -> Result<i64, StoreError> {
        let mut qb = Self::count_query(&FindOptions::filtered(filter.clone()))?;
        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.db).await?)
    }

    async fn update_where(&self, filter: &Record, changes: &Record) -> Result<u64, StoreError> {
        if changes.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE users SET updated_at = now()");
        for (field, value) in changes {
            let column = column_for(field)?;
            qb.push(", ").push(column.name).push(" = ");
            push_value(&mut qb, &column, value)?;
        }
        push_filter(&mut qb, filter)?;
        let result = qb.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }
}
