//! Generic persisted-entity access: the shared record shape, query
//! parameters, the store capability and the service every resource reuses.

pub mod service;
pub mod store;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use validator::Validate;

use crate::error::{AppError, FieldError};

pub use service::EntityService;
pub use store::{EntityStore, StoreError};

/// Flat field map used for payloads, predicates and change sets.
pub type Record = Map<String, Value>;

/// Fields owned by the access layer; payloads can never set them.
pub const BASE_FIELDS: &[&str] = &[
    "id",
    "createdAt",
    "updatedAt",
    "deletedAt",
    "createdBy",
    "updatedBy",
    "deletedBy",
];

/// Declares that the flat input key `field` refers to the relation `relation`.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub field: &'static str,
    pub relation: &'static str,
}

/// Identity, timestamps and audit trail shared by every persisted resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EntityBase {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub deleted_by: Option<String>,
}

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name used in not-found messages.
    const NAME: &'static str;
    /// Flat `<relation>Id` inputs folded into `{ <relation>: { id } }`.
    const RELATIONS: &'static [Relation] = &[];

    fn base(&self) -> &EntityBase;
    fn base_mut(&mut self) -> &mut EntityBase;

    fn id(&self) -> i64 {
        self.base().id
    }
}

pub fn to_record<T: Serialize>(value: &T) -> Result<Record, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AppError::internal(
            "build record",
            format!("expected an object, got {other}"),
        )),
        Err(e) => Err(AppError::internal("build record", e)),
    }
}

pub fn from_record<E: Entity>(record: Record) -> Result<E, AppError> {
    serde_json::from_value(Value::Object(record)).map_err(|e| {
        AppError::Validation(vec![FieldError::new(
            "invalidPayload",
            e.to_string(),
            None,
        )])
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl OrderDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Pagination request. Every field is optional and resolves to a default.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameters {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<u32>,
    pub order_by: Option<String>,
    pub order_direction: Option<OrderDirection>,
    pub search: Option<String>,
}

impl QueryParameters {
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let limit = i64::from(self.limit().max(1));
        (total.max(0) + limit - 1) / limit
    }
}

/// Options handed to the store for list queries.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Record,
    pub skip: u64,
    pub take: Option<u64>,
    pub order: Vec<(String, OrderDirection)>,
    pub search: Option<String>,
    pub relations: Vec<String>,
}

impl FindOptions {
    #[allow(dead_code)]
    pub fn filtered(filter: Record) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}
