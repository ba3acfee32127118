use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use super::{
    from_record, to_record, Entity, EntityStore, FindOptions, OrderDirection, QueryParameters,
    Record, StoreError, BASE_FIELDS,
};
use crate::error::{AppError, FieldError};

/// Before/after maps of the fields that changed between two records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub old_value: Record,
    pub new_value: Record,
}

/// Type-parameterised access layer shared by every resource service.
pub struct EntityService<E: Entity> {
    store: Arc<dyn EntityStore<E>>,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<E: Entity> EntityService<E> {
    pub fn new(store: Arc<dyn EntityStore<E>>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, payload), fields(entity = E::NAME))]
    pub async fn create(
        &self,
        payload: Record,
        actor: Option<&str>,
        exclude: &[&str],
    ) -> Result<E, AppError> {
        let mut record = strip_base_fields(payload);
        fold_relations::<E>(&mut record, exclude);
        record.insert("createdBy".into(), actor.map(str::to_string).into());

        let created = self
            .store
            .insert(record)
            .await
            .map_err(|e| handle_error(e, "create entity"))?;
        debug!(id = created.id(), "entity created");
        Ok(created)
    }

    #[allow(dead_code)]
    pub async fn find_all(&self, options: &FindOptions) -> Result<Vec<E>, AppError> {
        Ok(self.store.find(options).await?)
    }

    /// Explicit `options` win over `params` when supplied.
    #[instrument(skip(self, params, options), fields(entity = E::NAME))]
    pub async fn find_and_count(
        &self,
        params: &QueryParameters,
        options: Option<FindOptions>,
    ) -> Result<(Vec<E>, i64), AppError> {
        let options = match options {
            Some(options) => options,
            None => param_builder(params),
        };
        Ok(self.store.find_and_count(&options).await?)
    }

    pub async fn find_one_by_id(&self, id: i64, relations: &[String]) -> Result<Option<E>, AppError> {
        let mut filter = Record::new();
        filter.insert("id".into(), id.into());
        Ok(self.store.find_one(&filter, relations).await?)
    }

    pub async fn find_one_by(&self, predicate: &Record, relations: &[String]) -> Result<Option<E>, AppError> {
        Ok(self.store.find_one(predicate, relations).await?)
    }

    pub async fn find_one_by_id_or_fail(&self, id: i64, relations: &[String]) -> Result<E, AppError> {
        self.find_one_by_id(id, relations)
            .await?
            .ok_or_else(|| missing_id::<E>(id))
    }

    #[allow(dead_code)]
    pub async fn find_one_by_or_fail(&self, predicate: &Record, relations: &[String]) -> Result<E, AppError> {
        self.find_one_by(predicate, relations)
            .await?
            .ok_or_else(|| AppError::NotFound {
                detail: format!(
                    "{} with Property {} not found",
                    E::NAME,
                    Value::Object(predicate.clone())
                ),
                attr: predicate.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    #[instrument(skip(self, payload), fields(entity = E::NAME))]
    pub async fn update(
        &self,
        id: i64,
        payload: Record,
        actor: Option<&str>,
        exclude: &[&str],
    ) -> Result<E, AppError> {
        let current = self.find_one_by_id_or_fail(id, &[]).await?;

        let mut changes = strip_base_fields(payload);
        fold_relations::<E>(&mut changes, exclude);

        let before = to_record(&current)?;
        let mut merged = before.clone();
        merged.extend(changes);
        let changed = extract_changes(&before, &merged, BASE_FIELDS);
        let mut entity: E = from_record(merged)?;
        entity.base_mut().updated_by = actor.map(str::to_string);

        let saved = self.store.save(&entity).await.map_err(|e| match e {
            StoreError::NotFound => missing_id::<E>(id),
            other => handle_error(other, "update entity"),
        })?;
        debug!(id, changed = ?changed.new_value.keys().collect::<Vec<_>>(), "entity updated");
        Ok(saved)
    }

    /// Applies `changes` to every live row matching `predicate`.
    #[instrument(skip(self, predicate, changes), fields(entity = E::NAME))]
    pub async fn update_by(&self, predicate: &Record, changes: Record) -> Result<u64, AppError> {
        let changes = strip_base_fields(changes);
        self.store
            .update_where(predicate, &changes)
            .await
            .map_err(|e| handle_error(e, "update entities"))
    }

    #[instrument(skip(self), fields(entity = E::NAME))]
    pub async fn soft_remove(&self, id: i64, actor: Option<&str>) -> Result<E, AppError> {
        let mut entity = self.find_one_by_id_or_fail(id, &[]).await?;
        entity.base_mut().deleted_by = actor.map(str::to_string);
        let removal_error = |e: StoreError| match e {
            StoreError::NotFound => missing_id::<E>(id),
            other => handle_error(other, "remove entity"),
        };
        self.store.save(&entity).await.map_err(removal_error)?;
        let removed = self.store.soft_remove(id).await.map_err(removal_error)?;
        debug!(id, "entity soft-removed");
        Ok(removed)
    }

    #[allow(dead_code)]
    pub async fn count(&self, filter: &Record) -> Result<i64, AppError> {
        match self.store.count(filter).await {
            Ok(count) => Ok(count),
            Err(e) => {
                error!(error = %e, entity = E::NAME, "count failed");
                Err(e.into())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownField(field) => AppError::Validation(vec![FieldError::new(
                "invalidField",
                format!("unknown field {field}"),
                Some(field.as_str()),
            )]),
            StoreError::NotFound => AppError::NotFound {
                detail: "record not found".into(),
                attr: "id".into(),
            },
            other => AppError::internal("query entities", other),
        }
    }
}

fn missing_id<E: Entity>(id: i64) -> AppError {
    AppError::NotFound {
        detail: format!("{} with Property '{}' not found", E::NAME, id),
        attr: "id".into(),
    }
}

/// Translates store failures raised by writes into the error taxonomy.
pub fn handle_error(err: StoreError, action: &str) -> AppError {
    error!(error = %err, %action, "store operation failed");
    match err {
        StoreError::UniqueViolation { detail, .. } => {
            let field = conflicting_field(&detail).unwrap_or_else(|| "unknown field".to_string());
            AppError::Conflict {
                code: "duplicateError".into(),
                detail: format!("Duplicate value for unique field: {field}"),
                attr: field,
            }
        }
        StoreError::UnknownField(field) => StoreError::UnknownField(field).into(),
        StoreError::NotFound => StoreError::NotFound.into(),
        StoreError::Other(message) => AppError::Internal {
            action: action.to_string(),
            message,
        },
    }
}

fn conflicting_field(detail: &str) -> Option<String> {
    lazy_static! {
        static ref PARENS_RE: Regex = Regex::new(r"\(([^)]+)\)").unwrap();
    }
    PARENS_RE
        .captures(detail)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn strip_base_fields(mut record: Record) -> Record {
    for field in BASE_FIELDS {
        record.remove(*field);
    }
    record
}

/// Moves every declared `<relation>Id` key into a `{ <relation>: { id } }`
/// reference. Keys listed in `exclude` stay flat; non-scalar ids are dropped.
pub fn fold_relations<E: Entity>(record: &mut Record, exclude: &[&str]) {
    for relation in E::RELATIONS {
        if exclude.contains(&relation.field) {
            continue;
        }
        if let Some(value) = record.remove(relation.field) {
            if value.is_number() || value.is_string() {
                record.insert(relation.relation.to_string(), json!({ "id": value }));
            }
        }
    }
}

/// Derives store options from pagination parameters.
pub fn param_builder(params: &QueryParameters) -> FindOptions {
    let order_by = params.order_by.as_deref().unwrap_or("id");
    let order = if order_by.contains(':') {
        parse_order_by(order_by)
    } else {
        vec![(
            order_by.to_string(),
            params.order_direction.unwrap_or(OrderDirection::Desc),
        )]
    };

    FindOptions {
        skip: params.offset(),
        take: Some(u64::from(params.limit())),
        order,
        search: params.search.clone().filter(|s| !s.trim().is_empty()),
        ..FindOptions::default()
    }
}

/// Parses `"field:dir,other:dir"`. Items missing either half are skipped.
pub fn parse_order_by(raw: &str) -> Vec<(String, OrderDirection)> {
    raw.split(',')
        .filter_map(|item| {
            let (field, direction) = item.split_once(':')?;
            let (field, direction) = (field.trim(), direction.trim());
            if field.is_empty() || direction.is_empty() {
                return None;
            }
            let direction = if direction.eq_ignore_ascii_case("DESC") {
                OrderDirection::Desc
            } else {
                OrderDirection::Asc
            };
            Some((field.to_string(), direction))
        })
        .collect()
}

/// Fields of `new` whose value differs from `old`, split into before/after.
pub fn extract_changes(old: &Record, new: &Record, exclude: &[&str]) -> Changes {
    let mut changes = Changes::default();
    for (key, new_value) in new {
        if exclude.contains(&key.as_str()) {
            continue;
        }
        let old_value = old.get(key).cloned().unwrap_or(Value::Null);
        if &old_value != new_value {
            changes.old_value.insert(key.clone(), old_value);
            changes.new_value.insert(key.clone(), new_value.clone());
        }
    }
    changes
}
