use tracing::{info, instrument};

use crate::{
    auth::password::hash_blocking,
    entity::{to_record, EntityService, QueryParameters, Record},
    error::AppError,
    users::{
        dto::{CreateUserRequest, UpdateUserRequest},
        repo_types::User,
    },
};

/// Admin-facing user management on top of the generic access layer.
#[derive(Clone)]
pub struct UserService {
    entities: EntityService<User>,
}

impl UserService {
    pub fn new(entities: EntityService<User>) -> Self {
        Self { entities }
    }

    async fn hashed(mut record: Record) -> Result<Record, AppError> {
        if let Some(plain) = record.remove("password").and_then(|v| v.as_str().map(str::to_string)) {
            record.insert("password".into(), hash_blocking(plain).await?.into());
        }
        Ok(record)
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn create(&self, req: CreateUserRequest, actor: &str) -> Result<User, AppError> {
        let record = Self::hashed(to_record(&req)?).await?;
        let user = self.entities.create(record, Some(actor), &[]).await?;
        info!(user_id = user.base.id, "user created");
        Ok(user)
    }

    pub async fn list(&self, params: &QueryParameters) -> Result<(Vec<User>, i64), AppError> {
        self.entities.find_and_count(params, None).await
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        self.entities.find_one_by_id_or_fail(id, &[]).await
    }

    #[instrument(skip(self, req))]
    pub async fn update(&self, id: i64, req: UpdateUserRequest, actor: &str) -> Result<User, AppError> {
        let record = Self::hashed(to_record(&req)?).await?;
        let user = self.entities.update(id, record, Some(actor), &[]).await?;
        info!(user_id = id, "user updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64, actor: &str) -> Result<(), AppError> {
        self.entities.soft_remove(id, Some(actor)).await?;
        info!(user_id = id, "user removed");
        Ok(())
    }
}
