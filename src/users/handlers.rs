use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{AdminOnly, Authorized, UserOnly},
    entity::QueryParameters,
    error::AppError,
    response::{Data, PageMeta},
    state::AppState,
    users::{
        dto::{CreateUserRequest, UpdateUserRequest, UserResponse},
        services::UserService,
    },
    validation::{IdParam, ValidatedJson, ValidatedQuery},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user", post(create_user).get(list_users))
        .route(
            "/user/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip_all)]
pub async fn create_user(
    State(users): State<UserService>,
    principal: Authorized<AdminOnly>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<Data<UserResponse>>), AppError> {
    let user = users.create(payload, principal.actor()).await?;
    Ok((StatusCode::CREATED, Json(Data::new(user.into()))))
}

#[instrument(skip_all)]
pub async fn list_users(
    State(users): State<UserService>,
    _principal: Authorized<AdminOnly>,
    ValidatedQuery(params): ValidatedQuery<QueryParameters>,
) -> Result<Json<Data<Vec<UserResponse>>>, AppError> {
    let (rows, total) = users.list(&params).await?;
    let meta = PageMeta {
        page: params.page(),
        total_data: total,
        total_page: params.total_pages(total),
    };
    let data = rows.into_iter().map(UserResponse::from).collect();
    Ok(Json(Data::paged(data, meta)))
}

#[instrument(skip_all, fields(user_id = id))]
pub async fn get_user(
    State(users): State<UserService>,
    _principal: Authorized<UserOnly>,
    IdParam(id): IdParam,
) -> Result<Json<Data<UserResponse>>, AppError> {
    Ok(Json(Data::new(users.get(id).await?.into())))
}

#[instrument(skip_all, fields(user_id = id))]
pub async fn update_user(
    State(users): State<UserService>,
    principal: Authorized<AdminOnly>,
    IdParam(id): IdParam,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<Data<UserResponse>>, AppError> {
    let user = users.update(id, payload, principal.actor()).await?;
    Ok(Json(Data::new(user.into())))
}

#[instrument(skip_all, fields(user_id = id))]
pub async fn delete_user(
    State(users): State<UserService>,
    principal: Authorized<AdminOnly>,
    IdParam(id): IdParam,
) -> Result<StatusCode, AppError> {
    users.remove(id, principal.actor()).await?;
    Ok(StatusCode::NO_CONTENT)
}
