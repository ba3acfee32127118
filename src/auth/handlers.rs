use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::{
        dto::{Acknowledgement, LoginRequest, LoginResponse, RegisterRequest, VerifyOtpRequest},
        services::AuthService,
    },
    error::AppError,
    response::Data,
    state::AppState,
    validation::ValidatedJson,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/login", post(login))
}

#[instrument(skip_all)]
pub async fn register(
    State(auth): State<AuthService>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<Json<Data<Acknowledgement>>, AppError> {
    Ok(Json(Data::new(auth.register(payload).await?)))
}

#[instrument(skip_all)]
pub async fn verify_otp(
    State(auth): State<AuthService>,
    ValidatedJson(payload): ValidatedJson<VerifyOtpRequest>,
) -> Result<Json<Data<Acknowledgement>>, AppError> {
    Ok(Json(Data::new(auth.verify_otp(payload).await?)))
}

#[instrument(skip_all)]
pub async fn login(
    State(auth): State<AuthService>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<Data<LoginResponse>>, AppError> {
    Ok(Json(Data::new(auth.login(payload).await?)))
}
