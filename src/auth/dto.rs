use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::normalize_email;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64, message = "username must not be empty"))]
    pub username: String,
    #[serde(deserialize_with = "normalize_email")]
    #[validate(email(message = "email must be an email"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[serde(deserialize_with = "normalize_email")]
    #[validate(email(message = "email must be an email"))]
    pub email: String,
    #[validate(length(min = 1, message = "otp must not be empty"))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(deserialize_with = "normalize_email")]
    #[validate(email(message = "email must be an email"))]
    pub email: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Failed,
}

/// Outcome of a registration or OTP step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
    pub status: AckStatus,
    pub detail: String,
}

impl Acknowledgement {
    pub fn success(detail: &str) -> Self {
        Self {
            status: AckStatus::Success,
            detail: detail.to_string(),
        }
    }

    pub fn failed(detail: &str) -> Self {
        Self {
            status: AckStatus::Failed,
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
}
