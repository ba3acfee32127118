use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::error::{AppError, FieldError};

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .filter_map(|(field, errs)| {
                errs.first().map(|err| {
                    let detail = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid"));
                    FieldError::new(err.code.to_string(), detail, Some(field))
                })
            })
            .collect();
        fields.sort_by(|a, b| a.attr.cmp(&b.attr));
        AppError::Validation(fields)
    }
}

/// JSON body that has passed its `Validate` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            AppError::Validation(vec![FieldError::new("invalidBody", rejection.body_text(), None)])
        })?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Query string that has passed its `Validate` rules.
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                AppError::Validation(vec![FieldError::new(
                    "invalidQuery",
                    rejection.body_text(),
                    None,
                )])
            })?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Numeric `:id` path segment.
pub struct IdParam(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for IdParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                AppError::Validation(vec![FieldError::new(
                    "invalidParameter",
                    "id must be an integer",
                    Some("id"),
                )])
            })?;
        Ok(Self(id))
    }
}

/// Trims and lower-cases an email while deserializing.
pub fn normalize_email<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
    Ok(raw.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Sample {
        #[serde(deserialize_with = "normalize_email")]
        #[validate(email(message = "email must be an email"))]
        email: String,
        #[validate(length(min = 8))]
        password: String,
    }

    #[test]
    fn validation_errors_become_field_triples() {
        let sample = Sample {
            email: "nope".into(),
            password: "short".into(),
        };
        let err: AppError = sample.validate().unwrap_err().into();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].attr.as_deref(), Some("email"));
                assert_eq!(fields[0].code, "email");
                assert_eq!(fields[0].detail, "email must be an email");
                assert_eq!(fields[1].attr.as_deref(), Some("password"));
                assert_eq!(fields[1].code, "length");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn email_is_normalized_on_deserialize() {
        let sample: Sample =
            serde_json::from_str(r#"{"email":"  Alice@X.com ","password":"whatever1"}"#).unwrap();
        assert_eq!(sample.email, "alice@x.com");
        assert!(sample.validate().is_ok());
    }
}
