use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{
    dto::{Acknowledgement, LoginRequest, LoginResponse, RegisterRequest, VerifyOtpRequest},
    jwt::JwtKeys,
    otp::{generate_otp, otp_key, otp_mail_body},
    password::{hash_blocking, verify_blocking},
};
use crate::{
    cache::SecretStore,
    entity::{EntityService, Record},
    error::{AppError, UnauthorizedKind},
    mail::Notifier,
    users::repo_types::User,
};

pub const OTP_SUBJECT: &str = "OTP Verification";

/// Registration, OTP activation and login.
#[derive(Clone)]
pub struct AuthService {
    users: EntityService<User>,
    secrets: Arc<dyn SecretStore>,
    notifier: Arc<dyn Notifier>,
    keys: JwtKeys,
    otp_ttl_seconds: u64,
}

impl AuthService {
    pub fn new(
        users: EntityService<User>,
        secrets: Arc<dyn SecretStore>,
        notifier: Arc<dyn Notifier>,
        keys: JwtKeys,
        otp_ttl_seconds: u64,
    ) -> Self {
        Self {
            users,
            secrets,
            notifier,
            keys,
            otp_ttl_seconds,
        }
    }

    /// Creates an inactive account and mails it a fresh OTP.
    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn register(&self, payload: RegisterRequest) -> Result<Acknowledgement, AppError> {
        let hash = hash_blocking(payload.password).await?;

        let mut record = Record::new();
        record.insert("username".into(), payload.username.into());
        record.insert("email".into(), payload.email.clone().into());
        record.insert("password".into(), hash.into());
        record.insert("isActive".into(), false.into());
        let user = self.users.create(record, None, &[]).await?;

        let code = generate_otp();
        self.secrets
            .set(&otp_key(&user.email), &code, self.otp_ttl_seconds)
            .await
            .map_err(|e| AppError::internal("store otp", e))?;

        let notifier = Arc::clone(&self.notifier);
        let to = user.email.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&to, OTP_SUBJECT, &otp_mail_body(&code)).await {
                warn!(error = %e, to = %to, "otp mail not delivered");
            }
        });

        info!(user_id = user.base.id, "user registered");
        Ok(Acknowledgement::success(
            "account registered, a verification code has been sent to your email",
        ))
    }

    /// Soft outcome: a wrong or expired code is a `failed` acknowledgement, not an error.
    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn verify_otp(&self, payload: VerifyOtpRequest) -> Result<Acknowledgement, AppError> {
        let key = otp_key(&payload.email);
        let stored = self
            .secrets
            .get(&key)
            .await
            .map_err(|e| AppError::internal("read otp", e))?;

        if stored.as_deref() != Some(payload.otp.as_str()) {
            info!("otp mismatch or expired");
            return Ok(Acknowledgement::failed("your account could not be activated"));
        }

        // Only the caller that removes the code may activate.
        let claimed = self
            .secrets
            .delete_if_eq(&key, &payload.otp)
            .await
            .map_err(|e| AppError::internal("consume otp", e))?;
        if !claimed {
            info!("otp already consumed");
            return Ok(Acknowledgement::failed("your account could not be activated"));
        }

        let mut predicate = Record::new();
        predicate.insert("email".into(), payload.email.clone().into());
        let mut changes = Record::new();
        changes.insert("isActive".into(), true.into());
        let activated = match self.users.update_by(&predicate, changes).await {
            Ok(activated) => activated,
            Err(err) => {
                // Hand the code back so the same OTP can be retried.
                if let Err(e) = self
                    .secrets
                    .set(&key, &payload.otp, self.otp_ttl_seconds)
                    .await
                {
                    warn!(error = %e, "otp could not be restored");
                }
                return Err(err);
            }
        };
        if activated == 0 {
            info!("no live account for this otp");
            return Ok(Acknowledgement::failed("your account could not be activated"));
        }
        info!(activated, "account activated");
        Ok(Acknowledgement::success("your account has been activated"))
    }

    /// Never reveals whether the email or the password was wrong.
    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn login(&self, payload: LoginRequest) -> Result<LoginResponse, AppError> {
        let mut predicate = Record::new();
        predicate.insert("email".into(), payload.email.clone().into());

        let Some(user) = self.users.find_one_by(&predicate, &[]).await? else {
            warn!("login for unknown email");
            return Err(AppError::Unauthorized(UnauthorizedKind::Credentials));
        };

        if !verify_blocking(payload.password, user.password.clone()).await? {
            warn!(user_id = user.base.id, "wrong password");
            return Err(AppError::Unauthorized(UnauthorizedKind::Credentials));
        }

        let access_token = self.keys.sign(&user)?;
        info!(user_id = user.base.id, "login ok");
        Ok(LoginResponse { access_token })
    }
}
