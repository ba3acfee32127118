use crate::auth::{AuthService, JwtKeys};
use crate::cache::{RedisSecretStore, SecretStore};
use crate::config::AppConfig;
use crate::entity::{EntityService, EntityStore};
use crate::mail::{LogNotifier, Notifier, SmtpNotifier};
use crate::users::{repo::PgUserStore, repo_types::User, UserService};
use axum::extract::FromRef;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
    pub auth: AuthService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&db).await?;
        info!("database ready");

        let secrets = Arc::new(RedisSecretStore::connect(&config.redis_url).await?) as Arc<dyn SecretStore>;

        let notifier: Arc<dyn Notifier> = match &config.mail {
            Some(mail) => Arc::new(SmtpNotifier::new(mail)?),
            None => {
                warn!("SMTP_HOST not set; outgoing mail is only logged");
                Arc::new(LogNotifier)
            }
        };

        let store = Arc::new(PgUserStore::new(db)) as Arc<dyn EntityStore<User>>;
        Ok(Self::from_parts(config, store, secrets, notifier))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn EntityStore<User>>,
        secrets: Arc<dyn SecretStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let entities = EntityService::new(store);
        let auth = AuthService::new(
            entities.clone(),
            secrets,
            notifier,
            JwtKeys::from_config(&config.jwt),
            config.otp_ttl_seconds,
        );
        Self {
            users: UserService::new(entities),
            auth,
            config,
        }
    }
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
