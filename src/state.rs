use std::{sync::Arc, time::Duration};

use tracing::warn;

use crate::{
    config::AppConfig,
    db::{memory::MemoryStore, postgres::PgStore, Store},
    google::{GoogleClient, GoogleIdentity},
    verification::mailer::{Mailer, SmtpMailer},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    /// `None` when SMTP is not configured.
    pub mailer: Option<Arc<dyn Mailer>>,
    pub google: Arc<dyn GoogleIdentity>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url).await?;
                pg.migrate().await?;
                Arc::new(pg) as Arc<dyn Store>
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        let timeout = Duration::from_secs(config.http_timeout_secs);
        let mailer = SmtpMailer::from_config(&config.smtp, timeout)?
            .map(|m| Arc::new(m) as Arc<dyn Mailer>);
        if mailer.is_none() {
            warn!("EMAIL_HOST_USER/EMAIL_HOST_PASSWORD not set; verification codes are disabled");
        }

        let google =
            Arc::new(GoogleClient::new(&config.google, config.http_timeout_secs)?) as Arc<dyn GoogleIdentity>;

        Ok(Self::from_parts(store, config, mailer, google))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        mailer: Option<Arc<dyn Mailer>>,
        google: Arc<dyn GoogleIdentity>,
    ) -> Self {
        Self {
            store,
            config,
            mailer,
            google,
        }
    }

    pub fn mailer(&self) -> Option<&dyn Mailer> {
        self.mailer.as_deref()
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::testing::{RecordingMailer, ScriptedGoogle};

        Self::fake_with(
            Some(Arc::new(RecordingMailer::default()) as Arc<dyn Mailer>),
            Arc::new(ScriptedGoogle::default()),
        )
    }

    #[cfg(test)]
    pub fn fake_with(mailer: Option<Arc<dyn Mailer>>, google: Arc<dyn GoogleIdentity>) -> Self {
        use crate::config::{GoogleConfig, JwtConfig, SmtpConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            smtp: SmtpConfig {
                host: "localhost".into(),
                port: 2525,
                username: Some("noreply@ecocash.uz".into()),
                password: Some("test".into()),
                from: None,
            },
            google: GoogleConfig {
                tokeninfo_url: "http://google.invalid/tokeninfo".into(),
                userinfo_url: "http://google.invalid/userinfo".into(),
            },
            http_timeout_secs: 1,
        });

        Self::from_parts(Arc::new(MemoryStore::new()), config, mailer, google)
    }
}
