use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Outgoing mail settings. Credentials are optional: without them the
/// verification flow refuses to issue codes.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        matches!((&self.username, &self.password), (Some(u), Some(p)) if !u.is_empty() && !p.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub tokeninfo_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub google: GoogleConfig,
    pub http_timeout_secs: u64,
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = non_empty_var("DATABASE_URL");
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "ecocash".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "ecocash-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let smtp = SmtpConfig {
            host: std::env::var("EMAIL_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
            port: std::env::var("EMAIL_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            username: non_empty_var("EMAIL_HOST_USER"),
            password: non_empty_var("EMAIL_HOST_PASSWORD"),
            from: non_empty_var("DEFAULT_FROM_EMAIL"),
        };
        let google = GoogleConfig {
            tokeninfo_url: std::env::var("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/tokeninfo".into()),
            userinfo_url: std::env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v2/userinfo".into()),
        };
        let http_timeout_secs = std::env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        Ok(Self {
            database_url,
            jwt,
            smtp,
            google,
            http_timeout_secs,
        })
    }
}
