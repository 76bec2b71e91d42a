use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use super::mailer::Mailer;
use crate::{
    db::{EmailVerification, Store},
    error::{AppError, AppResult},
};

pub const CODE_TTL: Duration = Duration::minutes(10);

/// Throwaway and placeholder domains refused for verification.
const DISPOSABLE_DOMAINS: [&str; 12] = [
    "test.com",
    "example.com",
    "mailinator.com",
    "10minutemail.com",
    "tempmail.com",
    "guerrillamail.com",
    "throwaway.email",
    "fakeinbox.com",
    "mohmal.com",
    "temp-mail.org",
    "getnada.com",
    "yopmail.com",
];

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn is_disposable(email: &str) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, domain)| DISPOSABLE_DOMAINS.contains(&domain.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

fn verification_message(first_name: &str, last_name: &str, code: &str) -> String {
    let greeting = format!("{first_name} {last_name}");
    let greeting = greeting.trim();
    format!(
        "Hello {greeting}!\n\n\
         Your EcoCash verification code is:\n\n\
         {code}\n\n\
         The code is valid for 10 minutes.\n\n\
         If you did not request it, you can ignore this message.\n\n\
         The EcoCash team\n"
    )
}

/// Issue a fresh code for `raw_email` and mail it.
///
/// Returns the normalized email and the code. When delivery fails the
/// record stays stored and the caller gets `ExternalUnavailable`.
pub async fn issue_code(
    store: &dyn Store,
    mailer: Option<&dyn Mailer>,
    raw_email: &str,
    first_name: &str,
    last_name: &str,
) -> AppResult<(String, String)> {
    let email = normalize_email(raw_email);
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".into()));
    }
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email format".into()));
    }
    if is_disposable(&email) {
        warn!(email = %email, "disposable email refused");
        return Err(AppError::Validation(
            "Disposable email addresses are not accepted. Use a real mailbox (Gmail, Yahoo, Outlook, ...)".into(),
        ));
    }
    let Some(mailer) = mailer else {
        return Err(AppError::ExternalUnavailable(
            "Email service is not configured. Please contact the administrator.".into(),
        ));
    };
    if store.find_active_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("This email is already registered".into()));
    }

    let code = generate_code();
    let expires_at = OffsetDateTime::now_utc() + CODE_TTL;
    store.replace_verification(&email, &code, expires_at).await?;

    let body = verification_message(first_name, last_name, &code);
    if let Err(e) = mailer
        .send(&email, "EcoCash - email verification code", &body)
        .await
    {
        error!(error = ?e, email = %email, "verification email not delivered");
        return Err(AppError::ExternalUnavailable(format!(
            "Failed to send verification email: {e}"
        )));
    }

    info!(email = %email, "verification code sent");
    Ok((email, code))
}

/// Consume a pending code. One-way: a verified record is never matched again.
pub async fn check_code(
    store: &dyn Store,
    email: &str,
    code: &str,
    now: OffsetDateTime,
) -> AppResult<EmailVerification> {
    let Some(mut record) = store.latest_unverified(email, code.trim()).await? else {
        return Err(AppError::Validation("Invalid or expired code".into()));
    };
    if record.is_expired(now) {
        return Err(AppError::Validation(
            "The code has expired, request a new one".into(),
        ));
    }
    if !store.mark_verified(record.id).await? {
        warn!(email = %email, "verification code already consumed");
        return Err(AppError::Validation("Invalid or expired code".into()));
    }
    record.is_verified = true;
    Ok(record)
}
