use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Access tokens authorize API calls; refresh tokens only mint new pairs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// HS256 key pair plus the issuer/audience every token is bound to.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let jwt = &state.config.jwt;
        let secret = jwt.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: jwt.issuer.clone(),
            audience: jwt.audience.clone(),
            access_ttl: Duration::minutes(jwt.ttl_minutes),
            refresh_ttl: Duration::minutes(jwt.refresh_ttl_minutes),
        }
    }
}

impl JwtKeys {
    fn sign(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let issued = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            iat: issued.unix_timestamp(),
            exp: (issued + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%user_id, ?kind, "token issued");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, TokenKind::Refresh)
    }

    /// Signature, expiry, issuer and audience; either kind is accepted.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        anyhow::ensure!(claims.kind == TokenKind::Refresh, "not a refresh token");
        Ok(claims)
    }
}

fn bearer_token(parts: &Parts) -> Option<Result<&str, AppError>> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    Some(
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into())),
    )
}

fn access_subject(keys: &JwtKeys, token: &str) -> Result<Uuid, AppError> {
    let claims = keys.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;
    if claims.kind != TokenKind::Access {
        return Err(AppError::Unauthorized("Access token required".into()));
    }
    Ok(claims.sub)
}

/// Caller identity from a required `Authorization: Bearer` access token.
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))??;
        Ok(AuthUser(access_subject(&keys, token)?))
    }
}

/// Like [`AuthUser`], but a request without credentials yields `None`.
/// Credentials that are present must still be valid.
pub struct MaybeAuthUser(pub Option<Uuid>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        match bearer_token(parts) {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => Ok(MaybeAuthUser(Some(access_subject(&keys, token?)?))),
        }
    }
}
