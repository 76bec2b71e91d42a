use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Role, User};

/// Public view of a user, as returned by every account endpoint.
/// Weight and join date are also exposed under camel-case names for the
/// web client.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub balance: Decimal,
    pub total_recycled_kg: Decimal,
    #[serde(rename = "totalRecycledKg")]
    pub total_recycled_kg_camel: Decimal,
    pub level: i32,
    pub join_date: String,
    #[serde(rename = "joinDate")]
    pub join_date_camel: String,
    pub role: Role,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        let join_date = u.join_date.to_string();
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            name: u.display_name(),
            balance: u.balance,
            total_recycled_kg: u.total_recycled_kg,
            total_recycled_kg_camel: u.total_recycled_kg,
            level: u.level,
            join_date: join_date.clone(),
            join_date_camel: join_date,
            role: u.role,
        }
    }
}

/// User view plus a fresh token pair.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: UserView,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default, alias = "username")]
    pub username_or_email: String,
    #[serde(default)]
    pub password: String,
}

/// Profile edit. Balance, weight and level are never writable here.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckEmailResponse {
    pub exists: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
