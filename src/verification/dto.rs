use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// The code itself is never echoed back.
#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}
