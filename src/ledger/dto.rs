use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::users::dto::UserView;

/// Amounts arrive as JSON numbers or numeric strings.
#[derive(Debug, Deserialize)]
pub struct UpdateStatsRequest {
    #[serde(default)]
    pub added_balance: Option<Value>,
    #[serde(default)]
    pub added_kg: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PayUtilityRequest {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub account_number: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
}

impl PayUtilityRequest {
    /// Account numbers are sometimes sent as bare JSON numbers.
    pub fn account_text(&self) -> Option<String> {
        match self.account_number.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    #[serde(flatten)]
    pub user: UserView,
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_number_may_be_numeric() {
        let req: PayUtilityRequest =
            serde_json::from_str(r#"{"provider":"Gas","account_number":1234567,"amount":"10"}"#)
                .unwrap();
        assert_eq!(req.account_text().as_deref(), Some("1234567"));

        let req: PayUtilityRequest = serde_json::from_str(r#"{"provider":"Gas"}"#).unwrap();
        assert_eq!(req.account_text(), None);
        assert!(req.amount.is_none());
    }
}
