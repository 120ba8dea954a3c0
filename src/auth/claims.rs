use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID). Tokens issued by the social backend carry it as `userId`.
    #[serde(alias = "userId")]
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_alias() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "userId": "65f1c0ffee",
            "exp": 4102444800i64,
            "iat": 1700000000
        }))
        .unwrap();

        assert_eq!(claims.user_id(), "65f1c0ffee");
        assert!(claims.extra.is_empty());
    }
}
