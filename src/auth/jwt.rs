use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::config::JwtConfig;
use crate::error::AppError;

use super::Claims;

/// Checks the HS256 session tokens the social backend signs at login.
pub struct JwtValidator {
    key: DecodingKey,
    rules: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let mut rules = Validation::new(Algorithm::HS256);
        if let Some(issuer) = config.issuer.as_deref() {
            rules.set_issuer(&[issuer]);
        }
        if let Some(audience) = config.audience.as_deref() {
            rules.set_audience(&[audience]);
        }

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            rules,
        }
    }

    /// Decode `token` and return its claims. The subject must be non-blank.
    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token.trim(), &self.key, &self.rules)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(AppError::Auth("Token carries no subject".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    const SECRET: &str = "relay-test-secret";

    fn validator() -> JwtValidator {
        JwtValidator::new(&JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        })
    }

    fn sign(claims: Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_secs(offset: i64) -> i64 {
        chrono::Utc::now().timestamp() + offset
    }

    #[test]
    fn test_sub_claim_accepted() {
        let token = sign(json!({"sub": "u1", "exp": in_secs(3600)}), SECRET);
        let claims = validator().validate(&token).unwrap();
        assert_eq!(claims.user_id(), "u1");
    }

    #[test]
    fn test_login_token_user_id_claim() {
        // Login tokens carry { userId, iat, exp } with a 15 day lifetime
        let token = sign(
            json!({"userId": "65f1c0ffee", "iat": in_secs(0), "exp": in_secs(15 * 24 * 3600)}),
            SECRET,
        );
        assert_eq!(validator().validate(&token).unwrap().user_id(), "65f1c0ffee");
    }

    #[test]
    fn test_rejections() {
        let v = validator();

        let foreign = sign(json!({"sub": "u1", "exp": in_secs(3600)}), "other-secret");
        assert!(matches!(v.validate(&foreign), Err(AppError::Auth(_))));

        let expired = sign(json!({"sub": "u1", "exp": in_secs(-3600)}), SECRET);
        assert!(matches!(v.validate(&expired), Err(AppError::Auth(_))));

        let blank = sign(json!({"sub": "  ", "exp": in_secs(3600)}), SECRET);
        assert!(matches!(v.validate(&blank), Err(AppError::Auth(_))));

        assert!(v.validate("not.a.jwt").is_err());
    }
}
