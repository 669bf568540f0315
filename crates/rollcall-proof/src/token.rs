use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProofError;

/// Claims carried by a QR check-in token. Deliberately shares no field names
/// with session claims, so neither kind of token decodes as the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinClaims {
    pub activity_id: Uuid,
    pub exp: usize,
}

/// Issues and verifies HS256 tokens that bind one activity until its window closes.
#[derive(Clone)]
pub struct CheckinTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl CheckinTokens {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token for `activity_id` that stays valid for `valid_for`.
    pub fn issue(
        &self,
        activity_id: Uuid,
        valid_for: Duration,
    ) -> Result<(String, DateTime<Utc>), ProofError> {
        let expires_at = Utc::now() + valid_for;
        let claims = CheckinClaims {
            activity_id,
            exp: expires_at.timestamp().max(0) as usize,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ProofError::Issue(e.to_string()))?;

        Ok((token, expires_at))
    }

    /// Check signature, expiry and that the token was issued for `activity_id`.
    pub fn verify(&self, token: &str, activity_id: Uuid) -> Result<(), ProofError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<CheckinClaims>(token, &self.decoding, &validation)
            .map_err(|_| ProofError::InvalidToken)?;

        if data.claims.activity_id != activity_id {
            return Err(ProofError::TokenMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_bound_to_its_activity() {
        let tokens = CheckinTokens::new(b"secret");
        let id = Uuid::now_v7();
        let (token, expires_at) = tokens.issue(id, Duration::minutes(10)).unwrap();

        assert!(expires_at > Utc::now());
        assert_eq!(tokens.verify(&token, id), Ok(()));
        assert_eq!(
            tokens.verify(&token, Uuid::now_v7()),
            Err(ProofError::TokenMismatch)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = CheckinTokens::new(b"secret");
        let id = Uuid::now_v7();
        let (token, _) = tokens.issue(id, Duration::seconds(-30)).unwrap();
        assert_eq!(tokens.verify(&token, id), Err(ProofError::InvalidToken));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let id = Uuid::now_v7();
        let (token, _) = CheckinTokens::new(b"one")
            .issue(id, Duration::minutes(1))
            .unwrap();
        assert_eq!(
            CheckinTokens::new(b"two").verify(&token, id),
            Err(ProofError::InvalidToken)
        );
    }
}
