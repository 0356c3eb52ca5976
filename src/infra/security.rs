//! Credential handling: password hashes and signed access tokens.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ports::{
    HashError, IssuedToken, PasswordHasher, Principal, TokenError, TokenIssuer,
};
use crate::domain::users::{Role, User};
use crate::util::clock::Clock;

/// bcrypt hashes in the modular crypt format (`$2b$<cost>$...`).
#[derive(Debug, Clone, Copy)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptPasswordHasher {
    fn hash(&self, password: &str) -> Result<String, HashError> {
        bcrypt::hash(password, self.cost).map_err(|err| HashError(err.to_string()))
    }

    fn verify(&self, password: &str, encoded: &str) -> bool {
        bcrypt::verify(password, encoded).unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    name: String,
    role: String,
    iss: String,
    iat: i64,
    exp: i64,
}

/// HS256 JSON web tokens.
pub struct JwtTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtTokenIssuer {
    pub fn new(secret: &str, issuer: impl Into<String>, lifetime: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            lifetime,
            clock,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, user: &User) -> Result<IssuedToken, TokenError> {
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.lifetime;
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.full_name(),
            role: user.role.as_str().to_string(),
            iss: self.issuer.clone(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Issue(err.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation()).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err.to_string()),
            }
        })?;
        let claims = data.claims;
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|err| TokenError::Invalid(err.to_string()))?;
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|err| TokenError::Invalid(err.to_string()))?;
        Ok(Principal {
            user_id,
            email: claims.email,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use crate::util::clock::{ManualClock, SystemClock};

    use super::*;

    fn user(role: Role) -> User {
        User::register(
            "reader@example.com",
            "hash".to_string(),
            "Ada",
            "Lovelace",
            role,
            OffsetDateTime::now_utc(),
        )
    }

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let hasher = BcryptPasswordHasher::new(4);
        let first = hasher.hash("correct horse").expect("hash");
        let second = hasher.hash("correct horse").expect("hash");

        assert_ne!(first, second);
        assert!(first.starts_with("$2b$04$"));
        assert!(hasher.verify("correct horse", &first));
        assert!(!hasher.verify("wrong horse", &first));
    }

    #[test]
    fn hashes_carry_their_cost() {
        let encoded = BcryptPasswordHasher::new(5).hash("pw").expect("hash");
        assert!(encoded.starts_with("$2b$05$"));
        // A hasher configured with another cost still verifies it.
        assert!(BcryptPasswordHasher::new(4).verify("pw", &encoded));
    }

    #[test]
    fn out_of_range_cost_is_an_error() {
        assert!(BcryptPasswordHasher::new(3).hash("pw").is_err());
    }

    #[test]
    fn malformed_hashes_never_verify() {
        let hasher = BcryptPasswordHasher::new(4);
        for encoded in ["", "$2b$04$short", "sha256$salt$00", "plaintext"] {
            assert!(!hasher.verify("anything", encoded), "{encoded}");
        }
    }

    #[test]
    fn issued_tokens_round_trip_to_principal() {
        let issuer = JwtTokenIssuer::new(
            "test-secret",
            "shelfmark",
            Duration::from_secs(3600),
            Arc::new(SystemClock),
        );
        let admin = user(Role::Admin);

        let issued = issuer.issue(&admin).expect("issue");
        let principal = issuer.verify(&issued.token).expect("verify");

        assert_eq!(principal.user_id, admin.id);
        assert_eq!(principal.email, "reader@example.com");
        assert!(principal.is_admin());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let past = OffsetDateTime::now_utc() - time::Duration::hours(2);
        let issuer = JwtTokenIssuer::new(
            "test-secret",
            "shelfmark",
            Duration::from_secs(60),
            Arc::new(ManualClock::new(past)),
        );
        let issued = issuer.issue(&user(Role::User)).expect("issue");

        assert!(matches!(issuer.verify(&issued.token), Err(TokenError::Expired)));
    }

    #[test]
    fn tokens_from_another_secret_are_invalid() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ours = JwtTokenIssuer::new("ours", "shelfmark", Duration::from_secs(60), clock.clone());
        let theirs = JwtTokenIssuer::new("theirs", "shelfmark", Duration::from_secs(60), clock);
        let issued = theirs.issue(&user(Role::User)).expect("issue");

        assert!(matches!(ours.verify(&issued.token), Err(TokenError::Invalid(_))));
    }
}
