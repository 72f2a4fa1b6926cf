//! Bearer-JWT gate for the webhook route.
//!
//! Tokens are HS256-signed with the shared webhook secret. No claim is
//! required; `exp` is enforced only when the token carries one.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::warn;

use docenrich_shared::{EnrichError, Result};

use crate::router::StatusBody;

/// Verification settings, shared with the middleware as an extension.
#[derive(Clone)]
pub struct JwtConfig {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtConfig {
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Check signature and expiry of a raw token.
    pub fn verify(&self, token: &str) -> Result<()> {
        decode::<serde_json::Value>(token, &self.key, &self.validation)
            .map(|_| ())
            .map_err(|e| EnrichError::Auth(e.to_string()))
    }

    /// Verify the `Authorization: Bearer <token>` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<()> {
        let header =
            header.ok_or_else(|| EnrichError::Auth("missing Authorization header".into()))?;
        let (scheme, token) = header
            .split_once(' ')
            .ok_or_else(|| EnrichError::Auth("malformed Authorization header".into()))?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(EnrichError::Auth(format!("unsupported scheme {scheme}")));
        }
        self.verify(token.trim())
    }
}

/// Middleware rejecting requests without a valid bearer token.
pub async fn jwt_auth(
    Extension(jwt): Extension<JwtConfig>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = jwt.verify_header(header) {
        warn!(error = %e, "rejected webhook request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(StatusBody::new("unauthorized")),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    use super::*;

    const SECRET: &[u8] = b"webhook-secret";

    #[derive(Serialize)]
    struct Claims {
        iss: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        exp: Option<u64>,
    }

    fn token(secret: &[u8], exp: Option<u64>) -> String {
        encode(
            &Header::default(),
            &Claims {
                iss: "collection-service",
                exp,
            },
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn now() -> u64 {
        jsonwebtoken::get_current_timestamp()
    }

    #[test]
    fn accepts_token_without_exp() {
        let jwt = JwtConfig::from_secret(SECRET);
        jwt.verify(&token(SECRET, None)).unwrap();
    }

    #[test]
    fn accepts_unexpired_token() {
        let jwt = JwtConfig::from_secret(SECRET);
        jwt.verify(&token(SECRET, Some(now() + 600))).unwrap();
    }

    #[test]
    fn rejects_expired_token() {
        let jwt = JwtConfig::from_secret(SECRET);
        let err = jwt.verify(&token(SECRET, Some(now() - 3600))).unwrap_err();
        assert!(matches!(err, EnrichError::Auth(_)));
    }

    #[test]
    fn rejects_wrong_secret() {
        let jwt = JwtConfig::from_secret(SECRET);
        assert!(jwt.verify(&token(b"other", None)).is_err());
    }

    #[test]
    fn parses_bearer_header() {
        let jwt = JwtConfig::from_secret(SECRET);
        let value = format!("Bearer {}", token(SECRET, None));
        jwt.verify_header(Some(&value)).unwrap();
        jwt.verify_header(Some(&value.replace("Bearer", "bearer")))
            .unwrap();

        assert!(jwt.verify_header(None).is_err());
        assert!(jwt.verify_header(Some("Bearer")).is_err());
        assert!(
            jwt.verify_header(Some(&format!("Basic {}", token(SECRET, None))))
                .is_err()
        );
    }
}
