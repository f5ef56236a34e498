// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::IngressState;
use super::error::Error;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Operator the token was issued to.
    pub sub: String,
    /// Expiry, Unix seconds.
    pub exp: usize,
    /// Issue time, Unix seconds.
    pub iat: usize,
}

impl Claims {
    pub fn new(sub: impl Into<String>, lifetime_minutes: i64) -> Self {
        let now = chrono::Utc::now().timestamp() as usize;
        Self {
            sub: sub.into(),
            iat: now,
            exp: now + (lifetime_minutes.max(0) as usize) * 60,
        }
    }
}

/// Bearer token of the `Authorization` header.
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Checks signature and expiry, then that the token was not minted with a
/// lifetime longer than `token_expire_time` minutes.
fn verify(token: &str, secret: &str, token_expire_time: i64) -> Result<Claims, &'static str> {
    let claims = match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::warn!("JWT validation failed: {}", e);
            return Err("invalid or expired token");
        }
    };

    let max_lifetime = (token_expire_time.max(0) as usize) * 60;
    if claims.exp.saturating_sub(claims.iat) > max_lifetime {
        tracing::warn!(
            "token of {} outlives the allowed {} minutes",
            claims.sub,
            token_expire_time
        );
        return Err("token lifetime too long");
    }
    Ok(claims)
}

/// Verifies the bearer JWT and puts its claims into the request extensions.
pub async fn auth_middleware(
    State(state): State<IngressState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/healthz" || path == "/readyz" {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(&request) else {
        return unauthorized("missing bearer token");
    };

    let claims = match verify(token, &state.jwt_secret, state.token_expire_time) {
        Ok(claims) => claims,
        Err(message) => return unauthorized(message),
    };

    request.extensions_mut().insert(claims);
    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    Error::Unauthorized {
        message: message.to_string(),
    }
    .into_response()
}
