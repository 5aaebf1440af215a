use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    config::Env,
    credentials::{Claims, Role, TOKEN_TTL_SECS, TokenIssuer},
    error::AppError,
};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "token";

/// AuthUser
///
/// The resolved identity of an authenticated request, decoded once from the
/// session token. Handlers take it as an argument; the `require_auth` layer
/// has usually already attached it to the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_superadmin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// resolve
    ///
    /// `Unauthenticated -> TokenPresent -> Validated`. Missing and invalid
    /// tokens are answered identically so the client learns nothing about why.
    pub fn resolve(headers: &HeaderMap, tokens: &TokenIssuer) -> Result<Self, AppError> {
        let token = session_token(headers).ok_or_else(AppError::unauthenticated)?;
        let claims = tokens
            .validate(token)
            .ok_or_else(|| AppError::Unauthenticated("Invalid or expired token".into()))?;
        Ok(claims.into())
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.user_id,
            username: claims.username,
            role: claims.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Reuses the identity tagged by `require_auth` when present, otherwise
/// validates the token itself. Rejects with 401 on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }
        let tokens = TokenIssuer::from_ref(state);
        AuthUser::resolve(&parts.headers, &tokens)
    }
}

/// SuperAdmin
///
/// Extractor for handlers that only a superadmin may call. A valid identity
/// with a lesser role is rejected with 403, not 401.
#[derive(Debug, Clone)]
pub struct SuperAdmin(pub AuthUser);

impl<S> FromRequestParts<S> for SuperAdmin
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_superadmin() {
            return Err(AppError::Forbidden);
        }
        Ok(SuperAdmin(user))
    }
}

/// require_auth
///
/// Layer for every protected route group: validates the token and tags the
/// request with the caller's `AuthUser`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = AuthUser::resolve(request.headers(), &state.tokens)?;
    tracing::debug!(user_id = user.id, role = user.role.as_str(), "Authenticated request");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// require_superadmin
///
/// Second gate, layered inside `require_auth`.
pub async fn require_superadmin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(AppError::unauthenticated)?;
    if !user.is_superadmin() {
        tracing::warn!(user_id = user.id, "Superadmin route refused");
        return Err(AppError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// session_token
///
/// The `token` cookie, or failing that an `Authorization: Bearer` header.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    cookie_value(headers, SESSION_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    })
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let (key, val) = cookie.split_once('=')?;
            (key.trim() == name && !val.trim().is_empty()).then(|| val.trim())
        })
}

fn cookie_attributes(env: Env) -> &'static str {
    match env {
        Env::Production => "HttpOnly; Secure; SameSite=None; Path=/",
        Env::Local => "HttpOnly; SameSite=Lax; Path=/",
    }
}

/// `Set-Cookie` value carrying a fresh session token (24 h).
pub fn session_cookie(token: &str, env: Env) -> String {
    format!(
        "{SESSION_COOKIE}={token}; {}; Max-Age={TOKEN_TTL_SECS}",
        cookie_attributes(env)
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(env: Env) -> String {
    format!("{SESSION_COOKIE}=; {}; Max-Age=0", cookie_attributes(env))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn cookie_wins_over_bearer_header() {
        let map = headers(&[
            (header::COOKIE, "theme=dark; token=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(session_token(&map), Some("from-cookie"));
    }

    #[test]
    fn bearer_header_is_the_fallback() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(session_token(&map), Some("abc.def.ghi"));

        let basic = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(session_token(&basic), None);
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let map = headers(&[(header::COOKIE, "token=")]);
        assert_eq!(session_token(&map), None);
    }

    #[test]
    fn resolve_distinguishes_nothing_about_bad_tokens() {
        let tokens = TokenIssuer::new("s");
        let missing = AuthUser::resolve(&HeaderMap::new(), &tokens).unwrap_err();
        let garbage = AuthUser::resolve(
            &headers(&[(header::AUTHORIZATION, "Bearer nope")]),
            &tokens,
        )
        .unwrap_err();
        assert_eq!(missing.status(), garbage.status());
    }

    #[test]
    fn cookie_flags_follow_environment() {
        let local = session_cookie("t", Env::Local);
        assert!(local.contains("HttpOnly"));
        assert!(local.contains("SameSite=Lax"));
        assert!(!local.contains("Secure"));
        assert!(local.contains("Max-Age=86400"));

        let prod = session_cookie("t", Env::Production);
        assert!(prod.contains("Secure"));
        assert!(prod.contains("SameSite=None"));

        assert!(clear_session_cookie(Env::Local).contains("Max-Age=0"));
    }
}
