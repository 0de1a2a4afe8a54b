use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::config::{AppConfig, Participant};
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "pickem_session";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64, // user id
    pub name: String,
    pub exp: usize,
}

pub fn issue_token(config: &AppConfig, user: &Participant) -> anyhow::Result<String> {
    let exp = (Utc::now() + Duration::hours(config.session_ttl_hours)).timestamp();
    let claims = Claims {
        sub: user.id,
        name: user.name.clone(),
        exp: exp.max(0) as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )?)
}

pub fn verify_token(config: &AppConfig, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.session_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .ok()
    .map(|data| data.claims)
}

pub fn session_cookie(token: &str, config: &AppConfig) -> Option<HeaderValue> {
    let max_age = config.session_ttl_hours * 3600;
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age
    ))
    .ok()
}

pub fn cleared_session_cookie() -> HeaderValue {
    HeaderValue::from_static("pickem_session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

/// Token from `Authorization: Bearer …` or the session cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// The logged-in participant.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = extract_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let claims = verify_token(&state.config, &token).ok_or(AppError::Unauthorized)?;

        // The directory may have changed since the token was issued
        let user = state
            .config
            .users
            .iter()
            .find(|u| u.id == claims.sub && u.name == claims.name)
            .ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser {
            id: user.id,
            name: user.name.clone(),
        })
    }
}

/// A logged-in participant from the admin set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let state = AppState::from_ref(state);
        if !state.config.is_admin(&user.name) {
            tracing::warn!("{} tried to access an admin endpoint", user.name);
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}
