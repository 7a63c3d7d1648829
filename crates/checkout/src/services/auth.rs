//! The signed-in session as seen by the checkout engine.
//!
//! Session management itself lives outside this crate; the engine only needs
//! to know who is signed in, whether they are a member, and how to refresh a
//! token that is about to expire.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;
use tracing::debug;

use danceflow_core::UserId;

/// Errors raised by the session collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Nobody is signed in.
    #[error("sign-in required")]
    SignInRequired,

    /// The session expired and could not be renewed.
    #[error("session expired")]
    SessionExpired,

    /// The refresh call itself failed.
    #[error("session refresh failed: {0}")]
    RefreshFailed(String),
}

/// Who is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    /// Holder of an active platform subscription (member pricing applies).
    pub is_member: bool,
}

/// An authenticated session.
#[async_trait]
pub trait AuthSession: Send + Sync {
    /// The signed-in identity, if any.
    fn identity(&self) -> Option<Identity>;

    /// When the current access token expires.
    fn expires_at(&self) -> Option<DateTime<Utc>>;

    /// Bearer token for calls to the order service.
    fn access_token(&self) -> Option<SecretString>;

    /// Renew the access token.
    async fn refresh(&self) -> Result<(), AuthError>;
}

/// Make sure the session is valid for at least `leeway`, refreshing if needed.
///
/// Returns the identity and a token that is good to use right now.
///
/// # Errors
///
/// Returns `AuthError::SignInRequired` without a session, and
/// `AuthError::SessionExpired` if the token is still expired after a refresh.
pub async fn ensure_fresh(
    session: &dyn AuthSession,
    leeway: Duration,
    now: DateTime<Utc>,
) -> Result<(Identity, SecretString), AuthError> {
    let identity = session.identity().ok_or(AuthError::SignInRequired)?;

    let leeway = chrono::Duration::from_std(leeway).unwrap_or_else(|_| chrono::Duration::weeks(52));
    let expiring = session
        .expires_at()
        .is_none_or(|expires_at| expires_at - now < leeway);

    if expiring {
        debug!(user_id = %identity.user_id, "Refreshing session before checkout");
        session.refresh().await?;
        if session.expires_at().is_none_or(|expires_at| expires_at <= now) {
            return Err(AuthError::SessionExpired);
        }
    }

    let token = session.access_token().ok_or(AuthError::SignInRequired)?;
    Ok((identity, token))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::FakeAuthSession;

    const LEEWAY: Duration = Duration::from_secs(120);

    #[tokio::test]
    async fn test_fresh_session_is_not_refreshed() {
        let now = Utc::now();
        let session = FakeAuthSession::signed_in(UserId::new(1), false)
            .expiring_at(now + chrono::Duration::minutes(30));

        let (identity, _token) = ensure_fresh(&session, LEEWAY, now).await.unwrap();
        assert_eq!(identity.user_id, UserId::new(1));
        assert_eq!(session.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_session_inside_leeway_is_refreshed() {
        let now = Utc::now();
        let session = FakeAuthSession::signed_in(UserId::new(1), true)
            .expiring_at(now + chrono::Duration::seconds(30))
            .refreshing_to(now + chrono::Duration::hours(1));

        let (identity, _token) = ensure_fresh(&session, LEEWAY, now).await.unwrap();
        assert!(identity.is_member);
        assert_eq!(session.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_that_leaves_token_expired_fails() {
        let now = Utc::now();
        let session = FakeAuthSession::signed_in(UserId::new(1), false)
            .expiring_at(now - chrono::Duration::minutes(5))
            .refreshing_to(now - chrono::Duration::minutes(1));

        let err = ensure_fresh(&session, LEEWAY, now).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
    }

    #[tokio::test]
    async fn test_failed_refresh_is_propagated() {
        let now = Utc::now();
        let session = FakeAuthSession::signed_in(UserId::new(1), false)
            .expiring_at(now + chrono::Duration::seconds(10));
        session.fail_refresh(true);

        let err = ensure_fresh(&session, LEEWAY, now).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn test_anonymous_session_requires_sign_in() {
        let session = FakeAuthSession::anonymous();
        let err = ensure_fresh(&session, LEEWAY, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AuthError::SignInRequired));
        assert_eq!(session.refresh_count(), 0);
    }
}
