//! Identity verification flow at the boundary with the OAuth provider.
//! The wire protocol belongs to the provider; this module only sequences
//! the exchange, validates the resulting assertion, and updates the
//! session. Nothing is stored on the session until every check has passed.

use tracing::info;

use crate::catalog::SharedCatalog;
use crate::error::{AppError, AppResult};

use super::provider::OAuthProvider;
use super::resolver;
use super::session::SessionManager;
use super::Principal;

/// How a successful connect call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    SignedIn(Principal),
    /// The session already held this exact identity; nothing was re-stored.
    AlreadyConnected(Principal),
}

/// Exchange an authorization code for a verified identity and attach it to
/// the session. Aborts with an authentication failure, and mutates no
/// session state, when the anti-forgery state is wrong, the exchange fails,
/// or the token's audience/subject checks fail.
pub async fn connect(
    sessions: &SessionManager,
    catalog: &SharedCatalog,
    provider: &dyn OAuthProvider,
    client_id: &str,
    sid: &str,
    submitted_state: &str,
    code: &str,
) -> AppResult<ConnectOutcome> {
    if !sessions.verify_state(sid, submitted_state) {
        return Err(AppError::auth("invalid_state", "invalid state parameter"));
    }

    let creds = provider.exchange_code(code).await?;
    let info = provider.validate_token(&creds.access_token).await?;
    if info.user_id != creds.subject {
        return Err(AppError::auth(
            "subject_mismatch",
            "token's user id does not match the credential subject",
        ));
    }
    if info.audience != client_id {
        return Err(AppError::auth(
            "audience_mismatch",
            "token was not issued to this application",
        ));
    }

    // Idempotent re-authentication: the same subject on the same session
    // reports success without touching stored state.
    if sessions.connected_subject(sid).as_deref() == Some(creds.subject.as_str()) {
        let principal = sessions
            .context(Some(sid))
            .principal
            .ok_or_else(|| AppError::internal("session_state", "connected session lost its principal"))?;
        return Ok(ConnectOutcome::AlreadyConnected(principal));
    }

    let profile = provider.fetch_profile(&creds.access_token).await?;
    let user_id = {
        let mut guard = catalog.0.lock();
        resolver::resolve(&mut *guard, &profile)?
    };
    let principal = Principal {
        user_id,
        name: profile.name,
        email: profile.email,
        picture: profile.picture,
    };
    sessions.attach_identity(sid, principal.clone(), &creds.access_token, &creds.subject);
    info!(target: "curio::identity", "connected sid={} user_id={}", sid, user_id);
    Ok(ConnectOutcome::SignedIn(principal))
}

/// Revoke the session's provider token and drop the local identity. The
/// local state is cleared even when the provider reports the token already
/// invalid, but that case is still surfaced to the caller as a failure.
pub async fn disconnect(
    sessions: &SessionManager,
    provider: &dyn OAuthProvider,
    sid: &str,
) -> AppResult<()> {
    let Some(token) = sessions.access_token(sid) else {
        return Err(AppError::auth("not_connected", "current user not connected"));
    };
    let revoked = provider.revoke_token(&token).await;
    sessions.clear(sid);
    info!(target: "curio::identity", "disconnected sid={}", sid);
    match revoked {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::external(
            "revoke_rejected",
            "failed to revoke token for given user",
        )),
        Err(e) => Err(e),
    }
}
