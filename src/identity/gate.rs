//! Authorization gate wrapped around mutating catalog operations.
//! Two checks, evaluated in order: the session must carry an authenticated
//! user, and for operations on an existing item the session user must be
//! the item's owner. Rejections happen before the operation runs, so a
//! denied call has no side effects.

use crate::error::{AppError, AppResult};

use super::session::SessionContext;

/// Where unauthenticated callers are sent instead of performing the operation.
pub const LOGIN_PATH: &str = "/login";

/// Run `op` with the authenticated user id, or fail with an authentication
/// error that directs the caller to the login entry point.
pub fn with_authentication<T>(
    ctx: &SessionContext,
    op: impl FnOnce(i64) -> AppResult<T>,
) -> AppResult<T> {
    match ctx.user_id() {
        Some(user_id) => op(user_id),
        None => Err(AppError::auth("login_required", "sign in to continue")),
    }
}

/// Authentication plus ownership: `op` runs only when the session user owns
/// the target. The mismatch message is generic and does not reveal whether
/// the item exists under a different owner.
pub fn with_ownership<T>(
    ctx: &SessionContext,
    owner_id: i64,
    op: impl FnOnce(i64) -> AppResult<T>,
) -> AppResult<T> {
    with_authentication(ctx, |user_id| {
        if user_id != owner_id {
            return Err(AppError::forbidden(
                "not_owner",
                "you are not authorized to modify this item",
            ));
        }
        op(user_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Principal;

    fn authenticated(user_id: i64) -> SessionContext {
        SessionContext {
            session_id: Some("sid".into()),
            principal: Some(Principal {
                user_id,
                name: "U".into(),
                email: "u@example.com".into(),
                picture: None,
            }),
        }
    }

    #[test]
    fn anonymous_caller_is_rejected_without_running_op() {
        let ctx = SessionContext::default();
        let mut ran = false;
        let res = with_authentication(&ctx, |_| {
            ran = true;
            Ok(())
        });
        assert!(matches!(res, Err(AppError::Auth { .. })));
        assert!(!ran);
    }

    #[test]
    fn owner_passes_both_gates() {
        let ctx = authenticated(3);
        let res = with_ownership(&ctx, 3, |uid| Ok(uid * 2));
        assert_eq!(res.unwrap(), 6);
    }

    #[test]
    fn non_owner_is_denied_generically() {
        let ctx = authenticated(3);
        let mut ran = false;
        let res = with_ownership(&ctx, 4, |_| {
            ran = true;
            Ok(())
        });
        let err = res.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        // The message must not mention the item or its owner
        assert!(!err.message().contains('4'));
        assert!(!ran);
    }
}
