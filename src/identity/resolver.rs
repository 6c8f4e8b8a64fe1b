use tracing::info;

use crate::catalog::CatalogStore;
use crate::error::AppResult;

use super::provider::Profile;

/// Map an external identity (email) to an internal user id, creating the
/// user on first sight. Idempotent per email: a second call with the same
/// email returns the same id and creates no duplicate. The store guarantees
/// the insert is atomic per email, so resolution never half-creates a user.
pub fn resolve(store: &mut dyn CatalogStore, profile: &Profile) -> AppResult<i64> {
    if let Some(user) = store.user_by_email(&profile.email)? {
        return Ok(user.id);
    }
    let user = store.create_user(&profile.name, &profile.email, profile.picture.as_deref())?;
    info!(target: "curio::identity", "resolver created user id={} email={}", user.id, user.email);
    Ok(user.id)
}
