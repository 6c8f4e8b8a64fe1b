//! Central identity, session, and authorization management for curio.
//! Keep the public surface thin and split implementation across sub-modules.

mod connect;
mod gate;
mod principal;
mod provider;
mod resolver;
mod session;

pub use connect::{connect, disconnect, ConnectOutcome};
pub use gate::{with_authentication, with_ownership, LOGIN_PATH};
pub use principal::Principal;
pub use provider::{Credentials, GoogleProvider, OAuthProvider, Profile, TokenInfo};
pub use resolver::resolve;
pub use session::{Session, SessionContext, SessionManager, STATE_TOKEN_LEN};
