//! Domain entities persisted by the identity store.

pub mod application;
pub mod connection;
pub mod grant;
pub mod scope;
pub mod session;
pub mod user;

pub use application::{Application, ApplicationInfo};
pub use connection::{Connection, ConnectionInfo, ConnectionSummary, ACCESS_TOKEN_LIFETIME_SECONDS};
pub use grant::{Grant, GRANT_LIFETIME_SECONDS};
pub use scope::Scopes;
pub use session::{
    Session, SessionContext, SessionInfo, ELEVATION_LIFETIME_SECONDS, NO_APPLICATION,
    SESSION_LIFETIME_SECONDS,
};
pub use user::{
    push_password_history, Profile, User, EMAIL_TOKEN_LIFETIME_SECONDS, PASSWORD_HISTORY_LIMIT,
};
