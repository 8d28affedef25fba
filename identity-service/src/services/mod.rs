//! Business logic for the identity provider.
//!
//! Every service receives its collaborators through its constructor; nothing here reads
//! process-wide state.

pub mod account;
pub mod applications;
pub mod background;
pub mod clock;
pub mod email;
pub mod error;
pub mod geolocation;
pub mod mfa;
pub mod oauth2;
pub mod rate_limit;
pub mod session;
pub mod snowflake;
pub mod storage;
pub mod store;

pub use account::{AccountService, Device, Notifier};
pub use applications::ApplicationService;
pub use background::BackgroundQueue;
pub use clock::{Clock, ManualClock, SystemClock};
pub use email::{EmailProvider, MockEmailService, NoneEmail, Notification, SmtpEmailService};
pub use error::ServiceError;
pub use geolocation::{GeolocationProvider, MockGeolocation, NoneGeolocation};
pub use mfa::MfaService;
pub use oauth2::{ClientCredentials, OAuth2Service};
pub use rate_limit::{create_rate_limiter, MemoryRateLimiter, RateLimitStore};
pub use session::{Credential, SessionResolver};
pub use snowflake::SnowflakeGenerator;
pub use storage::{DiskStorage, MockStorage, NoneStorage, StorageProvider};
pub use store::{IdentityStore, MemoryStore, PgStore, StoreError};
