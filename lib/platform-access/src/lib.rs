//! Users, groups, sessions and bearer credentials for gatehouse.
//!
//! This crate holds everything about platform access that does not depend on
//! HTTP or a particular database:
//! - OIDC relying-party configuration (`OidcConfig`)
//! - Verified claims and the claim-to-account mapping (`OidcClaims`, `ClaimMapping`)
//! - The local user record and its group memberships (`User`, `MembershipChange`)
//! - User synchronization on login (`UserSynchronizer`)
//! - Browser sessions (`Session`, `SessionId`)
//! - Bearer credentials for API clients (`TokenIssuer`)
//! - Storage traits (`UserStore`, `SessionStore`), with in-memory
//!   implementations behind the `test-util` feature
//!
//! # Example
//!
//! ```
//! use gatehouse_platform_access::{ClaimMapping, OidcClaims, User};
//!
//! let claims = OidcClaims::new("u1".to_string(), "https://auth.example.com".to_string())
//!     .with_email(Some("a@x.com".to_string()))
//!     .with_groups(vec!["editors".to_string()]);
//!
//! let attributes = ClaimMapping::default().attributes(&claims);
//! let user = User::from_attributes(claims.subject.clone(), attributes);
//!
//! assert!(user.is_member_of("editors"));
//! assert_eq!(user.username(), "a@x.com");
//! ```

pub mod auth;
pub mod error;
pub mod group;
pub mod mapping;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod oidc;
pub mod session;
pub mod store;
pub mod sync;
pub mod token;
pub mod user;

pub use auth::{AuthenticatedUser, OidcClaims};
pub use error::{StoreError, SyncError, TokenError};
pub use group::MembershipChange;
pub use mapping::{ClaimMapping, UserAttributes};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemorySessionStore, MemoryUserStore};
pub use oidc::{OidcConfig, OidcConfigBuilder};
pub use session::{Session, SessionId};
pub use store::{SessionStore, UserStore};
pub use sync::{SyncOutcome, SyncStatus, UserSynchronizer};
pub use token::{BearerToken, TokenIssuer};
pub use user::{User, UserChange};
