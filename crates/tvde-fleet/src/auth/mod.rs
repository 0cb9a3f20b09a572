//! Accounts, roles and the bearer-token extractor used by every `/api` route.

pub mod extractor;
pub mod roles;
pub mod router;
pub mod service;

pub use extractor::{AuthUser, TenantQuery};
pub use roles::{Permission, Role};
pub use router::auth_router;
pub use service::{AuthError, AuthService, IssuedToken, NewAccount, UserAccount};
