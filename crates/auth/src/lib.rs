//! `sitebook-auth`: who is calling and what they may do.
//!
//! Roles, permissions, the admin/manager policy, JWT claims and the user
//! directory aggregate. Decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{authorize, AuthzError, CommandAuthorization, Principal};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::{role_permissions, Permission};
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;
pub use user::{
    ChangeUserRole, RegisterUser, UpdateUserProfile, User, UserCommand, UserEvent, UserProfileUpdated,
    UserRegistered, UserRoleChanged,
};
