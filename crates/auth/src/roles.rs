use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role carried in a token and stored on a user profile.
///
/// SiteBook knows two roles: `admin` runs the company, `manager` runs the
/// projects assigned to them. Tokens may carry other strings; they simply
/// grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const MANAGER: &'static str = "manager";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self(Cow::Borrowed(Self::ADMIN))
    }

    pub fn manager() -> Self {
        Self(Cow::Borrowed(Self::MANAGER))
    }

    /// Parse a role name supplied by a client, accepting only known roles.
    pub fn parse_known(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            Self::ADMIN => Some(Self::admin()),
            Self::MANAGER => Some(Self::manager()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str() == Self::ADMIN
    }

    pub fn is_manager(&self) -> bool {
        self.as_str() == Self::MANAGER
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_is_case_insensitive_and_closed() {
        assert_eq!(Role::parse_known(" Admin "), Some(Role::admin()));
        assert_eq!(Role::parse_known("manager"), Some(Role::manager()));
        assert_eq!(Role::parse_known("foreman"), None);
    }
}
