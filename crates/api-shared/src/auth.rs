//! Header authentication.
//!
//! Every protected request carries three headers:
//!
//! - `x-api-key`: must equal the key configured at startup
//! - `x-lab-user`: the acting user's name, recorded on events
//! - `x-lab-role`: a role name (case-insensitive) whose preset privileges are checked
//!
//! The configured key is passed in by the caller; nothing here reads the environment.

use hemogram_core::{Privilege, Role};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_HEADER: &str = "x-lab-user";
pub const ROLE_HEADER: &str = "x-lab-role";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing x-api-key header")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("missing x-lab-user header")]
    MissingUser,
    #[error("invalid x-lab-role header: {0}")]
    InvalidRole(String),
    #[error("role {role} lacks the required privilege")]
    Forbidden { role: Role },
}

/// The authenticated caller of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user: String,
    pub role: Role,
}

impl Caller {
    /// Fails with `Forbidden` unless the caller's role grants every bit of `required`.
    pub fn require(&self, required: Privilege) -> Result<(), AuthError> {
        if self.role.can(required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden { role: self.role })
        }
    }
}

/// Validates the header values of one request against the configured key.
///
/// A missing role header means [`Role::Basic`].
pub fn authenticate(
    expected_key: &str,
    api_key: Option<&str>,
    user: Option<&str>,
    role: Option<&str>,
) -> Result<Caller, AuthError> {
    let provided = api_key.ok_or(AuthError::MissingApiKey)?;
    if expected_key.is_empty() || provided != expected_key {
        return Err(AuthError::InvalidApiKey);
    }

    let user = user
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(AuthError::MissingUser)?;

    let role = match role.map(str::trim).filter(|r| !r.is_empty()) {
        Some(name) => name
            .parse::<Role>()
            .map_err(|_| AuthError::InvalidRole(name.to_string()))?,
        None => Role::default(),
    };

    Ok(Caller {
        user: user.to_string(),
        role,
    })
}
