//! Capability flags and lab roles.

use crate::LabError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

/// Bit set of capabilities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Privilege(u8);

impl Privilege {
    pub const NONE: Privilege = Privilege(0);
    pub const VIEW: Privilege = Privilege(1);
    pub const CREATE: Privilege = Privilege(2);
    pub const UPDATE: Privilege = Privilege(4);
    pub const DELETE: Privilege = Privilege(8);
    pub const MODERATE: Privilege = Privilege(16);
    pub const OVERWRITE: Privilege = Privilege(32);
    pub const ADMIN: Privilege = Privilege(64);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True iff every bit of `required` is set.
    pub const fn has(self, required: Privilege) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitOr for Privilege {
    type Output = Privilege;

    fn bitor(self, rhs: Self) -> Self::Output {
        Privilege(self.0 | rhs.0)
    }
}

impl BitAnd for Privilege {
    type Output = Privilege;

    fn bitand(self, rhs: Self) -> Self::Output {
        Privilege(self.0 & rhs.0)
    }
}

/// Staff roles with their preset capabilities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Basic,
    Assistant,
    Technologist,
    Lead,
    Pathologist,
    Admin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Basic,
        Role::Assistant,
        Role::Technologist,
        Role::Lead,
        Role::Pathologist,
        Role::Admin,
    ];

    pub fn privileges(self) -> Privilege {
        match self {
            Role::Basic => Privilege::VIEW,
            Role::Assistant => Privilege::VIEW | Privilege::CREATE,
            Role::Technologist | Role::Pathologist => Privilege::VIEW | Privilege::UPDATE,
            Role::Lead => {
                Privilege::VIEW
                    | Privilege::CREATE
                    | Privilege::UPDATE
                    | Privilege::DELETE
                    | Privilege::MODERATE
                    | Privilege::OVERWRITE
            }
            Role::Admin => {
                Privilege::VIEW
                    | Privilege::CREATE
                    | Privilege::UPDATE
                    | Privilege::DELETE
                    | Privilege::MODERATE
                    | Privilege::ADMIN
            }
        }
    }

    pub fn can(self, required: Privilege) -> bool {
        self.privileges().has(required)
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Basic => "basic",
            Role::Assistant => "assistant",
            Role::Technologist => "technologist",
            Role::Lead => "lead",
            Role::Pathologist => "pathologist",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.name() == wanted)
            .ok_or_else(|| LabError::InvalidInput(format!("unknown role '{}'", s.trim())))
    }
}
