//! Capability masks and the fixed action vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Edge name granting read.
pub const CAN_READ: &str = "can_read";
/// Edge name granting read and write.
pub const CAN_WRITE: &str = "can_write";
/// Edge name granting read, write and manage.
pub const CAN_MANAGE: &str = "can_manage";

/// Three independent capability flags.
///
/// Manage implies write implies read by convention: masks built through
/// [`CapabilityMask::from_level`] or [`CapabilityMask::from_grant_name`]
/// always satisfy it, but the type does not enforce it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityMask {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub manage: bool,
}

/// Level -> mask lookup table.
const MASKS_FOR_LEVEL: [CapabilityMask; 4] = [
    CapabilityMask::NONE,
    CapabilityMask::new(true, false, false),
    CapabilityMask::new(true, true, false),
    CapabilityMask::FULL,
];

impl CapabilityMask {
    /// No capability.
    pub const NONE: Self = Self::new(false, false, false);
    /// Read, write and manage.
    pub const FULL: Self = Self::new(true, true, true);

    pub const fn new(read: bool, write: bool, manage: bool) -> Self {
        Self {
            read,
            write,
            manage,
        }
    }

    /// Builds a mask from the ordinal encoding (0 none .. 3 manage).
    /// Levels above 3 clamp to the full mask.
    pub fn from_level(level: u8) -> Self {
        MASKS_FOR_LEVEL[usize::from(level.min(3))]
    }

    /// Returns the highest ordinal level fully contained in this mask.
    pub fn level(&self) -> u8 {
        match (self.read, self.write, self.manage) {
            (true, true, true) => 3,
            (true, true, false) => 2,
            (true, false, _) => 1,
            _ => 0,
        }
    }

    /// Maps an edge name to the mask it grants. Names outside the
    /// capability vocabulary (e.g. `can_login`) grant nothing.
    pub fn from_grant_name(name: &str) -> Self {
        match name {
            CAN_READ => Self::from_level(1),
            CAN_WRITE => Self::from_level(2),
            CAN_MANAGE => Self::from_level(3),
            _ => Self::NONE,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.manage)
    }

    /// Capabilities present in both masks.
    pub fn intersect(&self, other: &Self) -> Self {
        Self::new(
            self.read && other.read,
            self.write && other.write,
            self.manage && other.manage,
        )
    }

    /// Capabilities present in either mask.
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.read || other.read,
            self.write || other.write,
            self.manage || other.manage,
        )
    }

    /// True if every capability in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.intersect(other) == *self
    }

    /// Whether this mask grants the action. `Action::Other` is never granted.
    pub fn grants(&self, action: &Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::Write => self.write,
            Action::Manage => self.manage,
            Action::Other(_) => false,
        }
    }
}

/// An action a principal may request on a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
    Manage,
    /// Any action name outside the fixed vocabulary.
    Other(String),
}

impl Action {
    /// Edge names that satisfy this action in a live edge lookup, strongest
    /// first. `None` for unsupported actions.
    pub fn sufficient_grants(&self) -> Option<&'static [&'static str]> {
        match self {
            Action::Manage => Some(&[CAN_MANAGE]),
            Action::Write => Some(&[CAN_MANAGE, CAN_WRITE]),
            Action::Read => Some(&[CAN_MANAGE, CAN_WRITE, CAN_READ]),
            Action::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Manage => "manage",
            Action::Other(name) => name,
        }
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Action::from(s))
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "read" => Action::Read,
            "write" => Action::Write,
            "manage" => Action::Manage,
            other => Action::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
