//! Pin identifiers, modes and benchmark roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a single GPIO line by its BCM number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u32);

impl PinId {
    /// Raw line number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PinId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Direction assigned to a pin for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    /// Read-only line.
    Input,
    /// Line driven by this process.
    Output,
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// The five fixed pin roles used by the benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    /// Output of pair A, wired to `InA`.
    OutA,
    /// Input of pair A.
    InA,
    /// Output of pair B, wired to `InB`.
    OutB,
    /// Input of pair B.
    InB,
    /// Output toggled by the write-only benchmark.
    OutC,
}

impl PinRole {
    /// Mode every pin in this role is configured with.
    #[must_use]
    pub const fn mode(self) -> PinMode {
        match self {
            Self::InA | Self::InB => PinMode::Input,
            Self::OutA | Self::OutB | Self::OutC => PinMode::Output,
        }
    }
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutA => write!(f, "A_OUT"),
            Self::InA => write!(f, "A_IN"),
            Self::OutB => write!(f, "B_OUT"),
            Self::InB => write!(f, "B_IN"),
            Self::OutC => write!(f, "C_OUT"),
        }
    }
}

/// Pin assignment for every role.
///
/// Connect `out_a` to `in_a` and `out_b` to `in_b` for the read-write benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinMap {
    /// Output of pair A.
    pub out_a: PinId,
    /// Input of pair A.
    pub in_a: PinId,
    /// Output of pair B.
    pub out_b: PinId,
    /// Input of pair B.
    pub in_b: PinId,
    /// Output used by the write-only benchmark.
    pub out_c: PinId,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            out_a: PinId(17),
            in_a: PinId(18),
            out_b: PinId(23),
            in_b: PinId(24),
            out_c: PinId(22),
        }
    }
}

impl PinMap {
    /// Pin assigned to `role`.
    #[must_use]
    pub const fn pin(&self, role: PinRole) -> PinId {
        match role {
            PinRole::OutA => self.out_a,
            PinRole::InA => self.in_a,
            PinRole::OutB => self.out_b,
            PinRole::InB => self.in_b,
            PinRole::OutC => self.out_c,
        }
    }

    /// Roles used by the read-write ping-pong, in acquisition order.
    pub const READ_WRITE_ROLES: [PinRole; 4] =
        [PinRole::OutA, PinRole::InA, PinRole::OutB, PinRole::InB];

    /// All roles, in acquisition order.
    pub const ALL_ROLES: [PinRole; 5] = [
        PinRole::OutA,
        PinRole::InA,
        PinRole::OutB,
        PinRole::InB,
        PinRole::OutC,
    ];

    /// First pair of roles sharing a pin, if any.
    #[must_use]
    pub fn duplicate(&self) -> Option<(PinRole, PinRole)> {
        let roles = Self::ALL_ROLES;
        for (i, a) in roles.iter().enumerate() {
            for b in &roles[i + 1..] {
                if self.pin(*a) == self.pin(*b) {
                    return Some((*a, *b));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pins() {
        let pins = PinMap::default();
        assert_eq!(pins.pin(PinRole::OutA), PinId(17));
        assert_eq!(pins.pin(PinRole::InB), PinId(24));
        assert_eq!(pins.pin(PinRole::OutC), PinId(22));
        assert!(pins.duplicate().is_none());
    }

    #[test]
    fn test_duplicate_detected() {
        let pins = PinMap {
            out_c: PinId(17),
            ..PinMap::default()
        };
        assert_eq!(pins.duplicate(), Some((PinRole::OutA, PinRole::OutC)));
    }

    #[test]
    fn test_role_modes() {
        assert_eq!(PinRole::InA.mode(), PinMode::Input);
        assert_eq!(PinRole::OutC.mode(), PinMode::Output);
    }
}
