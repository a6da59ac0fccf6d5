//! Peer identity and authentication context.

use serde::{Deserialize, Serialize};

/// RAO per TAO (10^9).
pub const RAO_PER_TAO: u64 = 1_000_000_000;

/// Which side of the subnet a signer is acting as.
///
/// Prefix selection and rate limits are pure functions over this tag; there
/// is no role-specific dispatch anywhere else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Miner,
    Validator,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Miner => write!(f, "miner"),
            Role::Validator => write!(f, "validator"),
        }
    }
}

/// On-chain registration facts for a hotkey, as seen in the current
/// metagraph snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    /// UID on the subnet.
    pub uid: u16,
    /// Whether the hotkey holds a validator permit.
    pub validator: bool,
    /// Stake in RAO.
    pub stake_rao: u64,
}

impl RegistrationInfo {
    /// Stake expressed in TAO.
    pub fn stake_tao(&self) -> f64 {
        self.stake_rao as f64 / RAO_PER_TAO as f64
    }
}

/// The product of a successful authentication pipeline run.
///
/// Handlers receive this and nothing else; every scoped credential and
/// assignment view is derived from these fields.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub role: Role,
    /// SS58 hotkey that signed the commitment.
    pub hotkey: String,
    /// SS58 coldkey, only present for miner data-access requests.
    pub coldkey: Option<String>,
    pub registration: RegistrationInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stake_tao_conversion() {
        let info = RegistrationInfo {
            uid: 0,
            validator: true,
            stake_rao: 1_500_000_000,
        };
        assert!((info.stake_tao() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Miner.to_string(), "miner");
        assert_eq!(Role::Validator.to_string(), "validator");
    }
}
