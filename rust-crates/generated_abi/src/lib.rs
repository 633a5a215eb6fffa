use alloy::{
    primitives::{
        Address,
        Bytes,
    },
    rpc::types::Log,
    sol,
    sol_types::SolConstructor,
};
use serde::Deserialize;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub mod tapgem_types {
    use super::*;

    sol! {
        #[sol(rpc, all_derives)]
        contract TapGem {
            event Tapped(address indexed user, uint256 timestamp, uint256 reward);
            event RewardsClaimed(address indexed user, uint256 amount);

            function tap() external;
            function claimRewards(uint256 amount) external;
            function getUserStats(address user) external view returns (
                uint256 tapsToday,
                uint256 currentStreak,
                uint256 points,
                uint256 unclaimedRewards,
                uint256 totalRewardClaimed
            );
        }
    }
}

pub mod vault_types {
    use super::*;

    sol! {
        #[sol(rpc, all_derives)]
        contract STTTokenVault {
            constructor(address sttToken);
        }
    }
}

pub mod erc20_types {
    use super::*;

    sol! {
        #[sol(rpc, all_derives)]
        interface IERC20 {
            function balanceOf(address owner) external view returns (uint256);
            function transfer(address to, uint256 amount) external returns (bool);
        }
    }
}

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

/// Revert string raised by `tap()` once the daily cap is used up.
pub const REVERT_MAX_TAPS_REACHED: &str = "max taps reached";
/// Revert string raised when the contract cannot pay out a reward.
pub const REVERT_INSUFFICIENT_CONTRACT_BALANCE: &str = "insufficient contract balance";

pub const TAPGEM_ARTIFACT: &str = "artifacts/contracts/TapGem.sol/TapGem.json";
pub const VAULT_ARTIFACT: &str = "artifacts/contracts/STTTokenVault.sol/STTTokenVault.json";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse artifact {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("artifact for {0} has no creation bytecode (abstract contract or interface?)")]
    EmptyBytecode(String),
    #[error("artifact for {name} has malformed bytecode: {source}")]
    Hex {
        name: String,
        source: hex::FromHexError,
    },
}

/// Compiled contract as written by hardhat under `artifacts/`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardhatArtifact {
    pub contract_name: String,
    pub bytecode: String,
}

impl HardhatArtifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ArtifactError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn creation_code(&self) -> Result<Bytes, ArtifactError> {
        let cleaned = self.bytecode.strip_prefix("0x").unwrap_or(&self.bytecode);
        if cleaned.is_empty() {
            return Err(ArtifactError::EmptyBytecode(self.contract_name.clone()));
        }
        let code = hex::decode(cleaned).map_err(|source| ArtifactError::Hex {
            name: self.contract_name.clone(),
            source,
        })?;
        Ok(Bytes::from(code))
    }
}

/// Creation code for the vault with its constructor argument appended.
pub fn vault_deploy_code(creation_code: &Bytes, stt_token: Address) -> Bytes {
    let args = vault_types::STTTokenVault::constructorCall { sttToken: stt_token }
        .abi_encode();
    let mut code = creation_code.to_vec();
    code.extend_from_slice(&args);
    Bytes::from(code)
}

/// Every `Tapped` event found in the receipt logs, in log order.
pub fn tapped_events(logs: &[Log]) -> Vec<tapgem_types::TapGem::Tapped> {
    logs.iter()
        .filter_map(|log| log.log_decode::<tapgem_types::TapGem::Tapped>().ok())
        .map(|decoded| decoded.inner.data)
        .collect()
}
