use generated_abi::{
    REVERT_INSUFFICIENT_CONTRACT_BALANCE,
    REVERT_MAX_TAPS_REACHED,
};
use thiserror::Error;

/// Why the contract refused a write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevertReason {
    MaxTapsReached,
    InsufficientContractBalance,
    Other(String),
}

impl RevertReason {
    fn message(&self) -> String {
        match self {
            RevertReason::MaxTapsReached => {
                "Max taps reached for today. Come back after the UTC reset.".to_owned()
            }
            RevertReason::InsufficientContractBalance => {
                "Contract is out of STT. Please try again later.".to_owned()
            }
            RevertReason::Other(reason) => format!("Transaction reverted: {reason}"),
        }
    }
}

/// Every failure a user action can end in. Each variant renders to the
/// message shown in the notification area.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TapError {
    #[error("No wallet provider found. Unlock a keystore wallet to continue.")]
    ProviderUnavailable,
    #[error("Wallet connection was rejected.")]
    ConnectRejected,
    #[error("Wrong network. Please switch to {expected}.")]
    NetworkMismatch { expected: String },
    #[error("Wallet not connected.")]
    WalletNotConnected,
    #[error("Wallet signer unavailable.")]
    SignerUnavailable,
    #[error("Failed to load stats: {0}")]
    ReadFailed(String),
    #[error("Transaction rejected by user.")]
    UserRejected,
    #[error("Insufficient funds for gas.")]
    InsufficientFunds,
    #[error("{}", .reason.message())]
    ContractReverted { reason: RevertReason },
    #[error("The network did not respond in time. Please try again.")]
    NetworkTimeout,
    #[error("Transaction failed: {0}")]
    Unknown(String),
}

impl TapError {
    /// The daily cap is a normal end of a tapping session.
    pub fn is_stop_condition(&self) -> bool {
        matches!(
            self,
            TapError::ContractReverted {
                reason: RevertReason::MaxTapsReached
            }
        )
    }
}

/// Raw failure reported by the chain or its RPC transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transaction {0} reverted")]
    Reverted(String),
    #[error("{0}")]
    Other(String),
}

impl ChainError {
    fn code(&self) -> Option<i64> {
        match self {
            ChainError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    fn text(&self) -> String {
        match self {
            ChainError::Rpc { message, .. } => message.to_lowercase(),
            ChainError::Transport(message)
            | ChainError::Reverted(message)
            | ChainError::Other(message) => message.to_lowercase(),
        }
    }
}

const USER_REJECTED_CODE: i64 = 4001;
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Maps a failed `tap`/`claimRewards` call onto the user-facing taxonomy.
pub fn classify(err: &ChainError) -> TapError {
    let text = err.text();

    if err.code() == Some(USER_REJECTED_CODE)
        || text.contains("user rejected")
        || text.contains("user denied")
    {
        return TapError::UserRejected;
    }
    if text.contains(REVERT_MAX_TAPS_REACHED) {
        return TapError::ContractReverted {
            reason: RevertReason::MaxTapsReached,
        };
    }
    if text.contains(REVERT_INSUFFICIENT_CONTRACT_BALANCE) {
        return TapError::ContractReverted {
            reason: RevertReason::InsufficientContractBalance,
        };
    }
    if text.contains("insufficient funds") {
        return TapError::InsufficientFunds;
    }
    if err.code() == Some(EXECUTION_REVERTED_CODE)
        || matches!(err, ChainError::Reverted(_))
        || text.contains("execution reverted")
    {
        return TapError::ContractReverted {
            reason: RevertReason::Other(revert_detail(&text)),
        };
    }
    if matches!(err, ChainError::Transport(_))
        || text.contains("timed out")
        || text.contains("timeout")
    {
        return TapError::NetworkTimeout;
    }
    TapError::Unknown(err.to_string())
}

fn revert_detail(text: &str) -> String {
    text.split_once("execution reverted:")
        .map(|(_, detail)| detail.trim().to_owned())
        .filter(|detail| !detail.is_empty())
        .unwrap_or_else(|| text.to_owned())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn rpc(code: i64, message: &str) -> ChainError {
        ChainError::Rpc {
            code,
            message: message.to_owned(),
        }
    }

    #[test]
    fn classify__user_rejection_by_code_or_text() {
        assert_eq!(classify(&rpc(4001, "whatever")), TapError::UserRejected);
        assert_eq!(
            classify(&ChainError::Other("User denied transaction signature".into())),
            TapError::UserRejected
        );
    }

    #[test]
    fn classify__known_revert_reasons() {
        // given
        let max_taps = rpc(3, "execution reverted: max taps reached");
        let drained = rpc(-32000, "execution reverted: Insufficient contract balance");

        // when
        let max_taps = classify(&max_taps);
        let drained = classify(&drained);

        // then
        assert!(max_taps.is_stop_condition());
        assert_eq!(
            drained,
            TapError::ContractReverted {
                reason: RevertReason::InsufficientContractBalance
            }
        );
        assert_eq!(drained.to_string(), "Contract is out of STT. Please try again later.");
    }

    #[test]
    fn classify__other_revert_keeps_detail() {
        let err = classify(&rpc(3, "execution reverted: paused"));

        assert_eq!(
            err,
            TapError::ContractReverted {
                reason: RevertReason::Other("paused".into())
            }
        );
        assert!(!err.is_stop_condition());
    }

    #[test]
    fn classify__insufficient_gas_funds() {
        let err = classify(&rpc(-32000, "insufficient funds for gas * price + value"));

        assert_eq!(err, TapError::InsufficientFunds);
    }

    #[test]
    fn classify__transport_failures_are_network_timeouts() {
        assert_eq!(
            classify(&ChainError::Transport("operation timed out".into())),
            TapError::NetworkTimeout
        );
        assert_eq!(
            classify(&ChainError::Transport(
                "error sending request for url (http://127.0.0.1:8545/): connection refused".into()
            )),
            TapError::NetworkTimeout
        );
        assert_eq!(
            classify(&ChainError::Transport("HTTP error 502 with empty body".into())),
            TapError::NetworkTimeout
        );
    }

    #[test]
    fn classify__transport_still_honours_rejection_and_reverts() {
        assert_eq!(
            classify(&ChainError::Transport("user rejected the request".into())),
            TapError::UserRejected
        );
        assert!(
            classify(&ChainError::Transport("execution reverted: max taps reached".into()))
                .is_stop_condition()
        );
    }

    #[test]
    fn classify__unrecognized_other_is_unknown() {
        assert!(matches!(
            classify(&ChainError::Other("nonce too low".into())),
            TapError::Unknown(_)
        ));
    }

    #[test]
    fn tap_error__messages_are_distinct() {
        let all = [
            TapError::ProviderUnavailable,
            TapError::ConnectRejected,
            TapError::NetworkMismatch {
                expected: "Somnia Testnet".into(),
            },
            TapError::WalletNotConnected,
            TapError::SignerUnavailable,
            TapError::ReadFailed("boom".into()),
            TapError::UserRejected,
            TapError::InsufficientFunds,
            TapError::ContractReverted {
                reason: RevertReason::MaxTapsReached,
            },
            TapError::ContractReverted {
                reason: RevertReason::InsufficientContractBalance,
            },
            TapError::NetworkTimeout,
            TapError::Unknown("boom".into()),
        ];

        let messages: std::collections::HashSet<String> =
            all.iter().map(ToString::to_string).collect();

        assert_eq!(messages.len(), all.len());
    }
}
