use alloy::{
    primitives::{
        Address,
        Log as PrimitiveLog,
        U256,
    },
    rpc::types::Log,
    sol_types::SolEvent,
};

use crate::tapgem_types::TapGem;

/// Wraps an encoded event the way an RPC receipt would return it.
pub fn receipt_log(contract: Address, event: &impl SolEvent) -> Log {
    Log {
        inner: PrimitiveLog {
            address: contract,
            data: event.encode_log_data(),
        },
        ..Default::default()
    }
}

pub fn tapped_log(contract: Address, user: Address, reward: U256) -> Log {
    let event = TapGem::Tapped {
        user,
        timestamp: U256::from(1_700_000_000u64),
        reward,
    };
    receipt_log(contract, &event)
}

pub fn claimed_log(contract: Address, user: Address, amount: U256) -> Log {
    receipt_log(contract, &TapGem::RewardsClaimed { user, amount })
}
