pub use generated_abi::tapgem_types;

pub mod amount;
pub mod config;
pub mod contract;
pub mod errors;
pub mod gate;
pub mod keystore_provider;
pub mod notifications;
pub mod presentation;
pub mod provider;
pub mod session;
pub mod storage;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
