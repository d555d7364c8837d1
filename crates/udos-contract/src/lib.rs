//! The admin-secret contract.
//!
//! Three persisted artifacts must agree: the env file (`WIZARD_KEY`,
//! `WIZARD_ADMIN_TOKEN`), the server config (`admin_api_key_id`), and the
//! encrypted secret store (an entry at that id whose decrypted value equals
//! the env token). This crate detects drift between them and repairs it.

mod contract;
mod store;

pub use contract::{
    ContractManager, ContractStatus, DriftKind, RepairAction, RepairOutcome,
};
pub use store::{SecretStore, StoreError, TombStore, random_bytes};
