//! Campaign HTTP API
//!
//! The campaign tracks which tasks an account has completed and holds the
//! rewards to claim. It is reached over HTTP through the account's proxy;
//! claims carry an EIP-712 signature proving ownership of the account.

pub mod attestation;
pub mod client;
pub mod types;

pub use attestation::ClaimAttestation;
pub use client::{CampaignApi, CampaignError, HttpCampaignClient};
pub use types::{AccountStats, EnrollResponse, TaskCatalog, TaskProgress, TaskStatusResponse};
