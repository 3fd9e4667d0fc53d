//! Transaction Builder Supercomponent
//!
//! Turns a [`TransactionIntent`] into a signed, broadcast-ready EVM
//! transaction.
//!
//! ## Architecture
//!
//! - **errors**: error taxonomy shared by the build steps
//! - **intent**: what to execute, plus caller fee overrides
//! - **fees**: legacy and EIP-1559 fee derivation
//! - **builder**: nonce, fees and gas limit resolution
//! - **signer**: key-backed signing and EIP-2718 encoding
//! - **output**: unsigned and signed transaction values
//!
//! ## Fee rules
//!
//! - Legacy networks use the node's `gasPrice` unless overridden
//! - EIP-1559 networks use `maxFee = ceil(baseFee * multiplier) + priority`,
//!   where priority comes from the node unless overridden
//! - The gas limit is `ceil(estimateGas * multiplier)`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! # use questbot::tx_builder::*;
//! # use questbot::rpc_manager::ChainClient;
//! # async fn example(client: &ChainClient, signer: &dyn Signer) -> Result<(), TransactionBuilderError> {
//! let intent = TransactionIntent::transfer(client.address(), Default::default());
//! let lease = client.lease_nonce().await?;
//! let unsigned = TransactionBuilder::new().build(client, &lease, &intent).await?;
//! let signed = signer.sign_transaction(&unsigned)?;
//! client.broadcast(&signed).await?;
//! lease.commit();
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::TransactionBuilderError;

mod builder;
mod fees;
mod intent;
mod output;
mod signer;

pub use builder::TransactionBuilder;
pub use fees::{FeeEstimator, FeeFields};
pub use intent::{FeeOverrides, GasMultiplier, TransactionIntent};
pub use output::{SignedTransaction, UnsignedTransaction};
pub use signer::{sign_transaction, KeySigner, Signer};
