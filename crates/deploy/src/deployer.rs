//! Submission of contract-creation transactions.
//!
//! The orchestrator only depends on the [`ContractDeployer`] capability (submit, confirm,
//! return the address), so transports can be swapped without touching orchestration.

use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256, keccak256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Artifact, DeployError,
    rpc::{self, RpcError, deserialize_opt_u64_from_hex},
};

/// Default time to wait for a transaction to be confirmed.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The account that authorizes and pays for deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignerIdentity {
    pub address: Address,
}

impl SignerIdentity {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

/// A confirmed contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    /// Address of the created contract.
    pub address: Address,
    /// Hash of the creation transaction.
    pub transaction: B256,
}

/// Capability to deploy a single artifact.
///
/// Implementations submit one state-changing transaction per call. Calls are not
/// idempotent and must not be retried after an ambiguous failure.
pub trait ContractDeployer: Send + Sync {
    /// Deploy `artifact` with already resolved constructor arguments and wait for
    /// confirmation.
    fn deploy(
        &self,
        artifact: &Artifact,
        args: &[String],
        signer: &SignerIdentity,
    ) -> impl Future<Output = Result<Deployment, DeployError>> + Send;
}

/// Transaction receipt fields needed to confirm a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    status: Option<u64>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    block_number: Option<u64>,
}

/// Reasons a receipt poll did not yield a confirmed receipt yet.
#[derive(Debug, thiserror::Error)]
enum PollError {
    #[error("transaction not yet included")]
    Pending,
    #[error("{have} of {want} confirmations")]
    Confirming { have: u64, want: u64 },
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// How creation transactions are authorized.
#[derive(Clone)]
enum Authorization {
    /// The node signs with an account it manages (`eth_sendTransaction`).
    NodeAccount,
    /// Signed here and broadcast with `eth_sendRawTransaction`.
    LocalKey(PrivateKeySigner),
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeAccount => f.write_str("NodeAccount"),
            Self::LocalKey(key) => f.debug_tuple("LocalKey").field(&key.address()).finish(),
        }
    }
}

/// Deploys through a JSON-RPC endpoint.
///
/// By default the creation transaction is sent with `eth_sendTransaction` from a
/// node-managed account. With a private key configured, the transaction is signed
/// locally and sent with `eth_sendRawTransaction`. Either way `eth_getTransactionReceipt`
/// is then polled until the configured number of confirmations is reached or the
/// confirmation timeout elapses.
#[derive(Debug, Clone)]
pub struct RpcDeployer {
    client: reqwest::Client,
    rpc_url: String,
    authorization: Authorization,
    confirmations: u64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    gas_limit: Option<u64>,
}

impl RpcDeployer {
    /// Create a deployer for `rpc_url` with default confirmation settings.
    pub fn new(rpc_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_REQUEST_TIMEOUT)?,
            rpc_url: rpc_url.into(),
            authorization: Authorization::NodeAccount,
            confirmations: 1,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            gas_limit: None,
        })
    }

    /// Timeout of a single RPC request.
    pub fn request_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        self.client = rpc::create_client(timeout)?;
        Ok(self)
    }

    /// Sign creation transactions locally with a hex-encoded secp256k1 key.
    pub fn private_key(mut self, key: &str) -> anyhow::Result<Self> {
        let key: PrivateKeySigner = key
            .trim()
            .parse()
            .context("Failed to parse the private key")?;
        self.authorization = Authorization::LocalKey(key);
        Ok(self)
    }

    /// Number of blocks (including the inclusion block) to wait for.
    pub fn confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    /// Upper bound on a single confirmation wait.
    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Fixed gas limit for creation transactions. The node estimates gas when unset.
    pub fn gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, RpcError> {
        rpc::json_rpc_call(&self.client, &self.rpc_url, method, params).await
    }

    /// Chain ID reported by the endpoint.
    pub async fn chain_id(&self) -> Result<u64, DeployError> {
        let chain_id: String = self.call("eth_chainId", vec![]).await.map_err(unavailable)?;
        quantity("eth_chainId", &chain_id)
    }

    /// The local key's address, or else the first account managed by the node.
    pub async fn default_signer(&self) -> Result<SignerIdentity, DeployError> {
        if let Authorization::LocalKey(key) = &self.authorization {
            return Ok(SignerIdentity::new(key.address()));
        }

        let accounts: Vec<Address> = self.call("eth_accounts", vec![]).await.map_err(unavailable)?;

        accounts
            .first()
            .copied()
            .map(SignerIdentity::new)
            .ok_or_else(|| {
                DeployError::NetworkUnavailable(format!(
                    "{} manages no accounts; configure a signer address or a private key",
                    self.rpc_url
                ))
            })
    }

    /// Broadcast the creation transaction and return its hash.
    async fn submit(&self, code: &Bytes, signer: &SignerIdentity) -> Result<B256, DeployError> {
        match &self.authorization {
            Authorization::NodeAccount => self.send_from_node_account(code, signer).await,
            Authorization::LocalKey(key) => self.send_signed(key, code, signer).await,
        }
    }

    async fn send_from_node_account(
        &self,
        code: &Bytes,
        signer: &SignerIdentity,
    ) -> Result<B256, DeployError> {
        let mut tx = serde_json::json!({
            "from": signer.address,
            "data": code,
        });
        if let Some(gas) = self.gas_limit {
            tx["gas"] = serde_json::json!(format!("{gas:#x}"));
        }

        self.call("eth_sendTransaction", vec![tx])
            .await
            .map_err(|e| submission_error(e, None))
    }

    /// Sign a legacy (EIP-155) creation transaction and broadcast it.
    ///
    /// The hash is computed before broadcasting, so an unanswered broadcast still
    /// reports which transaction to look for.
    async fn send_signed(
        &self,
        key: &PrivateKeySigner,
        code: &Bytes,
        signer: &SignerIdentity,
    ) -> Result<B256, DeployError> {
        if key.address() != signer.address {
            return Err(DeployError::TransactionRejected(format!(
                "no private key configured for signer {}",
                signer.address
            )));
        }

        let chain_id = self.chain_id().await?;
        let from = serde_json::json!(signer.address);

        let nonce: String = self
            .call("eth_getTransactionCount", vec![from.clone(), serde_json::json!("pending")])
            .await
            .map_err(preparation_error)?;
        let gas_price: String = self
            .call("eth_gasPrice", vec![])
            .await
            .map_err(preparation_error)?;
        let gas_limit = match self.gas_limit {
            Some(gas) => gas,
            None => {
                let estimate: String = self
                    .call(
                        "eth_estimateGas",
                        vec![serde_json::json!({ "from": from, "data": code })],
                    )
                    .await
                    .map_err(preparation_error)?;
                quantity("eth_estimateGas", &estimate)?
            }
        };

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce: quantity("eth_getTransactionCount", &nonce)?,
            gas_price: u128::from(quantity("eth_gasPrice", &gas_price)?),
            gas_limit,
            to: TxKind::Create,
            value: U256::ZERO,
            input: code.clone(),
        };

        let nonce = tx.nonce;
        let signature = key
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| DeployError::TransactionRejected(format!("failed to sign: {e}")))?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let hash = *envelope.tx_hash();
        let raw = Bytes::from(envelope.encoded_2718());

        tracing::debug!(tx = %hash, nonce, gas_limit, "Signed creation transaction");

        let _: B256 = self
            .call("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await
            .map_err(|e| submission_error(e, Some(hash)))?;

        Ok(hash)
    }

    /// Fetch the receipt and check it has enough confirmations.
    async fn fetch_receipt(&self, tx: B256) -> Result<TransactionReceipt, PollError> {
        let receipt: Option<TransactionReceipt> = self
            .call("eth_getTransactionReceipt", vec![serde_json::json!(tx)])
            .await?;

        let receipt = receipt.ok_or(PollError::Pending)?;
        let included_at = receipt.block_number.ok_or(PollError::Pending)?;

        if self.confirmations > 1 {
            let head: String = self.call("eth_blockNumber", vec![]).await?;
            let head = rpc::parse_quantity(&head).map_err(|e| RpcError::Decode {
                method: "eth_blockNumber".to_string(),
                reason: e.to_string(),
            })?;

            let have = head.saturating_sub(included_at) + 1;
            if have < self.confirmations {
                return Err(PollError::Confirming {
                    have,
                    want: self.confirmations,
                });
            }
        }

        Ok(receipt)
    }

    /// Poll until the transaction is confirmed, bounded by the confirmation timeout.
    ///
    /// Receipt reads are idempotent, so transient RPC failures are retried until the
    /// bound. The transaction itself is never resubmitted.
    async fn wait_for_receipt(&self, tx: B256) -> Result<TransactionReceipt, DeployError> {
        let max_polls = (self.confirmation_timeout.as_millis()
            / self.poll_interval.as_millis().max(1)) as usize
            + 1;
        let backoff = ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .with_max_times(max_polls);

        let poll = (|| self.fetch_receipt(tx))
            .retry(backoff)
            .notify(|err: &PollError, _| {
                tracing::trace!(tx = %tx, reason = %err, "Waiting for confirmation...");
            });

        let timed_out = DeployError::TransactionTimeout {
            tx,
            timeout: self.confirmation_timeout,
        };

        match tokio::time::timeout(self.confirmation_timeout, poll).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(err)) => {
                tracing::debug!(tx = %tx, reason = %err, "Confirmation polling exhausted");
                Err(timed_out)
            }
            Err(_) => Err(timed_out),
        }
    }
}

impl ContractDeployer for RpcDeployer {
    async fn deploy(
        &self,
        artifact: &Artifact,
        args: &[String],
        signer: &SignerIdentity,
    ) -> Result<Deployment, DeployError> {
        let code = artifact.creation_code(args)?;

        let tx = self.submit(&code, signer).await?;
        tracing::info!(
            artifact = %artifact.name,
            tx = %tx,
            from = %signer.address,
            "Creation transaction sent"
        );

        let receipt = self.wait_for_receipt(tx).await?;

        if receipt.status == Some(0) {
            return Err(DeployError::TransactionReverted(tx));
        }

        let address = receipt
            .contract_address
            .ok_or(DeployError::TransactionReverted(tx))?;

        Ok(Deployment {
            address,
            transaction: tx,
        })
    }
}

/// Map an RPC failure outside of submission to an unavailable network.
fn unavailable(err: RpcError) -> DeployError {
    DeployError::NetworkUnavailable(err.to_string())
}

/// Map a failed read made while preparing a transaction. Nothing has been broadcast.
fn preparation_error(err: RpcError) -> DeployError {
    match err {
        RpcError::Node { .. } => DeployError::TransactionRejected(err.to_string()),
        err => unavailable(err),
    }
}

/// Classify a failed broadcast.
///
/// Only a request that never connected is known not to have reached the node. Anything
/// else (a timeout, a dropped connection, an unreadable answer) leaves the outcome open.
fn submission_error(err: RpcError, tx: Option<B256>) -> DeployError {
    match err {
        RpcError::Node { message, .. } => DeployError::TransactionRejected(message),
        err if err.is_connect() => unavailable(err),
        err => {
            tracing::warn!(
                error = %err,
                "No answer to the submission; the node may still have accepted the transaction"
            );
            DeployError::SubmissionUnknown {
                tx,
                reason: err.to_string(),
            }
        }
    }
}

/// Parse a hex quantity returned by `method`.
fn quantity(method: &str, value: &str) -> Result<u64, DeployError> {
    rpc::parse_quantity(value).map_err(|e| {
        DeployError::NetworkUnavailable(format!("unexpected {method} value `{value}`: {e}"))
    })
}

/// Deployer that never touches the network.
///
/// Creation code is still built, so constructor argument errors surface. Addresses are
/// derived from the signer and a local nonce exactly like `CREATE` would.
#[derive(Debug, Default)]
pub struct DryRunDeployer {
    nonce: AtomicU64,
}

impl DryRunDeployer {
    /// Start deriving addresses from `nonce`.
    pub fn new(nonce: u64) -> Self {
        Self {
            nonce: AtomicU64::new(nonce),
        }
    }
}

impl ContractDeployer for DryRunDeployer {
    async fn deploy(
        &self,
        artifact: &Artifact,
        args: &[String],
        signer: &SignerIdentity,
    ) -> Result<Deployment, DeployError> {
        let code = artifact.creation_code(args)?;
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);

        let mut preimage = code.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());

        let deployment = Deployment {
            address: signer.address.create(nonce),
            transaction: keccak256(&preimage),
        };

        tracing::debug!(
            artifact = %artifact.name,
            nonce,
            address = %deployment.address,
            "Dry-run deployment"
        );

        Ok(deployment)
    }
}
