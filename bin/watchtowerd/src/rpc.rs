//! A thin bitcoind JSON-RPC client serving as the tower's chain source and broadcaster.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bitcoin::{block::Header, consensus, BlockHash, Transaction, Txid};
use chain_monitor::{ChainSource, ChainSourceError};
use jsonrpsee::{
    core::{client::ClientT, ClientError},
    http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::Deserialize;
use tracing::trace;
use watchtower_primitives::types::BitcoinBlockHeight;

use crate::{config::BtcClientConfig, responder::Broadcaster};

/// `RPC_INVALID_PARAMETER`, returned by `getblockhash` past the tip.
const RPC_INVALID_PARAMETER: i32 = -8;

/// `RPC_INVALID_ADDRESS_OR_KEY`, returned for unknown block hashes.
const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;

/// The subset of `getblock` (verbosity 1) the tower needs.
#[derive(Debug, Deserialize)]
struct VerboseBlock {
    tx: Vec<Txid>,
}

/// Talks to bitcoind over HTTP with basic auth.
#[derive(Debug, Clone)]
pub(crate) struct BitcoindRpc {
    client: HttpClient,
}

impl BitcoindRpc {
    /// Builds a client for the node described by `config`.
    pub(crate) fn new(config: &BtcClientConfig) -> Result<Self, ClientError> {
        let credentials = STANDARD.encode(format!("{}:{}", config.user, config.pass));

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| ClientError::Custom(format!("invalid rpc credentials: {e}")))?;
        headers.insert("Authorization", auth);

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .build(&config.url)?;

        Ok(Self { client })
    }

    async fn call<R>(
        &self,
        method: &str,
        params: jsonrpsee::core::params::ArrayParams,
    ) -> Result<R, ClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        trace!(%method, "calling bitcoind");

        self.client.request(method, params).await
    }
}

fn rpc_error_code(err: &ClientError) -> Option<i32> {
    match err {
        ClientError::Call(obj) => Some(obj.code()),
        _ => None,
    }
}

#[async_trait]
impl ChainSource for BitcoindRpc {
    async fn current_height(&self) -> Result<BitcoinBlockHeight, ChainSourceError> {
        self.call("getblockcount", rpc_params![])
            .await
            .map_err(ChainSourceError::unavailable)
    }

    async fn block_hash(&self, height: BitcoinBlockHeight) -> Result<BlockHash, ChainSourceError> {
        self.call("getblockhash", rpc_params![height])
            .await
            .map_err(|err| match rpc_error_code(&err) {
                Some(RPC_INVALID_PARAMETER) => ChainSourceError::UnknownHeight(height),
                _ => ChainSourceError::unavailable(err),
            })
    }

    async fn block_header(&self, hash: &BlockHash) -> Result<Header, ChainSourceError> {
        let raw: String = self
            .call("getblockheader", rpc_params![hash.to_string(), false])
            .await
            .map_err(|err| match rpc_error_code(&err) {
                Some(RPC_INVALID_ADDRESS_OR_KEY) => ChainSourceError::UnknownBlock(*hash),
                _ => ChainSourceError::unavailable(err),
            })?;

        consensus::encode::deserialize_hex(&raw).map_err(ChainSourceError::unavailable)
    }

    async fn confirmed_txids(&self, hash: &BlockHash) -> Result<Vec<Txid>, ChainSourceError> {
        let block: VerboseBlock = self
            .call("getblock", rpc_params![hash.to_string(), 1])
            .await
            .map_err(|err| match rpc_error_code(&err) {
                Some(RPC_INVALID_ADDRESS_OR_KEY) => ChainSourceError::UnknownBlock(*hash),
                _ => ChainSourceError::unavailable(err),
            })?;

        Ok(block.tx)
    }
}

#[async_trait]
impl Broadcaster for BitcoindRpc {
    async fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, ChainSourceError> {
        let raw = consensus::encode::serialize_hex(tx);

        self.call("sendrawtransaction", rpc_params![raw])
            .await
            .map_err(ChainSourceError::unavailable)
    }
}
