//! HTTP RPC implementation of the chain gateway.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use serde_json::Value;

use super::gateway::{
    ChainError, ChainGateway, FetchedLog, NodeInfo, RawHeader, TransactionRecord,
};

/// Chain gateway backed by an HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcGateway {
    provider: RootProvider<Http<Client>>,
}

impl RpcGateway {
    /// Connect to an HTTP RPC endpoint.
    pub fn new(rpc_url: &str) -> Result<Self, ChainError> {
        let url = rpc_url
            .parse()
            .map_err(|_| ChainError::MalformedResponse(format!("invalid RPC URL: {}", rpc_url)))?;
        let provider = ProviderBuilder::new().on_http(url);
        Ok(Self { provider })
    }

    /// Fetch a block by number as raw JSON; headers keep the node's own
    /// encoding so reorgs replace the full raw payload.
    async fn block_json(&self, block_number: i64) -> Result<Value, ChainError> {
        let tag = format!("0x{:x}", block_number);
        let block: Value = self
            .provider
            .client()
            .request("eth_getBlockByNumber", (tag, false))
            .await?;
        if block.is_null() {
            return Err(ChainError::HeaderNotFound { block_number });
        }
        Ok(block)
    }
}

fn json_b256(value: &Value, field: &str) -> Result<B256, ChainError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ChainError::MalformedResponse(format!("missing or invalid '{}'", field)))
}

fn json_quantity(value: &Value, field: &str) -> Result<u128, ChainError> {
    let text = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::MalformedResponse(format!("missing '{}'", field)))?;
    u128::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|_| ChainError::MalformedResponse(format!("invalid quantity '{}'", field)))
}

fn json_address(value: &Value, field: &str) -> Result<Address, ChainError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ChainError::MalformedResponse(format!("missing or invalid '{}'", field)))
}

fn json_bytes(value: &Value, field: &str) -> Result<Vec<u8>, ChainError> {
    let text = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::MalformedResponse(format!("missing '{}'", field)))?;
    hex::decode(text.trim_start_matches("0x")).map_err(|_| {
        ChainError::MalformedResponse(format!("invalid hex in '{}'", field))
    })
}

fn fetched_log_from_rpc(log: &Log) -> Result<FetchedLog, ChainError> {
    let raw = serde_json::to_vec(log)
        .map_err(|e| ChainError::MalformedResponse(format!("unserializable log: {}", e)))?;
    Ok(FetchedLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.to_vec(),
        tx_hash: log.transaction_hash,
        tx_index: log.transaction_index.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        raw,
    })
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn node_info(&self) -> Result<NodeInfo, ChainError> {
        let network_id = self.provider.get_chain_id().await?;
        let client_version: String = self
            .provider
            .client()
            .request("web3_clientVersion", ())
            .await?;
        let genesis = self.block_json(0).await?;
        let genesis_hash = json_b256(&genesis, "hash")?;

        // Stable across reconnects to the same dataset: network, genesis,
        // and client family together identify the node.
        let client_family = client_version
            .split('/')
            .next()
            .unwrap_or("unknown")
            .to_string();
        let fingerprint = format!("{}-{}-{}", network_id, genesis_hash, client_family);

        Ok(NodeInfo {
            fingerprint,
            network_id,
            genesis_hash,
            client_version,
        })
    }

    async fn head_block_number(&self) -> Result<i64, ChainError> {
        let head = self.provider.get_block_number().await?;
        Ok(head as i64)
    }

    async fn header_by_number(&self, block_number: i64) -> Result<RawHeader, ChainError> {
        let block = self.block_json(block_number).await?;
        let hash = json_b256(&block, "hash")?;
        let timestamp = json_quantity(&block, "timestamp")? as i64;
        let raw = serde_json::to_vec(&block)
            .map_err(|e| ChainError::MalformedResponse(format!("unserializable block: {}", e)))?;
        Ok(RawHeader {
            block_number,
            hash,
            timestamp,
            raw,
        })
    }

    async fn logs(
        &self,
        addresses: &[Address],
        topics: &[B256],
        block_hash: B256,
    ) -> Result<Vec<FetchedLog>, ChainError> {
        let filter = Filter::new()
            .address(addresses.to_vec())
            .event_signature(topics.to_vec())
            .at_block_hash(block_hash);

        let logs = self.provider.get_logs(&filter).await?;
        logs.iter().map(fetched_log_from_rpc).collect()
    }

    async fn transactions(
        &self,
        tx_hashes: &[B256],
    ) -> Result<Vec<TransactionRecord>, ChainError> {
        let mut transactions = Vec::with_capacity(tx_hashes.len());
        for hash in tx_hashes {
            let tx: Value = self
                .provider
                .client()
                .request("eth_getTransactionByHash", (*hash,))
                .await?;
            if tx.is_null() {
                return Err(ChainError::TransactionNotFound { hash: *hash });
            }
            let raw = serde_json::to_vec(&tx).map_err(|e| {
                ChainError::MalformedResponse(format!("unserializable transaction: {}", e))
            })?;
            let tx_to = match tx.get("to") {
                Some(Value::Null) | None => None,
                Some(_) => Some(json_address(&tx, "to")?),
            };
            transactions.push(TransactionRecord {
                hash: json_b256(&tx, "hash")?,
                gas_limit: json_quantity(&tx, "gas")? as u64,
                gas_price: json_quantity(&tx, "gasPrice").unwrap_or_default(),
                input_data: json_bytes(&tx, "input")?,
                nonce: json_quantity(&tx, "nonce")? as u64,
                raw,
                tx_from: json_address(&tx, "from")?,
                tx_index: json_quantity(&tx, "transactionIndex")? as u64,
                tx_to,
                value: U256::from(json_quantity(&tx, "value")?),
            });
        }
        Ok(transactions)
    }
}
