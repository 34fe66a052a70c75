//! ApprovalScope Monitor
//!
//! Follows new blocks over a node IPC socket, feeds approval-shaped
//! transactions into the detection agent, and publishes findings to Redis.

use std::sync::Arc;

use alloy::eips::BlockNumberOrTag;
use alloy::providers::Provider;
use alloy::rpc::types::{BlockTransactions, BlockTransactionsKind};
use tracing::{error, info, warn};

use approvalscope_monitor::agent::PhishingAgent;
use approvalscope_monitor::config::{exchange_addresses, load_labels, MonitorConfig};
use approvalscope_monitor::decoder::DecodedTransaction;
use approvalscope_monitor::ipc::{
    find_ipc_socket, socket_exists, validate_ipc_path, IpcConfig, NodeConnection,
};
use approvalscope_monitor::publisher::Publisher;
use approvalscope_monitor::registry::AddressRegistry;
use approvalscope_monitor::resolver::RpcTokenReader;
use approvalscope_monitor::store::AllowanceStore;

/// Environment variable pointing at the monitor config JSON
const CONFIG_ENV: &str = "APPROVALSCOPE_CONFIG";

/// Environment variable pointing at the address-labels JSON
const LABELS_ENV: &str = "APPROVALSCOPE_LABELS";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => match MonitorConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load config from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        Err(_) => MonitorConfig::default(),
    };

    let exchange_seeds = match std::env::var(LABELS_ENV) {
        Ok(path) => match load_labels(&path) {
            Ok(labels) => exchange_addresses(&labels),
            Err(e) => {
                error!("failed to load address labels from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        Err(_) => Vec::new(),
    };
    info!(exchanges = exchange_seeds.len(), "seeded exchange labels");

    let redis_client = match redis::Client::open(config.redis_url.as_str()) {
        Ok(client) => client,
        Err(e) => {
            error!("invalid Redis URL {}: {}", config.redis_url, e);
            std::process::exit(1);
        }
    };
    let redis_connection = match redis_client.get_multiplexed_async_connection().await {
        Ok(connection) => connection,
        Err(e) => {
            error!("failed to connect to Redis at {}: {}", config.redis_url, e);
            std::process::exit(1);
        }
    };
    let mut publisher = Publisher::new(redis_connection, config.alert_channel.clone());

    if let Err(e) = validate_ipc_path(&config.ipc_path) {
        error!("invalid IPC path {}: {}", config.ipc_path, e);
        std::process::exit(1);
    }

    let socket_path = if socket_exists(&config.ipc_path) {
        config.ipc_path.clone()
    } else if let Some(discovered) = find_ipc_socket() {
        warn!(
            "configured socket {} not found, using {}",
            config.ipc_path, discovered
        );
        discovered
    } else {
        config.ipc_path.clone()
    };

    let mut connection = NodeConnection::new(IpcConfig::with_path(socket_path));
    let mut provider = match connection.connect().await {
        Ok(provider) => provider,
        Err(e) => {
            error!("failed to connect to node: {}", e);
            std::process::exit(1);
        }
    };

    let reader = Arc::new(RpcTokenReader::new(provider.clone()));
    let store = AllowanceStore::new(reader.clone());
    let registry = AddressRegistry::new(reader, exchange_seeds);
    let mut agent = PhishingAgent::new(config, store, registry);

    info!(channel = publisher.channel(), "monitoring for approval phishing");

    loop {
        let mut blocks = match provider.subscribe_blocks().await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("block subscription failed: {}", e);
                match connection.reconnect().await {
                    Ok(reconnected) => {
                        provider = reconnected;
                        continue;
                    }
                    Err(e) => {
                        error!("node connection lost for good: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        };

        loop {
            let block = match blocks.recv().await {
                Ok(block) => block,
                Err(e) => {
                    warn!("block stream ended: {}", e);
                    break;
                }
            };

            let block_number = block.inner.number;
            let timestamp = block.inner.timestamp;

            let full = match provider
                .get_block_by_number(BlockNumberOrTag::Number(block_number), BlockTransactionsKind::Full)
                .await
            {
                Ok(Some(full)) => full,
                Ok(None) => {
                    warn!(block = block_number, "block body not available");
                    continue;
                }
                Err(e) => {
                    warn!(block = block_number, error = %e, "failed to fetch block body");
                    continue;
                }
            };

            if let BlockTransactions::Full(transactions) = &full.transactions {
                for tx in transactions {
                    let decoded = DecodedTransaction::from_rpc(tx);
                    agent.handle_transaction(&decoded, timestamp, block_number).await;
                }
            }

            for finding in agent.handle_block(timestamp).await {
                match publisher.publish(&finding).await {
                    Ok(subscribers) => {
                        info!(alert = %finding.alert_id, subscribers, "published finding")
                    }
                    Err(e) => error!(error = %e, "failed to publish finding"),
                }
            }
        }

        // stream dropped; try to re-establish the node connection
        match connection.reconnect().await {
            Ok(reconnected) => provider = reconnected,
            Err(e) => {
                error!("node connection lost for good: {}", e);
                std::process::exit(1);
            }
        }
    }
}
