use core::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{ensure, Error as AnyhowError, Result};
use clap::Parser;
use thiserror::Error;
use types::primitives::{Address, ChainId, H256};
use url::Url;

use crate::chain::{genesis_fork_version, ChainAddresses};

pub const APPLICATION_NAME: &str = env!("CARGO_PKG_NAME");
pub const APPLICATION_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
enum Error {
    #[error("no EL RPC URLs provided")]
    NoRpcUrls,
    #[error("keys index URL missing: pass --keys-api-url or --keys-api-host with --keys-api-port")]
    NoKeysApiUrl,
    #[error("unknown chain id {0}: pass --genesis-fork-version explicitly")]
    UnknownChain(ChainId),
    #[error("genesis fork version must be 4 hex bytes")]
    MalformedForkVersion,
    #[error("unsupported message bus service: {0}")]
    UnsupportedPubsubService(String),
}

#[derive(Parser)]
#[command(name = APPLICATION_NAME, version = APPLICATION_VERSION)]
pub struct GuardianArgs {
    /// Comma-separated EL JSON-RPC endpoints, first one is the primary
    #[arg(long, env = "RPC_URL", value_delimiter = ',')]
    pub rpc_url: Vec<Url>,

    /// Guardian wallet private key, 32 hex bytes
    #[arg(long, env = "WALLET_PRIVATE_KEY", hide_env_values = true)]
    pub wallet_private_key: String,

    /// Full keys index URL; overrides host and port
    #[arg(long, env = "KEYS_API_URL")]
    pub keys_api_url: Option<Url>,

    #[arg(long, env = "KEYS_API_HOST")]
    pub keys_api_host: Option<String>,

    #[arg(long, env = "KEYS_API_PORT")]
    pub keys_api_port: Option<u16>,

    #[arg(long, env = "CHAIN_ID", default_value_t = 1)]
    pub chain_id: ChainId,

    /// Override the fork version deposits are signed over; derived from the
    /// chain id when omitted
    #[arg(long, env = "GENESIS_FORK_VERSION")]
    pub genesis_fork_version: Option<String>,

    #[arg(long, env = "DEPOSIT_CONTRACT_ADDRESS")]
    pub deposit_contract_address: Option<String>,

    #[arg(long, env = "DEPOSIT_SECURITY_MODULE_ADDRESS")]
    pub deposit_security_module_address: Option<String>,

    #[arg(long, env = "STAKING_ROUTER_ADDRESS")]
    pub staking_router_address: Option<String>,

    /// Block the deposit contract was deployed at; event scans start here
    #[arg(long, env = "DEPOSIT_CONTRACT_DEPLOY_BLOCK")]
    pub deposit_contract_deploy_block: Option<u64>,

    /// Message bus implementation the payload channel is drained into
    #[arg(long, env = "PUBSUB_SERVICE", default_value = "rabbitmq")]
    pub pubsub_service: String,

    #[arg(long, env = "BROKER_TOPIC", default_value = guardian::BROKER_TOPIC)]
    pub broker_topic: String,

    #[arg(long, env = "DB_DIR", default_value = "./data")]
    pub db_dir: PathBuf,

    #[arg(long, env = "METRICS_ADDRESS", default_value = "127.0.0.1:9000")]
    pub metrics_address: SocketAddr,

    #[arg(long, env = "REGISTRY_KEYS_QUERY_BATCH_SIZE", default_value_t = 200)]
    pub registry_keys_query_batch_size: usize,

    #[arg(long, env = "REGISTRY_KEYS_QUERY_CONCURRENCY", default_value_t = 5)]
    pub registry_keys_query_concurrency: usize,
}

/// Validated runtime configuration.
pub struct GuardianNodeConfig {
    pub rpc_urls: Vec<Url>,
    pub wallet_private_key: H256,
    pub keys_api_url: Url,
    pub chain_id: ChainId,
    pub genesis_fork_version: [u8; 4],
    pub addresses: ChainAddresses,
    pub deposit_contract_deploy_block: u64,
    pub broker_topic: String,
    pub db_dir: PathBuf,
    pub metrics_address: SocketAddr,
    pub registry_keys_query_batch_size: usize,
    pub registry_keys_query_concurrency: usize,
}

impl TryFrom<GuardianArgs> for GuardianNodeConfig {
    type Error = AnyhowError;

    fn try_from(args: GuardianArgs) -> Result<Self> {
        ensure!(!args.rpc_url.is_empty(), Error::NoRpcUrls);

        let wallet_private_key = parse_h256(&args.wallet_private_key)?;

        let deposit_contract_address = args
            .deposit_contract_address
            .as_deref()
            .map(parse_address)
            .transpose()?;

        let deposit_security_module_address = args
            .deposit_security_module_address
            .as_deref()
            .map(parse_address)
            .transpose()?;

        let staking_router_address = args
            .staking_router_address
            .as_deref()
            .map(parse_address)
            .transpose()?;

        // The payload channel is transport-agnostic; only known services are
        // accepted so a typo fails at startup instead of going nowhere.
        ensure!(
            matches!(args.pubsub_service.as_str(), "rabbitmq" | "kafka"),
            Error::UnsupportedPubsubService(args.pubsub_service.clone()),
        );

        let keys_api_url = match (&args.keys_api_url, &args.keys_api_host, args.keys_api_port) {
            (Some(url), _, _) => url.clone(),
            (None, Some(host), Some(port)) => format!("http://{host}:{port}/").parse()?,
            _ => return Err(Error::NoKeysApiUrl.into()),
        };

        let genesis_fork_version = match &args.genesis_fork_version {
            Some(hex_version) => parse_fork_version(hex_version)?,
            None => {
                genesis_fork_version(args.chain_id).ok_or(Error::UnknownChain(args.chain_id))?
            }
        };

        let addresses = ChainAddresses::for_chain(
            args.chain_id,
            deposit_contract_address,
            deposit_security_module_address,
            staking_router_address,
        )
        .ok_or(Error::UnknownChain(args.chain_id))?;

        let deposit_contract_deploy_block = args
            .deposit_contract_deploy_block
            .or_else(|| crate::chain::deposit_contract_deploy_block(args.chain_id))
            .unwrap_or_default();

        Ok(Self {
            rpc_urls: args.rpc_url,
            wallet_private_key,
            keys_api_url,
            chain_id: args.chain_id,
            genesis_fork_version,
            addresses,
            deposit_contract_deploy_block,
            broker_topic: args.broker_topic,
            db_dir: args.db_dir,
            metrics_address: args.metrics_address,
            registry_keys_query_batch_size: args.registry_keys_query_batch_size,
            registry_keys_query_concurrency: args.registry_keys_query_concurrency,
        })
    }
}

fn parse_fork_version(hex_version: &str) -> Result<[u8; 4]> {
    let stripped = hex_version.strip_prefix("0x").unwrap_or(hex_version);
    let bytes = hex::decode(stripped).map_err(|_| Error::MalformedForkVersion)?;

    bytes.try_into().map_err(|_| Error::MalformedForkVersion.into())
}

#[derive(Debug, Error)]
#[error("{0} is not valid 0x-prefixed hex of the right length")]
struct MalformedHexError(String);

fn parse_h256(input: &str) -> Result<H256> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(stripped).map_err(|_| MalformedHexError(input.to_owned()))?;

    ensure!(bytes.len() == 32, MalformedHexError(input.to_owned()));

    Ok(H256::from_slice(&bytes))
}

fn parse_address(input: &str) -> Result<Address> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(stripped).map_err(|_| MalformedHexError(input.to_owned()))?;

    ensure!(bytes.len() == 20, MalformedHexError(input.to_owned()));

    Ok(Address::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<String> {
        [
            "deposit_guardian",
            "--rpc-url",
            "http://localhost:8545",
            "--wallet-private-key",
            "0x0000000000000000000000000000000000000000000000000000000000000001",
            "--keys-api-url",
            "http://localhost:3000/",
        ]
        .map(str::to_owned)
        .to_vec()
    }

    #[test]
    fn mainnet_defaults_resolve() -> Result<()> {
        let config = GuardianNodeConfig::try_from(GuardianArgs::try_parse_from(base_args())?)?;

        assert_eq!(config.chain_id, 1);
        assert_eq!(config.genesis_fork_version, [0, 0, 0, 0]);
        assert_eq!(config.deposit_contract_deploy_block, 11_052_984);

        Ok(())
    }

    #[test]
    fn missing_keys_api_url_is_rejected() -> Result<()> {
        let args = [
            "deposit_guardian",
            "--rpc-url",
            "http://localhost:8545",
            "--wallet-private-key",
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        ]
        .map(str::to_owned);

        GuardianNodeConfig::try_from(GuardianArgs::try_parse_from(args)?)
            .expect_err("keys index URL is required");

        Ok(())
    }

    #[test]
    fn unknown_chain_without_overrides_is_rejected() -> Result<()> {
        let mut args = base_args();
        args.extend(["--chain-id".to_owned(), "424242".to_owned()]);

        GuardianNodeConfig::try_from(GuardianArgs::try_parse_from(args)?)
            .expect_err("unknown chain needs explicit addresses");

        Ok(())
    }

    #[test]
    fn unsupported_pubsub_service_is_rejected() -> Result<()> {
        let mut args = base_args();
        args.extend(["--pubsub-service".to_owned(), "carrier-pigeon".to_owned()]);

        GuardianNodeConfig::try_from(GuardianArgs::try_parse_from(args)?)
            .expect_err("unknown bus service should fail validation");

        Ok(())
    }

    #[test]
    fn fork_version_override_is_parsed() -> Result<()> {
        let mut args = base_args();
        args.extend(["--genesis-fork-version".to_owned(), "0x01017000".to_owned()]);

        let config = GuardianNodeConfig::try_from(GuardianArgs::try_parse_from(args)?)?;

        assert_eq!(config.genesis_fork_version, [0x01, 0x01, 0x70, 0x00]);

        Ok(())
    }
}
