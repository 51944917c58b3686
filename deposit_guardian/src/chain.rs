use hex_literal::hex;
use types::primitives::{Address, ChainId};

pub const MAINNET: ChainId = 1;
pub const HOLESKY: ChainId = 17_000;
pub const HOODI: ChainId = 560_048;

/// Fork version deposit messages are signed over: always the genesis fork
/// of the chain, regardless of the current fork.
#[must_use]
pub const fn genesis_fork_version(chain_id: ChainId) -> Option<[u8; 4]> {
    match chain_id {
        MAINNET => Some(hex!("00000000")),
        HOLESKY => Some(hex!("01017000")),
        HOODI => Some(hex!("10000910")),
        _ => None,
    }
}

#[must_use]
pub const fn deposit_contract_deploy_block(chain_id: ChainId) -> Option<u64> {
    match chain_id {
        MAINNET => Some(11_052_984),
        HOLESKY | HOODI => Some(0),
        _ => None,
    }
}

/// The on-chain contracts one deployment of the protocol talks to.
#[derive(Clone, Copy, Debug)]
pub struct ChainAddresses {
    pub deposit_contract: Address,
    pub deposit_security_module: Address,
    pub staking_router: Address,
}

impl ChainAddresses {
    /// Resolves the contract set: explicit overrides win, known chains fill
    /// the rest, fully overridden sets work on any chain.
    #[must_use]
    pub fn for_chain(
        chain_id: ChainId,
        deposit_contract: Option<Address>,
        deposit_security_module: Option<Address>,
        staking_router: Option<Address>,
    ) -> Option<Self> {
        if let (Some(deposit_contract), Some(deposit_security_module), Some(staking_router)) =
            (deposit_contract, deposit_security_module, staking_router)
        {
            return Some(Self {
                deposit_contract,
                deposit_security_module,
                staking_router,
            });
        }

        let defaults = Self::defaults(chain_id)?;

        Some(Self {
            deposit_contract: deposit_contract.unwrap_or(defaults.deposit_contract),
            deposit_security_module: deposit_security_module
                .unwrap_or(defaults.deposit_security_module),
            staking_router: staking_router.unwrap_or(defaults.staking_router),
        })
    }

    const fn defaults(chain_id: ChainId) -> Option<Self> {
        match chain_id {
            MAINNET => Some(Self {
                deposit_contract: Address(hex!("00000000219ab540356cbb839cbe05303d7705fa")),
                deposit_security_module: Address(hex!("ffa96d84def2ea035c7ab153d8b991128e3d72fd")),
                staking_router: Address(hex!("fddf38947afb03c621c71b06c9c70bce73f12999")),
            }),
            HOLESKY => Some(Self {
                deposit_contract: Address(hex!("4242424242424242424242424242424242424242")),
                deposit_security_module: Address(hex!("045dd46212a178428c088573a7d102b9d89a022a")),
                staking_router: Address(hex!("d6ebf043d30a7fe46d1db32ba90a0a51207fe229")),
            }),
            _ => None,
        }
    }
}
