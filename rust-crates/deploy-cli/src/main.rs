mod wallets;

use alloy::{
    network::{
        EthereumWallet,
        ReceiptResponse as _,
        TransactionBuilder,
    },
    primitives::{
        Address,
        U256,
        utils::{
            format_ether,
            parse_ether,
        },
    },
    providers::{
        Provider,
        ProviderBuilder,
    },
    rpc::types::{
        TransactionReceipt,
        TransactionRequest,
    },
};
use anyhow::{
    Context,
    Result,
};
use clap::{
    ArgGroup,
    Parser,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use generated_abi::{
    HardhatArtifact,
    REVERT_MAX_TAPS_REACHED,
    TAPGEM_ARTIFACT,
    VAULT_ARTIFACT,
    erc20_types::IERC20,
    tapgem_types::TapGem,
    vault_deploy_code,
};
use std::{
    path::Path,
    str::FromStr,
};

use crate::wallets::{
    find_wallet,
    resolve_wallet_dir,
    unlock_wallet,
};

const DEFAULT_SOMNIA_RPC_URL: &str = "https://dream-rpc.somnia.network";
const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";
const SIMULATED_DAILY_TAPS: usize = 20;

const TAP_LORE: [&str; SIMULATED_DAILY_TAPS] = [
    "A faint hum... the Gem stirs.",
    "Energy received. It remembers you.",
    "You echo through time.",
    "Its glow intensifies.",
    "Connection deepens. Taplight surging.",
    "Ancient protocols reactivate.",
    "The veil between realms flickers.",
    "The Gem speaks: 'Do not stop now.'",
    "Stars shift above as you persist.",
    "Streak maintained. The relic breathes.",
    "Your rhythm binds us.",
    "You've drawn the attention of something vast...",
    "It glows in sync with your intent.",
    "Dreamlight accumulates.",
    "The cosmos bends closer.",
    "A faint whisper: 'Almost ready.'",
    "The Awakening nears completion.",
    "Tethers to the old realm reconnect.",
    "You have almost filled the Gem's hunger.",
    "Enough for today. Let the Gem rest... until dawn.",
];

#[derive(Parser, Debug)]
#[command(
    name = "tapgem-deploy",
    about = "Deploy TapGem and run operator utilities (vault, funding, balances, simulation)",
    version,
    group(
        ArgGroup::new("network")
            .args(["somnia", "local"])
            .required(true)
    )
)]
struct Args {
    /// Use Somnia Testnet
    #[arg(long)]
    somnia: bool,

    /// Use a local hardhat/anvil node
    #[arg(long)]
    local: bool,

    /// Override RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Keystore name (a <name>.json file in the keystore directory)
    #[arg(long)]
    wallet: Option<String>,

    /// Override keystore directory (defaults to ~/.proof-of-tap/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Which action to perform (defaults to deploy)
    #[arg(short, long, value_enum, default_value = "deploy")]
    action: Action,

    /// Hardhat artifact to deploy (defaults to the TapGem or vault artifact)
    #[arg(long)]
    artifact: Option<String>,

    /// STT token address (deploy-vault, fund, balance; defaults to the stored record)
    #[arg(long)]
    stt_token: Option<String>,

    /// Amount of STT to transfer (fund only), e.g. "10" or "0.5"
    #[arg(long)]
    amount: Option<String>,

    /// Address to inspect (balance) or fund (defaults to this wallet / the TapGem)
    #[arg(long)]
    address: Option<String>,

    /// TapGem address (defaults to the stored deployment)
    #[arg(long)]
    contract: Option<String>,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Action {
    Deploy,
    DeployVault,
    Fund,
    Balance,
    CheckNetwork,
    Simulate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
    let args = Args::parse();
    deployments::ensure_structure().context("initializing deployment directories")?;

    let (env, default_url) = if args.somnia {
        (DeploymentEnv::Somnia, DEFAULT_SOMNIA_RPC_URL)
    } else {
        (DeploymentEnv::Local, DEFAULT_LOCAL_RPC_URL)
    };
    let rpc_url = args
        .rpc_url
        .clone()
        .unwrap_or_else(|| default_url.to_string());
    let url = rpc_url
        .parse()
        .with_context(|| format!("invalid RPC URL {rpc_url}"))?;
    let store = DeploymentStore::new(env).context("opening deployment store")?;

    if let Action::CheckNetwork = args.action {
        let provider = ProviderBuilder::new().connect_http(url);
        let chain_id = provider.get_chain_id().await.context("fetching chain id")?;
        let block = provider
            .get_block_number()
            .await
            .context("fetching latest block")?;
        println!("Connected to {env} at {rpc_url}");
        println!("  Chain id: {chain_id} ({chain_id:#x})");
        println!("  Latest block: {block}");
        return Ok(());
    }

    let wallet_name = args
        .wallet
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--wallet <name> is required for {:?}", args.action))?;
    let wallet_dir = resolve_wallet_dir(args.wallet_dir.as_deref())
        .context("resolving keystore directory")?;
    let descriptor =
        find_wallet(&wallet_dir, wallet_name).context("locating requested keystore")?;
    let signer = unlock_wallet(&descriptor).context("unlocking keystore")?;
    let me = signer.address();
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(url);
    let chain_id = provider.get_chain_id().await.context("fetching chain id")?;
    println!("Using wallet {wallet_name} ({me}) on {env}, chain {chain_id}");

    match args.action {
        Action::Deploy => {
            let artifact_path = args.artifact.as_deref().unwrap_or(TAPGEM_ARTIFACT);
            let (address, hash) = deploy_artifact(&provider, artifact_path, None).await?;
            let record = deployments::record_deployment(
                env,
                &rpc_url,
                chain_id,
                address.to_string(),
                hash,
            )
            .context("recording deployment")?;
            println!("TapGem deployed: {}", record.tapgem_address);
            println!("Deployment metadata written to {}", store.path().display());
        }
        Action::DeployVault => {
            let mut record = latest_record(&store)?;
            let stt_token = parse_address(
                args.stt_token
                    .as_deref()
                    .or(record.stt_token_address.as_deref())
                    .ok_or_else(|| anyhow::anyhow!("--stt-token <address> is required"))?,
            )?;
            let artifact_path = args.artifact.as_deref().unwrap_or(VAULT_ARTIFACT);
            let (address, hash) =
                deploy_artifact(&provider, artifact_path, Some(stt_token)).await?;
            record.vault_address = Some(address.to_string());
            record.vault_bytecode_hash = Some(hash);
            record.stt_token_address = Some(stt_token.to_string());
            store.save(&record).context("recording vault deployment")?;
            println!("STTTokenVault deployed: {address} (token {stt_token})");
        }
        Action::Fund => {
            let record = store.load().context("loading deployment record")?;
            let token = stt_token_address(args.stt_token.as_deref(), record.as_ref())?;
            let target = match args.address.as_deref() {
                Some(raw) => parse_address(raw)?,
                None => tapgem_address(args.contract.as_deref(), record.as_ref())?,
            };
            let raw_amount = args
                .amount
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--amount <stt> is required for fund action"))?;
            let amount = parse_ether(raw_amount)
                .with_context(|| format!("parsing --amount {raw_amount}"))?;

            let stt = IERC20::new(token, &provider);
            let balance = stt
                .balanceOf(me)
                .call()
                .await
                .context("reading STT balance")?;
            println!("Your STT balance: {}", format_ether(balance));
            if balance < amount {
                anyhow::bail!("Not enough STT to fund {target} with {raw_amount}");
            }
            let receipt = stt
                .transfer(target, amount)
                .send()
                .await
                .context("submitting STT transfer")?
                .get_receipt()
                .await
                .context("waiting for STT transfer")?;
            ensure_success(&receipt, "STT transfer")?;
            println!("Transfer tx hash: {}", receipt.transaction_hash);
            println!("Successfully transferred {raw_amount} STT to {target}");
        }
        Action::Balance => {
            let record = store.load().context("loading deployment record")?;
            let who = match args.address.as_deref() {
                Some(raw) => parse_address(raw)?,
                None => me,
            };
            let native = provider.get_balance(who).await.context("reading balance")?;
            println!("Address {who}");
            println!("  Native balance: {}", format_ether(native));
            match stt_token_address(args.stt_token.as_deref(), record.as_ref()) {
                Ok(token) => {
                    let balance = IERC20::new(token, &provider)
                        .balanceOf(who)
                        .call()
                        .await
                        .context("calling balanceOf")?;
                    println!("  STT token {token}: {}", format_ether(balance));
                }
                Err(_) => println!("  STT token: not configured (pass --stt-token)"),
            }
        }
        Action::Simulate => {
            let record = store.load().context("loading deployment record")?;
            let address = tapgem_address(args.contract.as_deref(), record.as_ref())?;
            simulate(&provider, address, me).await?;
        }
        Action::CheckNetwork => {}
    }
    Ok(())
}

async fn deploy_artifact(
    provider: &impl Provider,
    artifact_path: &str,
    vault_token: Option<Address>,
) -> Result<(Address, String)> {
    if !Path::new(artifact_path).exists() {
        anyhow::bail!(
            "Contract artifact not found at {artifact_path}; run `npx hardhat compile` first"
        );
    }
    let hash = deployments::compute_bytecode_hash(artifact_path)
        .context("hashing contract artifact")?;
    let artifact = HardhatArtifact::load(artifact_path)?;
    let creation_code = artifact.creation_code()?;
    let code = match vault_token {
        Some(token) => vault_deploy_code(&creation_code, token),
        None => creation_code,
    };
    println!("Deploying {} from {artifact_path}...", artifact.contract_name);
    let tx = TransactionRequest::default().with_deploy_code(code);
    let receipt = provider
        .send_transaction(tx)
        .await
        .with_context(|| format!("deploying {}", artifact.contract_name))?
        .get_receipt()
        .await
        .context("waiting for deployment receipt")?;
    ensure_success(&receipt, "deployment")?;
    let address = receipt
        .contract_address
        .context("deployment receipt has no contract address")?;
    println!(
        "{} deployed at {address} (tx: {})",
        artifact.contract_name, receipt.transaction_hash
    );
    Ok((address, hash))
}

async fn simulate(provider: &impl Provider, address: Address, me: Address) -> Result<()> {
    let tapgem = TapGem::new(address, provider);
    println!("Starting tap simulation against {address}...\n");

    for (index, lore) in TAP_LORE.iter().enumerate() {
        let tap_number = index + 1;
        let outcome = match tapgem.tap().send().await {
            Ok(pending) => pending.get_receipt().await.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e)),
        };
        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(e) => {
                let reason = format!("{e:#}");
                if reason.contains(REVERT_MAX_TAPS_REACHED) {
                    println!("Tap #{tap_number}: daily cap reached ({REVERT_MAX_TAPS_REACHED}).");
                } else {
                    println!("Tap #{tap_number} failed: {reason}");
                }
                println!("Stopping further taps.");
                break;
            }
        };
        if !receipt.status() {
            println!("Tap #{tap_number} reverted (tx {}).", receipt.transaction_hash);
            println!("Stopping further taps.");
            break;
        }

        let stats = tapgem
            .getUserStats(me)
            .call()
            .await
            .context("reading stats after tap")?;
        println!("Tap #{tap_number}: \"{lore}\"");
        println!("Taps today: {}/{SIMULATED_DAILY_TAPS}", stats.tapsToday);
        println!("Current streak: {} day(s)", stats.currentStreak);
        println!("Points earned: {}", stats.points);
        println!("Unclaimed rewards: {} STT", format_ether(stats.unclaimedRewards));
        println!(
            "Total STT claimed so far: {} STT",
            format_ether(stats.totalRewardClaimed)
        );
        println!("----");
    }

    println!("\nAttempting to claim rewards...");
    let stats = tapgem
        .getUserStats(me)
        .call()
        .await
        .context("reading stats before claim")?;
    if stats.unclaimedRewards == U256::ZERO {
        println!("Nothing to claim.");
    } else {
        let claimed = match tapgem.claimRewards(stats.unclaimedRewards).send().await {
            Ok(pending) => pending.get_receipt().await.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e)),
        };
        match claimed {
            Ok(receipt) if receipt.status() => {
                let after = tapgem
                    .getUserStats(me)
                    .call()
                    .await
                    .context("reading stats after claim")?;
                println!("Reward claimed successfully!");
                println!(
                    "Total STT claimed now: {} STT",
                    format_ether(after.totalRewardClaimed)
                );
            }
            Ok(receipt) => println!("Claim reverted (tx {}).", receipt.transaction_hash),
            Err(e) => println!("Claim reward failed: {e:#}"),
        }
    }

    let stats = tapgem
        .getUserStats(me)
        .call()
        .await
        .context("reading final stats")?;
    println!("\nYour points: {}", stats.points);
    println!("\nSimulation complete.");
    Ok(())
}

fn ensure_success(receipt: &TransactionReceipt, what: &str) -> Result<()> {
    if !receipt.status() {
        anyhow::bail!("{what} reverted (tx {})", receipt.transaction_hash);
    }
    Ok(())
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|e| anyhow::anyhow!("unable to parse address {raw}: {e}"))
}

fn tapgem_address(cli: Option<&str>, record: Option<&DeploymentRecord>) -> Result<Address> {
    match (cli, record) {
        (Some(raw), _) => parse_address(raw),
        (None, Some(record)) => parse_address(&record.tapgem_address),
        (None, None) => Err(anyhow::anyhow!(
            "no TapGem deployment found for this environment; pass --contract"
        )),
    }
}

fn stt_token_address(cli: Option<&str>, record: Option<&DeploymentRecord>) -> Result<Address> {
    let raw = cli
        .or_else(|| record.and_then(|r| r.stt_token_address.as_deref()))
        .ok_or_else(|| anyhow::anyhow!("no STT token address; pass --stt-token"))?;
    parse_address(raw)
}

fn latest_record(store: &DeploymentStore) -> Result<DeploymentRecord> {
    store
        .latest()
        .context("deploy TapGem before the vault so both land in one record")
}
