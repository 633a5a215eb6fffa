use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use proof_of_tap::{
    config::{
        NetworkConfig,
        TapGemConfig,
    },
    gate::GateConfig,
    keystore_provider::{
        KeystoreProvider,
        SwitchPolicy,
    },
    wallets,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use url::Url;

mod client;
mod ui;

const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "proof-of-tap.log";
const NETWORK_REGISTRY_FILE: &str = "networks.json";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: proof-of-tap [--somnia | --local] [--rpc-url <url>] [--contract <address>]\n\
         [--wallet <name>] [--wallet-dir <path>] [--session-file <path>] [--log-dir <path>]\n\
         [--stay-on-network] [--require-interaction] [--interaction-url <url>]\n\
         \n\
         Flags:\n\
           --somnia                Play on Somnia Testnet (default RPC {})\n\
           --local                 Play on a local node (default RPC {})\n\
           --rpc-url <url>         Override the RPC URL for the selected network\n\
           --contract <address>    TapGem address (defaults to TAPGEM_ADDRESS, then the deployment record)\n\
           --wallet <name>         Keystore to unlock for tapping\n\
           --wallet-dir <path>     Override the keystore directory (defaults to ~/.proof-of-tap/keystores)\n\
           --session-file <path>   Keep verification progress across runs\n\
           --log-dir <path>        Where to write logs (defaults to ./{})\n\
           --stay-on-network       Refuse network switch requests\n\
           --require-interaction   Add the post interaction step to verification\n\
           --interaction-url <url> Post to interact with during verification",
        proof_of_tap::config::DEFAULT_SOMNIA_RPC_URL,
        proof_of_tap::config::DEFAULT_LOCAL_RPC_URL,
        DEFAULT_LOG_DIR,
    );
    std::process::exit(0);
}

struct CliArgs {
    env: DeploymentEnv,
    rpc_url: Option<Url>,
    contract: Option<Address>,
    wallet: Option<String>,
    wallet_dir: Option<String>,
    session_file: Option<PathBuf>,
    log_dir: PathBuf,
    stay_on_network: bool,
    require_interaction: bool,
    interaction_url: Option<String>,
}

fn parse_cli_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut env: Option<DeploymentEnv> = None;
    let mut rpc_url: Option<Url> = None;
    let mut contract: Option<Address> = None;
    let mut wallet: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut session_file: Option<PathBuf> = None;
    let mut log_dir: Option<PathBuf> = None;
    let mut stay_on_network = false;
    let mut require_interaction = false;
    let mut interaction_url: Option<String> = None;

    fn value(
        args: &mut impl Iterator<Item = String>,
        flag: &str,
        what: &str,
        already_set: bool,
    ) -> Result<String> {
        let value = args
            .next()
            .ok_or_else(|| eyre!("{flag} requires {what}"))?;
        if already_set {
            return Err(eyre!("{flag} may only be specified once"));
        }
        Ok(value)
    }

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--somnia" | "--local" => {
                if env.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --somnia/--local"
                    ));
                }
                env = Some(if arg == "--somnia" {
                    DeploymentEnv::Somnia
                } else {
                    DeploymentEnv::Local
                });
            }
            "--rpc-url" => {
                let raw = value(&mut args, "--rpc-url", "a URL argument", rpc_url.is_some())?;
                if env.is_none() {
                    return Err(eyre!("--rpc-url must follow a network flag (--somnia/--local)"));
                }
                rpc_url =
                    Some(Url::parse(&raw).wrap_err_with(|| format!("invalid --rpc-url {raw}"))?);
            }
            "--contract" => {
                let raw = value(&mut args, "--contract", "an address", contract.is_some())?;
                contract = Some(
                    Address::from_str(&raw)
                        .wrap_err_with(|| format!("invalid --contract {raw}"))?,
                );
            }
            "--wallet" => {
                wallet = Some(value(&mut args, "--wallet", "a keystore name", wallet.is_some())?);
            }
            "--wallet-dir" => {
                wallet_dir = Some(value(
                    &mut args,
                    "--wallet-dir",
                    "a path argument",
                    wallet_dir.is_some(),
                )?);
            }
            "--session-file" => {
                let raw = value(
                    &mut args,
                    "--session-file",
                    "a path argument",
                    session_file.is_some(),
                )?;
                session_file = Some(PathBuf::from(shellexpand::tilde(&raw).into_owned()));
            }
            "--log-dir" => {
                let raw = value(&mut args, "--log-dir", "a path argument", log_dir.is_some())?;
                log_dir = Some(PathBuf::from(shellexpand::tilde(&raw).into_owned()));
            }
            "--interaction-url" => {
                interaction_url = Some(value(
                    &mut args,
                    "--interaction-url",
                    "a URL argument",
                    interaction_url.is_some(),
                )?);
            }
            "--stay-on-network" => stay_on_network = true,
            "--require-interaction" => require_interaction = true,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    if require_interaction && interaction_url.is_none() {
        return Err(eyre!("--require-interaction needs --interaction-url <url>"));
    }

    Ok(CliArgs {
        env: env.unwrap_or(DeploymentEnv::Somnia),
        rpc_url,
        contract,
        wallet,
        wallet_dir,
        session_file,
        log_dir: log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        stay_on_network,
        require_interaction,
        interaction_url,
    })
}

fn init_tracing(log_dir: &Path) {
    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}

fn resolve_contract(
    cli: Option<Address>,
    config: &TapGemConfig,
    env: DeploymentEnv,
) -> Result<Address> {
    if let Some(address) = cli.or(config.contract_address) {
        return Ok(address);
    }
    let record = DeploymentStore::new(env)
        .and_then(|store| store.latest())
        .map_err(|e| eyre!(e))
        .wrap_err_with(|| {
            format!("No TapGem address given; pass --contract or deploy to {env} first")
        })?;
    Address::from_str(&record.tapgem_address).wrap_err_with(|| {
        format!(
            "deployment record holds a bad address {}",
            record.tapgem_address
        )
    })
}

async fn build_app_config(cli: CliArgs) -> Result<client::AppConfig> {
    let network = match cli.env {
        DeploymentEnv::Somnia => NetworkConfig::somnia_testnet(),
        DeploymentEnv::Local => NetworkConfig::local(),
    };
    let mut tapgem = TapGemConfig::from_env(network)?;
    if let Some(url) = cli.rpc_url {
        tapgem.network.rpc_url = url;
    }
    tapgem.contract_address = Some(resolve_contract(cli.contract, &tapgem, cli.env)?);

    let wallet_dir = wallets::resolve_wallet_dir(cli.wallet_dir.as_deref())?;
    let signer = match &cli.wallet {
        Some(name) => {
            let descriptor = wallets::find_wallet(&wallet_dir, name)?;
            Some(wallets::unlock_wallet(&descriptor)?)
        }
        None => {
            println!("No --wallet given; stats are read-only until you restart with one.");
            None
        }
    };
    let policy = if cli.stay_on_network {
        SwitchPolicy::Decline
    } else {
        SwitchPolicy::Approve
    };
    let provider = match KeystoreProvider::connect(
        tapgem.network.rpc_url.clone(),
        signer,
        Some(wallet_dir.join(NETWORK_REGISTRY_FILE)),
        policy,
    )
    .await
    {
        Ok(provider) => Some(provider),
        Err(e) => {
            tracing::warn!(error = %e, "wallet provider unavailable");
            None
        }
    };

    let mut gate = GateConfig::new(tapgem.social.follow_url());
    gate.require_interaction = cli.require_interaction;
    gate.interaction_url = cli.interaction_url;

    Ok(client::AppConfig {
        tapgem,
        provider,
        gate,
        session_file: cli.session_file,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = parse_cli_args()?;
    init_tracing(&cli.log_dir);
    tracing::info!(network = %cli.env, "starting proof-of-tap client");
    let app_config = build_app_config(cli).await?;
    client::run_app(app_config).await
}
