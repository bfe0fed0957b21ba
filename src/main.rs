use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use honey_treasury::{
    auth::{Call, CallBody, KeyFile, SignedCall},
    config::{Config, DEFAULT_CONFIG_PATH},
    host::Host,
    state::StateFile,
    Address, Amount,
};

#[derive(Parser)]
#[command(name = "honey-treasury", version, about = "Owner-gated Honey community treasury")]
struct Cli {
    /// TOML settings; missing file means defaults
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// State file, overrides `state_path` from the config
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an ed25519 caller key and print its address
    Keygen {
        #[arg(long)]
        out: PathBuf,
    },
    /// Mint the supply to a holder and deploy the treasury
    Init {
        #[arg(long)]
        holder: Address,
        /// Minimal units (1 HNY = 10^18)
        #[arg(long)]
        supply: Amount,
        /// Initial treasury owner
        #[arg(long)]
        creator: Address,
        #[arg(long, default_value_t = 0)]
        nonce: u64,
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },
    /// Sign a call addressed to the treasury in the state file
    Sign {
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        nonce: u64,
        /// Write the signed call here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(subcommand)]
        call: CallArgs,
    },
    /// Verify and apply a signed call
    Submit { call: PathBuf },
    /// Ledger balance of an account, the treasury by default
    Balance {
        #[arg(long)]
        account: Option<Address>,
    },
    /// Current treasury owner
    Owner,
    /// Print the full ledger and treasury state
    Snapshot,
}

#[derive(Subcommand)]
enum CallArgs {
    /// Move the signer's own funds
    LedgerTransfer {
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: Amount,
    },
    /// Pay out of the treasury (owner only)
    TreasuryTransfer {
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: Amount,
    },
    TransferOwnership {
        #[arg(long)]
        new_owner: Address,
    },
    RenounceOwnership,
}

impl From<CallArgs> for Call {
    fn from(args: CallArgs) -> Self {
        match args {
            CallArgs::LedgerTransfer { to, amount } => Call::LedgerTransfer { to, amount },
            CallArgs::TreasuryTransfer { to, amount } => Call::TreasuryTransfer { to, amount },
            CallArgs::TransferOwnership { new_owner } => Call::TransferOwnership { new_owner },
            CallArgs::RenounceOwnership => Call::RenounceOwnership,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)
        .with_context(|| format!("writing {}", path.display()))
}

fn load_host(path: &Path) -> anyhow::Result<Host> {
    let state = StateFile::load(path)
        .with_context(|| format!("loading state {} (run `init` first?)", path.display()))?;
    Ok(state.into_host()?)
}

fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let state_path = cli.state.unwrap_or(config.state_path);

    match cli.command {
        Command::Keygen { out } => {
            if out.exists() {
                bail!("{} already exists", out.display());
            }
            let key = KeyFile::generate();
            key.save(&out)
                .with_context(|| format!("writing key {}", out.display()))?;
            println!("{}", key.address);
        }

        Command::Init {
            holder,
            supply,
            creator,
            nonce,
            force,
        } => {
            if state_path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", state_path.display());
            }
            let host = Host::genesis(config.token, holder, supply, creator, nonce)?;
            StateFile::capture(&host).save(&state_path)?;
            info!(state = %state_path.display(), "state initialised");
            println!("treasury {}", host.treasury().address());
        }

        Command::Sign {
            key,
            nonce,
            out,
            call,
        } => {
            let host = load_host(&state_path)?;
            let key: KeyFile = read_json(&key)?;
            let signing = key.signing_key()?;
            let signed = CallBody {
                target: host.treasury().address(),
                nonce,
                call: call.into(),
            }
            .sign(&signing);
            match out {
                Some(path) => write_json(&path, &signed)?,
                None => println!("{}", serde_json::to_string_pretty(&signed)?),
            }
        }

        Command::Submit { call } => {
            let mut host = load_host(&state_path)?;
            let signed: SignedCall = read_json(&call)?;
            let receipt = host.submit(&signed).map_err(|err| match err.kind() {
                Some(kind) => anyhow!("{err} [{kind}]"),
                None => anyhow!(err),
            })?;
            StateFile::capture(&host).save(&state_path)?;
            println!("applied {} from {}", receipt.digest, receipt.caller);
        }

        Command::Balance { account } => {
            let host = load_host(&state_path)?;
            let account = account.unwrap_or_else(|| host.treasury().address());
            println!(
                "{} {}",
                host.ledger().balance_of(&account),
                host.token().symbol
            );
        }

        Command::Owner => {
            let host = load_host(&state_path)?;
            let owner = host.treasury().owner();
            if owner.is_zero() {
                println!("{owner} (renounced)");
            } else {
                println!("{owner}");
            }
        }

        Command::Snapshot => {
            let state = StateFile::load(&state_path)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli, config) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}
