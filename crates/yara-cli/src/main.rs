//! Yara CLI
//!
//! Operator interface for the Yara game economy. Each invocation loads the
//! snapshot, runs one operation against the system clock and saves the
//! snapshot again after write commands.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use yara_core::prelude::*;
use yara_economics::config::LoggingConfig;
use yara_economics::{
    verifier_from_config, Economy, EconomyConfig, LeaderboardKind, TaskEvidence, TaskKind,
    DEFAULT_LEADERBOARD_LIMIT, SYMBOL,
};
use yara_storage::MemoryStore;

#[derive(Parser)]
#[command(name = "yara")]
#[command(author = "Yara Game Team")]
#[command(version)]
#[command(about = "Yara - play-money game economy: claims, daily cipher, referrals, upgrades, tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "yara.toml")]
    config: PathBuf,

    /// Snapshot file (overrides storage.snapshot_path)
    #[arg(short, long, global = true, env = "YARA_DATA")]
    data: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Create {
        /// Identity at the external platform (e.g. Telegram user id)
        external_id: String,

        /// Display name
        name: String,

        /// Referral code of the inviting player
        #[arg(short, long)]
        referral_code: Option<String>,
    },

    /// Show an account
    Show {
        /// Account id or external id
        account: String,
    },

    /// Collect the periodic base claim
    Claim { account: String },

    /// Submit today's cipher solution
    Solve { account: String, solution: String },

    /// Link an account under a referrer's code
    Refer {
        /// Referrer's code
        code: String,
        /// Referred account
        account: String,
    },

    /// Show a referrer's network and harvest history
    Referrals { account: String },

    /// Harvest referral income
    ClaimReferrals { account: String },

    /// Buy an upgrade
    Buy { account: String, item: String },

    /// List shop items
    Items,

    /// List tasks, with progress when an account is given
    Tasks { account: Option<String> },

    /// Task operations
    Task {
        #[command(subcommand)]
        task: TaskCommands,
    },

    /// Record a mini-game score
    Points { account: String, points: u64 },

    /// Show the leaderboard
    Leaderboard {
        #[arg(short, long, value_enum, default_value = "balance")]
        by: Board,

        #[arg(short, long, default_value_t = DEFAULT_LEADERBOARD_LIMIT)]
        limit: usize,
    },

    /// Clear expired cipher flags on one batch of accounts
    Sweep,

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Check a task's requirement
    Verify {
        account: String,
        task: String,
        /// Handle at the external platform, for follow tasks
        #[arg(long)]
        handle: Option<String>,
    },
    /// Collect a completed task's reward
    Claim { account: String, task: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Board {
    Balance,
    GamePoints,
}

impl From<Board> for LeaderboardKind {
    fn from(board: Board) -> Self {
        match board {
            Board::Balance => LeaderboardKind::Balance,
            Board::GamePoints => LeaderboardKind::GamePoints,
        }
    }
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn expand_path(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|p| p.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// TOML file layered under `YARA__SECTION__KEY` environment variables
fn load_config(path: &Path) -> anyhow::Result<EconomyConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("YARA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("reading configuration {}", path.display()))?;
    let economy: EconomyConfig = settings
        .try_deserialize()
        .context("invalid configuration")?;
    economy.validate()?;
    Ok(economy)
}

fn format_time(ts: Timestamp) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_amount(amount: Balance) -> String {
    format!("{} {}", format_balance(amount), SYMBOL)
}

impl Commands {
    /// True for commands that may change stored state
    fn writes(&self) -> bool {
        !matches!(
            self,
            Commands::Show { .. }
                | Commands::Referrals { .. }
                | Commands::Items
                | Commands::Tasks { .. }
                | Commands::Leaderboard { .. }
                | Commands::Config
        )
    }
}

/// Look an account up by id, falling back to its external id
fn resolve(economy: &Economy, key: &str) -> Result<AccountId> {
    let id = AccountId::new(key);
    match economy.account(&id) {
        Ok(account) => Ok(account.id),
        Err(YaraError::AccountNotFound(_)) => economy
            .account_by_external_id(key)
            .map(|account| account.id)
            .map_err(|_| YaraError::AccountNotFound(id)),
        Err(e) => Err(e),
    }
}

/// Run one command against the economy
async fn run(command: Commands, economy: &Economy) -> anyhow::Result<()> {
    match command {
        Commands::Create {
            external_id,
            name,
            referral_code,
        } => {
            let account = economy.create_account(&external_id, &name, referral_code.as_deref())?;
            println!("Account created");
            println!("  ID:            {}", account.id);
            println!("  Referral code: {}", account.referral_code);
            Ok(())
        }

        Commands::Show { account } => {
            let id = resolve(economy, &account)?;
            let summary = economy.summary(&id)?;
            let acc = &summary.account;
            println!("{} ({})", acc.display_name, acc.id);
            println!("  External ID:        {}", acc.external_id);
            println!("  Balance:            {}", format_amount(acc.balance));
            println!("  Referral code:      {}", acc.referral_code);
            println!("  Referrals:          {}", summary.referral_count);
            println!("  Balance multiplier: {}", acc.balance_multiplier);
            println!("  Mining multiplier:  {}", acc.mining_multiplier);
            println!("  Mining rate:        {}/h", format_amount(summary.mining_rate_per_hour));
            println!("  Next claim reward:  {}", format_amount(summary.claim_reward));
            match summary.next_claim_at {
                Some(at) if !summary.claim_ready => println!("  Next claim:         {}", format_time(at)),
                _ => println!("  Next claim:         ready"),
            }
            match summary.next_cipher_at {
                Some(at) => println!("  Next cipher:        {}", format_time(at)),
                None => println!("  Next cipher:        ready"),
            }
            println!("  Game points:        {}", acc.game_points);
            if !acc.purchased_upgrades.is_empty() {
                let upgrades: Vec<&str> = acc.purchased_upgrades.iter().map(|i| i.as_str()).collect();
                println!("  Upgrades:           {}", upgrades.join(", "));
            }
            Ok(())
        }

        Commands::Claim { account } => {
            let id = resolve(economy, &account)?;
            let receipt = economy.claim(&id)?;
            println!("Claimed {}", format_amount(receipt.amount));
            println!("  Balance:    {}", format_amount(receipt.new_balance));
            println!("  Next claim: {}", format_time(receipt.next_claim_at));
            Ok(())
        }

        Commands::Solve { account, solution } => {
            let id = resolve(economy, &account)?;
            let receipt = economy.solve_cipher(&id, &solution)?;
            println!("Cipher solved! +{}", format_amount(receipt.bonus));
            println!("  Balance:     {}", format_amount(receipt.new_balance));
            println!("  Next cipher: {}", format_time(receipt.next_cipher_at));
            Ok(())
        }

        Commands::Refer { code, account } => {
            let id = resolve(economy, &account)?;
            let edge = economy.add_referral_edge(&code, &id)?;
            println!("{} is now referred by {}", edge.referred, edge.referrer);
            Ok(())
        }

        Commands::Referrals { account } => {
            let id = resolve(economy, &account)?;
            let overview = economy.referral_overview(&id)?;
            println!("Referral code: {}", overview.referral_code);
            println!("Referrals:     {}", overview.entries.len());
            for entry in &overview.entries {
                println!(
                    "  {:<24} earned {:>16}  claimable {:>16}",
                    entry.display_name,
                    format_amount(entry.daily_earnings),
                    format_amount(entry.claimable)
                );
            }
            println!("Total claimable: {}", format_amount(overview.total_claimable));
            match overview.next_claim_at {
                Some(at) if at > economy.now() => println!("Next harvest:    {}", format_time(at)),
                _ => println!("Next harvest:    ready"),
            }

            let history = economy.referral_claims(&id)?;
            if !history.is_empty() {
                println!("History:");
                for record in history.iter().rev().take(10) {
                    println!(
                        "  {}  {}  from {}",
                        format_time(record.claimed_at),
                        format_amount(record.amount),
                        record.referred
                    );
                }
            }
            Ok(())
        }

        Commands::ClaimReferrals { account } => {
            let id = resolve(economy, &account)?;
            let harvest = economy.claim_referral_rewards(&id)?;
            println!(
                "Harvested {} from {} referrals",
                format_amount(harvest.amount),
                harvest.shares.len()
            );
            println!("  Balance:      {}", format_amount(harvest.new_balance));
            println!("  Next harvest: {}", format_time(harvest.next_claim_at));
            Ok(())
        }

        Commands::Buy { account, item } => {
            let id = resolve(economy, &account)?;
            let receipt = economy.purchase(&id, &ItemId::new(item))?;
            println!("Purchased {}", receipt.item);
            println!("  Charged:            {}", format_amount(receipt.charged));
            println!("  Balance:            {}", format_amount(receipt.new_balance));
            println!("  Balance multiplier: {}", receipt.balance_multiplier);
            println!("  Mining multiplier:  {}", receipt.mining_multiplier);
            Ok(())
        }

        Commands::Items => {
            for item in economy.shop_items() {
                let price = match item.currency {
                    yara_economics::Currency::Soft => format_amount(item.price),
                    yara_economics::Currency::Hard => format!("{} (premium)", item.price),
                };
                println!(
                    "{:<16} {:<16} {:>20}  {} {:?}  {}",
                    item.id.as_str(),
                    item.name,
                    price,
                    item.multiplier,
                    item.target,
                    item.description
                );
            }
            Ok(())
        }

        Commands::Tasks { account } => {
            let id = account.map(|a| resolve(economy, &a)).transpose()?;
            for task in economy.tasks() {
                let requirement = match &task.requirement {
                    TaskKind::ReferralCount { required_count } => format!("invite {} friends", required_count),
                    TaskKind::ExternalFollow { url } => format!("join {}", url),
                    TaskKind::BalanceMilestone { required_balance } => {
                        format!("hold {}", format_amount(*required_balance))
                    }
                };
                let status = match &id {
                    Some(id) => format!("{:?}", economy.task_status(id, &task.id)?.state()),
                    None => String::new(),
                };
                println!(
                    "{:<20} {:>16}  {:<40} {}",
                    task.id.as_str(),
                    format_amount(task.reward_amount),
                    requirement,
                    status
                );
            }
            Ok(())
        }

        Commands::Task { task } => match task {
            TaskCommands::Verify {
                account,
                task,
                handle,
            } => {
                let id = resolve(economy, &account)?;
                let evidence = TaskEvidence { handle };
                let verification = economy.verify_task(&id, &TaskId::new(task), &evidence).await?;
                if verification.completed {
                    println!("Task {} completed", verification.task);
                } else {
                    println!("Task {} not completed yet", verification.task);
                }
                Ok(())
            }
            TaskCommands::Claim { account, task } => {
                let id = resolve(economy, &account)?;
                let receipt = economy.claim_task(&id, &TaskId::new(task))?;
                println!("Task {} reward: {}", receipt.task, format_amount(receipt.reward));
                println!("  Balance: {}", format_amount(receipt.new_balance));
                Ok(())
            }
        },

        Commands::Points { account, points } => {
            let id = resolve(economy, &account)?;
            let account = economy.set_game_points(&id, points)?;
            println!("{} now has {} game points", account.display_name, account.game_points);
            Ok(())
        }

        Commands::Leaderboard { by, limit } => {
            let kind = LeaderboardKind::from(by);
            for entry in economy.leaderboard(kind, limit)? {
                let score = match kind {
                    LeaderboardKind::Balance => format_amount(entry.score),
                    LeaderboardKind::GamePoints => entry.score.to_string(),
                };
                println!("{:>3}. {:<24} {:>20}", entry.rank, entry.display_name, score);
            }
            Ok(())
        }

        Commands::Sweep => {
            let report = economy.sweep_expired_ciphers()?;
            println!(
                "Scanned {} accounts, cleared {} expired ciphers{}",
                report.scanned,
                report.expired,
                if report.wrapped { " (end of table reached)" } else { "" }
            );
            Ok(())
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(economy.config())?);
            Ok(())
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config_path = expand_path(&cli.config);
    let config = load_config(&config_path)?;
    init_logging(cli.verbose, &config.logging);

    let data_path = expand_path(
        cli.data
            .as_deref()
            .unwrap_or_else(|| Path::new(&config.storage.snapshot_path)),
    );
    tracing::debug!("Config: {:?}", config_path);
    tracing::debug!("Data: {:?}", data_path);

    let store = Arc::new(MemoryStore::open_or_default(&data_path)?);
    let verifier = verifier_from_config(&config.verification, config.tasks.verification_timeout())?;
    let economy = Economy::new(store.clone(), config, Arc::new(SystemClock), verifier)?;

    let writes = cli.command.writes();
    let outcome = run(cli.command, &economy).await;
    persist(writes, &store, &data_path, outcome)
}

/// Save the snapshot after any write command, whether or not it succeeded
///
/// A rejected solve may still have committed the expiry sweep that ran
/// before it; failed commits leave the store unchanged, so saving is safe.
fn persist(writes: bool, store: &MemoryStore, path: &Path, outcome: anyhow::Result<()>) -> anyhow::Result<()> {
    let saved = if writes { store.save_snapshot(path) } else { Ok(()) };
    outcome?;
    saved?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        match e.downcast_ref::<YaraError>() {
            Some(err) => eprintln!("Error [{}]: {}", err.code(), err),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}
