//! Command-line harness for the identity cache.
//!
//! # Responsibility
//! - Expose store, link and lookup operations for manual checks.
//! - Run the LOCAL-domain scenario end to end and report each check.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use sysdb_core::{
    init_stderr_logging, load_config, open_db, open_db_in_memory, PosixAccountAttrs,
    PosixGroupAttrs, SqliteEntryRepository, SysdbConfig, SysdbService, DEFAULT_DOMAIN,
};

mod scenario;

#[derive(Parser)]
#[command(name = "sysdb")]
#[command(about = "Local POSIX identity cache", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cache database file (in-memory when omitted)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level written to stderr
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update an account
    StoreAccount {
        #[arg(short, long, default_value = DEFAULT_DOMAIN)]
        domain: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        uid: u32,

        #[arg(long)]
        gid: u32,

        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        gecos: Option<String>,

        #[arg(long)]
        home: Option<String>,

        #[arg(long)]
        shell: Option<String>,
    },

    /// Create or update a group
    StoreGroup {
        #[arg(short, long, default_value = DEFAULT_DOMAIN)]
        domain: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        gid: u32,
    },

    /// Add an account to a group
    AddMember {
        #[arg(short, long, default_value = DEFAULT_DOMAIN)]
        domain: String,

        #[arg(long)]
        group: String,

        #[arg(long)]
        account: String,
    },

    /// Print one group as JSON
    ShowGroup {
        #[arg(short, long, default_value = DEFAULT_DOMAIN)]
        domain: String,

        #[arg(long, conflicts_with = "gid", required_unless_present = "gid")]
        name: Option<String>,

        #[arg(long)]
        gid: Option<u32>,
    },

    /// Print one account as JSON
    ShowAccount {
        #[arg(short, long, default_value = DEFAULT_DOMAIN)]
        domain: String,

        #[arg(long)]
        name: String,
    },

    /// Run the LOCAL-domain account/group scenario
    Scenario,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_stderr_logging(&cli.log_level).map_err(anyhow::Error::msg)?;

    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SysdbConfig::default(),
    };
    if cli.db.is_some() {
        config.db_path = cli.db.clone();
    }

    let conn = match &config.db_path {
        Some(path) => open_db(path).with_context(|| format!("opening {}", path.display()))?,
        None => open_db_in_memory().context("opening in-memory cache")?,
    };
    let repo = SqliteEntryRepository::try_new(&conn)?;
    let sysdb = SysdbService::try_new(repo, &config)?;
    info!(
        "event=cli_start module=cli status=ok domains={}",
        sysdb.config().domains.len()
    );

    match cli.command {
        Commands::StoreAccount {
            domain,
            name,
            uid,
            gid,
            password,
            gecos,
            home,
            shell,
        } => {
            let mut account = PosixAccountAttrs::new(name, uid, gid);
            account.password = password;
            account.gecos = gecos;
            account.home = home;
            account.shell = shell;
            let outcome = sysdb.store_account(&domain, &account)?;
            println!("account {} {}", account.name, outcome.as_str());
        }
        Commands::StoreGroup { domain, name, gid } => {
            let outcome = sysdb.store_group(&domain, &PosixGroupAttrs::new(&name, gid))?;
            println!("group {name} {}", outcome.as_str());
        }
        Commands::AddMember {
            domain,
            group,
            account,
        } => {
            let outcome = sysdb.add_account_to_group(&domain, &group, &account)?;
            println!("member {account} of {group} {}", outcome.as_str());
        }
        Commands::ShowGroup { domain, name, gid } => {
            let group = match (name, gid) {
                (Some(name), _) => sysdb.find_group_by_name(&domain, &name)?,
                (None, Some(gid)) => sysdb.find_group_by_gid(&domain, gid)?,
                (None, None) => bail!("either --name or --gid is required"),
            };
            println!("{}", serde_json::to_string_pretty(&group)?);
        }
        Commands::ShowAccount { domain, name } => {
            let account = sysdb.find_account_by_name(&domain, &name)?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        Commands::Scenario => {
            let report = scenario::run(&sysdb, DEFAULT_DOMAIN);
            for line in report.lines() {
                println!("{line}");
            }
            if !report.passed() {
                bail!("{} scenario check(s) failed", report.failures());
            }
        }
    }

    Ok(())
}
