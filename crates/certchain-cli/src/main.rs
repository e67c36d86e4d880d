use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

mod api;
mod keystore;

use keystore::Keystore;

#[derive(Parser)]
#[command(name = "certchain")]
#[command(about = "Certchain CLI - hash artifacts, manage a signer wallet and verify certificates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SHA-256 content hash of a file
    Hash {
        /// Path to the artifact
        file: PathBuf,
    },

    /// Manage the local signer wallet
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },

    /// Check whether a file's hash is anchored on the ledger
    Verify {
        /// Path to the artifact
        file: PathBuf,

        /// Server base URL
        #[arg(long, env = "CERTCHAIN_SERVER", default_value = "http://localhost:3000")]
        server: String,
    },

    /// Show the public ledger status of a certificate
    Status {
        /// Certificate id
        id: String,

        /// Server base URL
        #[arg(long, env = "CERTCHAIN_SERVER", default_value = "http://localhost:3000")]
        server: String,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Generate a new Ed25519 signer and store it encrypted
    New {
        /// Replace an existing wallet
        #[arg(long)]
        force: bool,

        /// Wallet directory (default: ~/.certchain/wallet)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print the wallet address
    Show {
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Decrypt and print the signer secret for use as `signerSecret`
    ExportSecret {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Hash { file } => cmd_hash(&file),
        Commands::Wallet { command } => match command {
            WalletCommands::New { force, dir } => cmd_wallet_new(dir, force),
            WalletCommands::Show { dir } => cmd_wallet_show(dir),
            WalletCommands::ExportSecret { dir } => cmd_wallet_export(dir),
        },
        Commands::Verify { file, server } => cmd_verify(&file, &server),
        Commands::Status { id, server } => cmd_status(&id, &server),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn keystore_at(dir: Option<PathBuf>) -> Result<Keystore> {
    match dir {
        Some(dir) => Ok(Keystore::at(dir)),
        None => Keystore::default_location(),
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(certchain_crypto::sha256_reader(BufReader::new(file))?)
}

fn cmd_hash(file: &Path) -> Result<()> {
    println!("{}", hash_file(file)?);
    Ok(())
}

fn cmd_wallet_new(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let keystore = keystore_at(dir)?;
    let passphrase = keystore::prompt_new_passphrase()?;
    let address = keystore.create(&passphrase, force)?;

    println!("{} Wallet created", "✓".green().bold());
    println!("  Address: {}", address.cyan());
    println!("  Stored in: {}", keystore.dir().display());
    Ok(())
}

fn cmd_wallet_show(dir: Option<PathBuf>) -> Result<()> {
    let keystore = keystore_at(dir)?;
    println!("{}", keystore.address()?);
    Ok(())
}

fn cmd_wallet_export(dir: Option<PathBuf>) -> Result<()> {
    let keystore = keystore_at(dir)?;
    let passphrase = keystore::prompt_passphrase()?;
    let key = keystore.signing_key(&passphrase)?;
    println!("{}", certchain_crypto::signing_key_to_hex(&key));
    Ok(())
}

fn cmd_verify(file: &Path, server: &str) -> Result<()> {
    let hash = hash_file(file)?;
    let document = api::Client::new(server).verify_hash(&hash)?.document;

    match document {
        Some(doc) => {
            println!("{} Anchored on ledger", "✓".green().bold());
            println!("  Hash: {}", hash);
            if let Some(name) = doc.get("name").and_then(|v| v.as_str()) {
                println!("  Name: {}", name);
            }
        }
        None => {
            println!("{} Not anchored", "✗".red().bold());
            println!("  Hash: {}", hash);
        }
    }
    Ok(())
}

fn cmd_status(id: &str, server: &str) -> Result<()> {
    uuid::Uuid::parse_str(id).with_context(|| format!("'{}' is not a certificate id", id))?;
    let verification = api::Client::new(server).certificate_status(id)?;
    let cert = &verification.certificate;
    let chain = &verification.chain;

    let status = match cert.status.as_str() {
        "validated" => cert.status.green().bold(),
        "issued" => cert.status.cyan().bold(),
        "requested" => cert.status.yellow().bold(),
        _ => cert.status.red().bold(),
    };

    println!("{} ({})", cert.certificate_name.bold(), cert.id);
    println!("  Subject:  {}", cert.subject);
    println!("  Status:   {}", status);
    println!("  Hash:     {}", cert.metadata_hash);
    if let Some(expiry) = &cert.expiry_at {
        println!("  Expires:  {}", expiry);
    }
    println!("  Network:  {}", chain.network);
    if let Some(contract) = &chain.contract_id {
        println!("  Contract: {}", contract);
    }
    println!("  Anchor:   {}", chain.on_chain_id.as_deref().unwrap_or("-"));
    println!("  Issue tx: {}", chain.tx_hash_issue.as_deref().unwrap_or("-"));
    println!("  Validate tx: {}", chain.tx_hash_validate.as_deref().unwrap_or("-"));
    Ok(())
}
