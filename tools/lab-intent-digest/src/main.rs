//! Offline helper for intent hashing: reproduces the relay's payload hashes,
//! EIP-712 digests, reservation keys and signatures so integrators can check
//! their own encoders against them.

mod digest;


use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lab_intent_types::{wide, IntentDomain, IntentKind, IntentMeta};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print `hashStruct` of an action or reservation payload.
    PayloadHash {
        #[arg(long, value_enum)]
        kind: Kind,
        /// JSON file holding the payload; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print the domain separator, meta struct hash and signing digest of an intent meta.
    MetaDigest {
        #[command(flatten)]
        domain: DomainArgs,
        /// JSON file holding the meta; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print `keccak256(abi.encodePacked(labId, executor, start))`.
    ReservationKey {
        /// Decimal or 0x-hex lab id.
        #[arg(long)]
        lab_id: String,
        #[arg(long)]
        executor: Address,
        #[arg(long)]
        start: u32,
    },
    /// Sign an intent meta's digest with a relay key.
    Sign {
        #[command(flatten)]
        domain: DomainArgs,
        #[arg(long, env = "LAB_INTENT_SIGNER_KEY", hide_env_values = true)]
        private_key: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Action,
    Reservation,
}

impl From<Kind> for IntentKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Action => IntentKind::Action,
            Kind::Reservation => IntentKind::Reservation,
        }
    }
}

#[derive(Args, Debug)]
struct DomainArgs {
    #[arg(long, default_value = "LabMarketplaceIntents")]
    domain_name: String,
    #[arg(long, default_value = "1")]
    domain_version: String,
    #[arg(long)]
    chain_id: u64,
    /// Registry address (EIP-712 verifying contract).
    #[arg(long)]
    contract: Address,
}

impl DomainArgs {
    fn domain(&self) -> IntentDomain {
        IntentDomain {
            name: self.domain_name.clone(),
            version: self.domain_version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.contract,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = run(cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run(command: Command) -> Result<Value> {
    match command {
        Command::PayloadHash { kind, file } => {
            let payload = read_json(file)?;
            let hash = digest::payload_hash(kind.into(), &payload)?;
            Ok(json!({ "payloadHash": hash }))
        }
        Command::MetaDigest { domain, file } => {
            let meta = read_meta(file)?;
            let d = digest::meta_digest(&domain.domain(), &meta)?;
            Ok(json!({
                "domainSeparator": d.domain_separator,
                "structHash": d.struct_hash,
                "digest": d.digest,
            }))
        }
        Command::ReservationKey { lab_id, executor, start } => {
            let lab_id: U256 = wide::parse_str(&lab_id)
                .map_err(|e| anyhow!("invalid lab id: {e}"))?;
            let key = digest::reservation_key(lab_id, executor, start)?;
            Ok(json!({ "reservationKey": key }))
        }
        Command::Sign { domain, private_key, file } => {
            let meta = read_meta(file)?;
            let key = digest::parse_signing_key(&private_key).context("invalid private key")?;
            let signer = digest::address_of(key.verifying_key());
            if meta.signer != signer {
                return Err(anyhow!("meta names signer {} but the key belongs to {}", meta.signer, signer));
            }
            let d = digest::meta_digest(&domain.domain(), &meta)?;
            let signature = digest::sign_digest(&key, d.digest)?;
            let recovered = digest::recover(d.digest, &signature)?;
            if recovered != signer {
                return Err(anyhow!("signature recovers to {recovered}, expected {signer}"));
            }
            Ok(json!({
                "digest": d.digest,
                "signer": signer,
                "signature": format!("0x{}", hex::encode(signature)),
            }))
        }
    }
}

fn read_json(file: Option<PathBuf>) -> Result<Value> {
    let raw = match file {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}

fn read_meta(file: Option<PathBuf>) -> Result<IntentMeta> {
    let value = read_json(file)?;
    // Accept either a bare meta or a prepared envelope carrying one.
    let meta = value.get("meta").cloned().unwrap_or(value);
    serde_json::from_value(meta).context("input is not an intent meta")
}
