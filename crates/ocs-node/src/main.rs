//! OCS Node CLI
//!
//! Command-line interface for on-chain secrets:
//! - Dealing key shares to a group of nodes
//! - Writing a document protected by the group key
//! - Reading it back through threshold re-encryption

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ocs_core::{
    decode_key, deal, document, encode_key, recover_commit, CommitmentPolynomial, DistKeyShare,
    EncodedKey, KeyPair, LocalCluster, NodeConfig, PayloadPresent, ReencryptionRequest, Topology,
    DEFAULT_BRANCHING,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

/// OCS Node - on-chain secrets reader and writer
#[derive(Parser)]
#[command(name = "ocs-node")]
#[command(about = "Threshold re-encryption of document keys")]
#[command(version)]
struct Cli {
    /// Data directory for shares and keys
    #[arg(short, long, env = "DEST", default_value = "./data")]
    dest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deal key shares to a new group
    Deal {
        /// Number of nodes
        #[arg(short, long)]
        n: usize,

        /// Shares needed to read (t-of-n)
        #[arg(short, long)]
        t: usize,
    },

    /// Create the reader key pair
    Keypair,

    /// Seal a document and encode its key to the group
    Write {
        /// Plaintext document
        #[arg(short, long)]
        input: PathBuf,

        /// Record to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Recover a document through re-encryption
    Read {
        /// Record produced by `write`
        #[arg(short, long)]
        record: PathBuf,

        /// Where to write the plaintext
        #[arg(short, long)]
        out: PathBuf,

        /// Children per tree node
        #[arg(short, long, default_value_t = DEFAULT_BRANCHING)]
        branching: usize,

        /// Nodes to take offline (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        pause: Vec<usize>,

        /// Payload handed to the verification policy (hex encoded)
        #[arg(short, long)]
        verification_data: Option<String>,

        /// Per-level wait for child replies
        #[arg(long, env = "CHILD_WAIT_MS", default_value_t = 1000)]
        child_wait_ms: u64,

        /// Overall deadline for the run
        #[arg(long, env = "TIMEOUT_MS", default_value_t = 10_000)]
        timeout_ms: u64,
    },

    /// Show group info
    Info,
}

/// What `write` produces and `read` consumes
#[derive(Serialize, Deserialize)]
struct Record {
    encoded_key: EncodedKey,
    /// Sealed document (hex encoded)
    sealed: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.dest)?;

    match cli.command {
        Commands::Deal { n, t } => {
            run_deal(&cli, n, t)?;
        }
        Commands::Keypair => {
            run_keypair(&cli)?;
        }
        Commands::Write {
            ref input,
            ref output,
        } => {
            run_write(&cli, input, output)?;
        }
        Commands::Read {
            ref record,
            ref out,
            branching,
            ref pause,
            ref verification_data,
            child_wait_ms,
            timeout_ms,
        } => {
            let verification_data = verification_data
                .as_deref()
                .map(hex::decode)
                .transpose()
                .context("verification data must be hex")?;
            let options = ReadOptions {
                branching,
                pause: pause.clone(),
                verification_data,
                child_wait: Duration::from_millis(child_wait_ms),
                timeout: Duration::from_millis(timeout_ms),
            };
            run_read(&cli, record, out, options).await?;
        }
        Commands::Info => {
            show_info(&cli)?;
        }
    }

    Ok(())
}

fn run_deal(cli: &Cli, n: usize, t: usize) -> Result<()> {
    info!(nodes = n, threshold = t, "Dealing shares");

    let (poly, shares) = deal(n, t)?;

    for share in &shares {
        save_json(&share_path(cli, share.index), share)?;
    }
    save_json(&cli.dest.join("poly.json"), &poly)?;

    let public_key = hex::encode(ocs_core::types::point_to_bytes(&poly.public_key()));
    info!(public_key = %public_key, path = ?cli.dest, "Shares saved");

    println!("Group Public Key: {}", public_key);

    Ok(())
}

fn run_keypair(cli: &Cli) -> Result<()> {
    let reader = KeyPair::random();
    let path = cli.dest.join("reader.json");
    save_json(&path, &reader)?;

    let public_key = hex::encode(ocs_core::types::point_to_bytes(&reader.public));
    info!(public_key = %public_key, path = ?path, "Reader key pair saved");

    println!("Reader Public Key: {}", public_key);

    Ok(())
}

fn run_write(cli: &Cli, input: &Path, output: &Path) -> Result<()> {
    let poly: CommitmentPolynomial = load_json(&cli.dest.join("poly.json"))?;
    let plaintext =
        std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;

    let document_key = document::generate_document_key();
    let sealed = document::seal(&document_key, &plaintext)?;
    let encoded_key = encode_key(&poly.public_key(), &document_key)?;

    let record = Record {
        encoded_key,
        sealed: hex::encode(sealed),
    };
    save_json(output, &record)?;

    info!(bytes = plaintext.len(), path = ?output, "Document written");

    Ok(())
}

struct ReadOptions {
    branching: usize,
    pause: Vec<usize>,
    verification_data: Option<Vec<u8>>,
    child_wait: Duration,
    timeout: Duration,
}

async fn run_read(cli: &Cli, record: &Path, out: &Path, options: ReadOptions) -> Result<()> {
    let poly: CommitmentPolynomial = load_json(&cli.dest.join("poly.json"))?;
    let reader: KeyPair = load_json(&cli.dest.join("reader.json"))?;
    let record: Record = load_json(record)?;
    let shares = load_shares(cli)?;

    let topology = Topology::with_branching(shares.len(), options.branching)?;
    let config = NodeConfig::new(options.child_wait)?;
    let cluster = LocalCluster::spawn(shares, topology, Arc::new(PayloadPresent), config)?;
    for &index in &options.pause {
        cluster.pause(index);
    }

    info!(
        nodes = cluster.len(),
        threshold = poly.threshold(),
        paused = ?options.pause,
        "Starting read"
    );

    let request = ReencryptionRequest::new(
        &record.encoded_key,
        reader.public,
        poly.clone(),
        options.verification_data,
    );
    let handle = cluster.root().start_reencryption(request)?;
    let partials = handle.wait_for_shares(options.timeout).await?;

    let xhat_enc = recover_commit(&partials, poly.threshold())?;
    let document_key = decode_key(
        &poly.public_key(),
        &record.encoded_key.c,
        &xhat_enc,
        &reader.secret,
    )?;

    let sealed = hex::decode(&record.sealed).context("sealed document must be hex")?;
    let plaintext = document::open(&document_key, &sealed)?;
    std::fs::write(out, &plaintext)
        .with_context(|| format!("failed to write {}", out.display()))?;

    info!(
        shares = partials.len(),
        bytes = plaintext.len(),
        path = ?out,
        "Document recovered"
    );

    Ok(())
}

fn show_info(cli: &Cli) -> Result<()> {
    let poly: CommitmentPolynomial = load_json(&cli.dest.join("poly.json"))?;
    let shares = load_shares(cli)?;

    println!("Group Info:");
    println!("  Nodes: {}", shares.len());
    println!("  Threshold: {}", poly.threshold());
    println!(
        "  Public Key: {}",
        hex::encode(ocs_core::types::point_to_bytes(&poly.public_key()))
    );

    let reader_path = cli.dest.join("reader.json");
    if reader_path.exists() {
        let reader: KeyPair = load_json(&reader_path)?;
        println!(
            "  Reader Public Key: {}",
            hex::encode(ocs_core::types::point_to_bytes(&reader.public))
        );
    }

    Ok(())
}

fn share_path(cli: &Cli, index: usize) -> PathBuf {
    cli.dest.join(format!("share.{}.json", index))
}

/// Shares `share.0.json`, `share.1.json`, ... up to the first gap
fn load_shares(cli: &Cli) -> Result<Vec<DistKeyShare>> {
    let mut shares = Vec::new();
    loop {
        let path = share_path(cli, shares.len());
        if !path.exists() {
            break;
        }
        shares.push(load_json(&path)?);
    }

    if shares.is_empty() {
        bail!("no shares found in {}, run `deal` first", cli.dest.display());
    }
    Ok(shares)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(value)
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
