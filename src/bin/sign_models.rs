//! Model signing utility for drugrisk model directories.
//!
//! Writes `manifest.json` (SHA-256 of every model artifact) and
//! `manifest.sig` (Ed25519 signature over the manifest bytes).
//!
//! # Usage
//!
//! ```bash
//! sign_models <model_dir>
//! sign_models --generate-seed <path> [--out-pub <path>] [--force]
//! ```
//!
//! The signing seed (base64, 32 bytes) is read from the file named by
//! `DRUGRISK_MODEL_SIGNING_KEY_B64_FILE`, or from
//! `DRUGRISK_MODEL_SIGNING_KEY_B64` in debug builds only.

use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use drugrisk::adapters::model_dir::{ModelManifest, MANIFEST_FILE, SIGNATURE_FILE};
use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const USAGE: &str = "Usage: sign_models <model_dir>
       sign_models --generate-seed <path> [--out-pub <path>] [--force]";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

enum Command {
    Sign(PathBuf),
    GenerateSeed {
        seed_path: PathBuf,
        pub_path: Option<PathBuf>,
        force: bool,
    },
}

fn next_path(args: &mut impl Iterator<Item = String>) -> Result<PathBuf> {
    args.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))
}

fn parse_args() -> Result<Command> {
    let mut args = env::args().skip(1);
    let mut model_dir = None;
    let mut seed_path = None;
    let mut pub_path = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--generate-seed" => seed_path = Some(next_path(&mut args)?),
            "--out-pub" => pub_path = Some(next_path(&mut args)?),
            "--force" => force = true,
            "-h" | "--help" => bail!(USAGE),
            _ if model_dir.is_none() && !arg.starts_with('-') => {
                model_dir = Some(PathBuf::from(arg));
            }
            _ => bail!("Unknown arg: {arg}\n{USAGE}"),
        }
    }

    match (model_dir, seed_path) {
        (None, Some(seed_path)) => Ok(Command::GenerateSeed {
            seed_path,
            pub_path,
            force,
        }),
        (Some(dir), None) => Ok(Command::Sign(dir)),
        _ => bail!(USAGE),
    }
}

fn read_signing_seed_b64() -> Result<Zeroizing<String>> {
    const KEY_FILE_ENV: &str = "DRUGRISK_MODEL_SIGNING_KEY_B64_FILE";

    if let Ok(path) = env::var(KEY_FILE_ENV) {
        let content = Zeroizing::new(
            fs::read_to_string(path.trim()).context("Failed reading signing key file")?,
        );
        let secret = content.trim_end_matches(['\n', '\r']).to_string();
        if secret.is_empty() {
            bail!("Empty signing key");
        }
        return Ok(Zeroizing::new(secret));
    }

    // Dev-only fallback.
    if cfg!(debug_assertions) {
        if let Ok(v) = env::var("DRUGRISK_MODEL_SIGNING_KEY_B64") {
            let secret = v.trim_end_matches(['\n', '\r']).to_string();
            if secret.is_empty() {
                bail!("Empty signing key");
            }
            return Ok(Zeroizing::new(secret));
        }
    }

    bail!("Missing signing key. Set {KEY_FILE_ENV} (env var fallback only in debug builds).")
}

fn read_signing_seed() -> Result<Seed> {
    let b64 = read_signing_seed_b64()?;
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(b64.trim())
            .context("Invalid base64 in signing key")?,
    );
    let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
        anyhow!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        )
    })?;
    Ok(Seed(bytes))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn sign(model_dir: &Path) -> Result<()> {
    let seed = read_signing_seed()?;
    let signing_key = SigningKey::from_bytes(&seed.0);

    let manifest = ModelManifest::build(model_dir, Some(unix_now()))?;
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;

    let manifest_path = model_dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {manifest_path:?}"))?;

    let sig: Signature = signing_key.sign(&manifest_bytes);
    let sig_path = model_dir.join(SIGNATURE_FILE);
    fs::write(&sig_path, sig.to_bytes()).with_context(|| format!("Failed to write {sig_path:?}"))?;

    println!("Signed {} artifact(s): {manifest_path:?}", manifest.files.len());
    println!("Wrote signature: {sig_path:?}");
    println!(
        "DRUGRISK_MODEL_SIGNING_PUBKEY_B64={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );
    Ok(())
}

fn write_secret(path: &Path, content: &[u8], force: bool) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create {path:?} (use --force to overwrite)"))?;
    std::io::Write::write_all(&mut file, content)?;
    Ok(())
}

fn generate_seed(seed_path: &Path, pub_path: Option<&Path>, force: bool) -> Result<()> {
    let mut seed = Seed([0u8; 32]);
    OsRng.fill_bytes(&mut seed.0);
    let verifying_key = SigningKey::from_bytes(&seed.0).verifying_key();

    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed.0));
    write_secret(seed_path, format!("{}\n", seed_b64.as_str()).as_bytes(), force)?;
    seed.zeroize();

    let pub_b64 = general_purpose::STANDARD.encode(verifying_key.as_bytes());
    if let Some(pub_path) = pub_path {
        fs::write(pub_path, format!("{pub_b64}\n"))
            .with_context(|| format!("Failed to write {pub_path:?}"))?;
    }

    println!("Wrote signing seed: {seed_path:?}");
    println!("DRUGRISK_MODEL_SIGNING_PUBKEY_B64={pub_b64}");
    Ok(())
}

fn main() -> Result<()> {
    match parse_args()? {
        Command::Sign(dir) => sign(&dir),
        Command::GenerateSeed {
            seed_path,
            pub_path,
            force,
        } => generate_seed(&seed_path, pub_path.as_deref(), force),
    }
}
