//! Decrypt MIoT cloud RC4 payloads.
//!
//! Cloud API responses flagged `miot-encrypt-algorithm: ENCRYPT-RC4`
//! carry base64 RC4 ciphertext with the first 1024 keystream bytes
//! dropped; the key is `sha256(ssecurity ‖ nonce)`, both values base64
//! from the login exchange. Reads the ciphertext from `--cipher` or
//! stdin and prints the plaintext, pretty-printed when it parses as
//! JSON.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use clap::Parser;
use rc4::{consts::U32, KeyInit, Rc4, StreamCipher};
use sha2::{Digest, Sha256};

#[derive(Parser)]
#[command(
    about = "Decrypt MIoT RC4 payloads (miot-encrypt-algorithm: ENCRYPT-RC4)"
)]
struct Args {
    /// Base64 ssecurity from the cloud login
    #[arg(long)]
    ssecurity: String,

    /// Base64 _nonce from the request
    #[arg(long)]
    nonce: String,

    /// Base64 response body; read from stdin when omitted
    #[arg(long)]
    cipher: Option<String>,

    /// Write raw plaintext to a file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let cipher_b64 = match args.cipher {
        Some(cipher) => cipher,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading ciphertext from stdin")?;
            buf
        }
    };

    let key = derive_key(
        &decode_b64(&args.ssecurity).context("decoding ssecurity")?,
        &decode_b64(&args.nonce).context("decoding nonce")?,
    );
    let mut plaintext =
        decode_b64(&cipher_b64).context("decoding ciphertext")?;
    rc4_drop1024(&key, &mut plaintext);

    match args.out {
        Some(path) => {
            std::fs::write(&path, &plaintext)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote plaintext to {}", path.display());
        }
        None => println!("{}", render(&plaintext)),
    }

    Ok(())
}

/// RC4 key for a response: `sha256(ssecurity ‖ nonce)`.
fn derive_key(ssecurity: &[u8], nonce: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(ssecurity);
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Apply RC4 with the first 1024 keystream bytes dropped. RC4 is an
/// involution: the same operation encrypts and decrypts.
fn rc4_drop1024(key: &[u8; 32], data: &mut [u8]) {
    let mut rc4 = Rc4::<U32>::new(key.into());
    let mut skip = [0u8; 1024];
    rc4.apply_keystream(&mut skip);
    rc4.apply_keystream(data);
}

/// Base64 decode tolerating missing padding, stray whitespace, and the
/// URL-safe alphabet, all of which the cloud emits.
fn decode_b64(raw: &str) -> Result<Vec<u8>> {
    let mut normalized: String = raw.split_whitespace().collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    if let Ok(bytes) = STANDARD.decode(&normalized) {
        return Ok(bytes);
    }
    URL_SAFE
        .decode(&normalized)
        .context("input is not valid base64")
}

/// Pretty-print JSON plaintext; fall back to plain text, then hex.
fn render(plaintext: &[u8]) -> String {
    let Ok(text) = std::str::from_utf8(plaintext) else {
        return format!(
            "<{} bytes (non-UTF8)>\n{}",
            plaintext.len(),
            hex::encode(plaintext)
        );
    };
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| text.to_string()),
        Err(_) => text.to_string(),
    }
}
