//! Response signing.
//!
//! A [`Signer`] attached to the renderer signs every JSON response. The
//! signature, nonce and timestamp are computed once per response and sent as
//! the `NF-Signature`, `NF-Nonce` and `NF-Timestamp` headers before the body.
//!
//! [`Sha256Signer`] hashes twice:
//!
//! ```text
//! body_hash = hex(sha256(body))
//! signature = hex(sha256(host \n method \n path \n body_hash \n nonce \n timestamp \n secret))
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use ulid::Ulid;

use crate::crypto::sha256_hex;

pub const NONCE_HEADER: &str = "NF-Nonce";
pub const TIMESTAMP_HEADER: &str = "NF-Timestamp";
pub const SIGNATURE_HEADER: &str = "NF-Signature";

/// What a response signature covers.
#[derive(Debug, Clone, Copy)]
pub struct SignContext<'a> {
    pub host: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub nonce: String,
    pub timestamp: u64,
    pub signature: String,
}

impl Signature {
    /// Header name/value pairs in emission order.
    #[must_use]
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (NONCE_HEADER, self.nonce.clone()),
            (TIMESTAMP_HEADER, self.timestamp.to_string()),
            (SIGNATURE_HEADER, self.signature.clone()),
        ]
    }
}

pub trait Signer: Send + Sync {
    fn sign(&self, ctx: &SignContext<'_>) -> Signature;
}

#[derive(Clone)]
pub struct Sha256Signer {
    secret: String,
}

impl std::fmt::Debug for Sha256Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sha256Signer").finish_non_exhaustive()
    }
}

impl Sha256Signer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Deterministic part of signing, exposed for clients that verify.
    #[must_use]
    pub fn compute(&self, ctx: &SignContext<'_>, nonce: &str, timestamp: u64) -> String {
        let body_hash = sha256_hex(ctx.body);
        let payload = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}",
            ctx.host, ctx.method, ctx.path, body_hash, nonce, timestamp, self.secret
        );
        sha256_hex(payload.as_bytes())
    }

    #[must_use]
    pub fn verify(&self, ctx: &SignContext<'_>, sig: &Signature) -> bool {
        self.compute(ctx, &sig.nonce, sig.timestamp) == sig.signature
    }
}

impl Signer for Sha256Signer {
    fn sign(&self, ctx: &SignContext<'_>) -> Signature {
        let nonce = Ulid::new().to_string();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let signature = self.compute(ctx, &nonce, timestamp);
        Signature {
            nonce,
            timestamp,
            signature,
        }
    }
}
