//! Proof-of-work challenges compatible with the ALTCHA widget.
//!
//! A challenge is `hex(sha256(salt || number))` for a secret number below
//! `maxnumber`, signed with HMAC-SHA256 so the server stays stateless. The
//! browser brute-forces `number` and posts back a base64 JSON solution.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "SHA-256";
const SALT_BYTES: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticityError {
    #[error("payload is not valid base64 JSON")]
    MalformedPayload,
    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("challenge does not match the solution")]
    ChallengeMismatch,
    #[error("signature does not match the challenge")]
    InvalidSignature,
    #[error("challenge expired")]
    Expired,
    #[error("secret key rejected by HMAC")]
    InvalidKey,
    #[error("random source unavailable: {0}")]
    Random(String),
}

/// Challenge handed to the browser widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub algorithm: String,
    pub challenge: String,
    pub maxnumber: u64,
    pub salt: String,
    pub signature: String,
}

/// Solution posted back as `authenticity_payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub algorithm: String,
    pub challenge: String,
    pub number: u64,
    pub salt: String,
    pub signature: String,
}

pub fn hash_challenge(salt: &str, number: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(number.to_string().as_bytes());
    hex_encode(hasher.finalize())
}

pub fn sign_challenge(secret: &str, challenge: &str) -> Result<String, AuthenticityError> {
    let mac = keyed_mac(secret, challenge)?;
    Ok(hex_encode(mac.finalize().into_bytes()))
}

fn keyed_mac(secret: &str, challenge: &str) -> Result<HmacSha256, AuthenticityError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthenticityError::InvalidKey)?;
    mac.update(challenge.as_bytes());
    Ok(mac)
}

/// Issues a fresh challenge. With `expires` set the salt carries an
/// `expires=<unix>` parameter that verification enforces.
pub fn create_challenge(
    secret: &str,
    max_number: u64,
    expires: Option<DateTime<Utc>>,
) -> Result<Challenge, AuthenticityError> {
    let mut salt_bytes = [0u8; SALT_BYTES];
    getrandom::fill(&mut salt_bytes).map_err(|err| AuthenticityError::Random(err.to_string()))?;
    let mut number_bytes = [0u8; 8];
    getrandom::fill(&mut number_bytes).map_err(|err| AuthenticityError::Random(err.to_string()))?;

    let mut salt = hex_encode(salt_bytes);
    if let Some(expires) = expires {
        salt.push_str(&format!("?expires={}", expires.timestamp()));
    }
    let max_number = max_number.max(1);
    let raw = u64::from_le_bytes(number_bytes);
    // At u64::MAX every draw is already within `0..=max_number`.
    let number = max_number.checked_add(1).map_or(raw, |bound| raw % bound);
    let challenge = hash_challenge(&salt, number);
    let signature = sign_challenge(secret, &challenge)?;

    Ok(Challenge {
        algorithm: ALGORITHM.to_string(),
        challenge,
        maxnumber: max_number,
        salt,
        signature,
    })
}

pub fn encode_solution(solution: &Solution) -> String {
    let json = serde_json::to_vec(solution).unwrap_or_default();
    general_purpose::STANDARD.encode(json)
}

pub fn decode_solution(payload: &str) -> Result<Solution, AuthenticityError> {
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| AuthenticityError::MalformedPayload)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthenticityError::MalformedPayload)
}

/// Checks a base64 JSON solution against `secret`.
pub fn verify_solution(
    payload: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<Solution, AuthenticityError> {
    let solution = decode_solution(payload)?;

    if solution.algorithm != ALGORITHM {
        return Err(AuthenticityError::UnsupportedAlgorithm(solution.algorithm));
    }
    if let Some(expires) = salt_expiry(&solution.salt) {
        if now.timestamp() > expires {
            return Err(AuthenticityError::Expired);
        }
    }
    if hash_challenge(&solution.salt, solution.number) != solution.challenge {
        return Err(AuthenticityError::ChallengeMismatch);
    }

    let signature =
        hex::decode(&solution.signature).map_err(|_| AuthenticityError::InvalidSignature)?;
    keyed_mac(secret, &solution.challenge)?
        .verify_slice(&signature)
        .map_err(|_| AuthenticityError::InvalidSignature)?;

    Ok(solution)
}

fn salt_expiry(salt: &str) -> Option<i64> {
    let (_, query) = salt.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "expires")
        .and_then(|(_, value)| value.parse().ok())
}
