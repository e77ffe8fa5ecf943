use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use strum_macros::{AsRefStr, EnumString};
use thiserror::Error;

use crate::storage::{Fields, RecordKey, StorageResult};

use super::{parse_field, required_field};

/// Longest hostname accepted, per RFC 1035.
pub const MAX_DOMAIN_LENGTH: usize = 253;
const MAX_LABEL_LENGTH: usize = 63;
/// Hex characters kept from the SHA3 digest when deriving a domain id.
pub const DOMAIN_ID_LENGTH: usize = 20;
const TXT_HOST_PREFIX: &str = "_vanish-challenge-";

/// Public suffixes spanning two labels. Everything else is treated as a
/// single-label TLD.
const TWO_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.nz", "co.jp",
    "co.za", "com.br", "com.mx", "co.in", "com.cn",
];

/// Errors emitted when a user-supplied domain fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainFormatError {
    #[error("domain is empty")]
    Empty,
    #[error("domain exceeds {MAX_DOMAIN_LENGTH} characters")]
    TooLong,
    #[error("domain has no public suffix")]
    MissingSuffix,
    #[error("domain label `{0}` is invalid")]
    InvalidLabel(String),
    #[error("top-level domain `{0}` is invalid")]
    InvalidSuffix(String),
}

/// Normalized hostname split into its public-suffix parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayDomain {
    display: String,
    trd: String,
    sld: String,
    tld: String,
}

impl DisplayDomain {
    /// Accepts bare hostnames as well as pasted URLs (`https://x.y/path`).
    pub fn parse(input: &str) -> Result<Self, DomainFormatError> {
        let mut value = input.trim().to_ascii_lowercase();
        for scheme in ["https://", "http://"] {
            if let Some(rest) = value.strip_prefix(scheme) {
                value = rest.to_owned();
            }
        }
        if let Some(idx) = value.find(|c| matches!(c, '/' | '?' | '#')) {
            value.truncate(idx);
        }
        if let Some((host, port)) = value.rsplit_once(':') {
            if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
                value = host.to_owned();
            }
        }
        let value = value.trim_end_matches('.').to_owned();

        if value.is_empty() {
            return Err(DomainFormatError::Empty);
        }
        if value.len() > MAX_DOMAIN_LENGTH {
            return Err(DomainFormatError::TooLong);
        }

        let labels: Vec<&str> = value.split('.').collect();
        if labels.len() < 2 {
            return Err(DomainFormatError::MissingSuffix);
        }
        for label in &labels {
            validate_label(label)?;
        }

        let last = labels[labels.len() - 1];
        if last.len() < 2 || !last.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainFormatError::InvalidSuffix(last.to_owned()));
        }

        let candidate = labels[labels.len() - 2..].join(".");
        let suffix_labels = if TWO_LABEL_SUFFIXES.contains(&candidate.as_str()) {
            2
        } else {
            1
        };
        if labels.len() <= suffix_labels {
            return Err(DomainFormatError::MissingSuffix);
        }

        let sld_index = labels.len() - suffix_labels - 1;
        Ok(Self {
            trd: labels[..sld_index].join("."),
            sld: labels[sld_index].to_owned(),
            tld: labels[sld_index + 1..].join("."),
            display: value,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Registrable domain, e.g. `example.co.uk` for `www.example.co.uk`.
    pub fn base_domain(&self) -> String {
        format!("{}.{}", self.sld, self.tld)
    }

    pub fn trd(&self) -> &str {
        &self.trd
    }

    pub fn sld(&self) -> &str {
        &self.sld
    }

    pub fn tld(&self) -> &str {
        &self.tld
    }

    pub fn is_apex(&self) -> bool {
        self.trd.is_empty()
    }
}

fn validate_label(label: &str) -> Result<(), DomainFormatError> {
    let valid = !label.is_empty()
        && label.len() <= MAX_LABEL_LENGTH
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DomainFormatError::InvalidLabel(label.to_owned()))
    }
}

/// Deterministically derives the id of a domain claimed by a customer.
pub fn derive_domain_id(display_domain: &str, custid: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(display_domain.as_bytes());
    hasher.update(b":");
    hasher.update(custid.as_bytes());
    let digest = hex_encode(hasher.finalize());
    digest[..DOMAIN_ID_LENGTH].to_string()
}

/// Generates the random value a customer publishes in the TXT record.
pub fn generate_validation_value() -> Result<String, getrandom::Error> {
    let mut buf = [0u8; 16];
    getrandom::fill(&mut buf)?;
    Ok(hex_encode(buf))
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationState {
    #[default]
    Unverified,
    Pending,
    Verified,
}

/// A hostname a customer points at the service to serve branded secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDomain {
    pub domainid: String,
    pub display_domain: String,
    pub custid: String,
    pub base_domain: String,
    pub trd: String,
    pub sld: String,
    pub tld: String,
    pub is_apex: bool,
    pub txt_validation_host: String,
    pub txt_validation_value: String,
    pub verification: VerificationState,
    pub verified: bool,
    pub created: i64,
    pub updated: i64,
}

impl CustomDomain {
    pub fn new(
        domain: &DisplayDomain,
        custid: &str,
        txt_validation_value: String,
        now: DateTime<Utc>,
    ) -> Self {
        let domainid = derive_domain_id(domain.as_str(), custid);
        let txt_validation_host = format!("{TXT_HOST_PREFIX}{}", &domainid[..7]);
        Self {
            display_domain: domain.as_str().to_owned(),
            custid: custid.to_owned(),
            base_domain: domain.base_domain(),
            trd: domain.trd().to_owned(),
            sld: domain.sld().to_owned(),
            tld: domain.tld().to_owned(),
            is_apex: domain.is_apex(),
            txt_validation_host,
            txt_validation_value,
            verification: VerificationState::Unverified,
            verified: false,
            created: now.timestamp(),
            updated: now.timestamp(),
            domainid,
        }
    }

    pub fn object_key(domainid: &str) -> RecordKey {
        RecordKey::from_parts(["custom_domain", domainid, "object"])
    }

    pub fn brand_key(domainid: &str) -> RecordKey {
        RecordKey::from_parts(["custom_domain", domainid, "brand"])
    }

    pub fn logo_key(domainid: &str) -> RecordKey {
        RecordKey::from_parts(["custom_domain", domainid, "logo"])
    }

    /// Per-customer index: display domain -> domain id.
    pub fn customer_index_key(custid: &str) -> RecordKey {
        RecordKey::from_parts(["customer", custid, "custom_domains"])
    }

    /// Global index: display domain -> owning customer.
    pub fn owners_key() -> RecordKey {
        RecordKey::from_parts(["custom_domain", "owners"])
    }

    /// Name the TXT record must be published under.
    pub fn validation_fqdn(&self) -> String {
        format!("{}.{}", self.txt_validation_host, self.display_domain)
    }

    pub fn record_verification(&mut self, verified: bool, now: DateTime<Utc>) {
        self.verified = verified;
        self.verification = if verified {
            VerificationState::Verified
        } else {
            VerificationState::Pending
        };
        self.updated = now.timestamp();
    }

    pub fn to_fields(&self) -> Fields {
        Fields::from([
            ("domainid".to_string(), self.domainid.clone()),
            ("display_domain".to_string(), self.display_domain.clone()),
            ("custid".to_string(), self.custid.clone()),
            ("base_domain".to_string(), self.base_domain.clone()),
            ("trd".to_string(), self.trd.clone()),
            ("sld".to_string(), self.sld.clone()),
            ("tld".to_string(), self.tld.clone()),
            ("is_apex".to_string(), self.is_apex.to_string()),
            (
                "txt_validation_host".to_string(),
                self.txt_validation_host.clone(),
            ),
            (
                "txt_validation_value".to_string(),
                self.txt_validation_value.clone(),
            ),
            (
                "verification".to_string(),
                self.verification.as_ref().to_string(),
            ),
            ("verified".to_string(), self.verified.to_string()),
            ("created".to_string(), self.created.to_string()),
            ("updated".to_string(), self.updated.to_string()),
        ])
    }

    pub fn from_fields(fields: &Fields) -> StorageResult<Self> {
        Ok(Self {
            domainid: required_field(fields, "domainid")?.to_owned(),
            display_domain: required_field(fields, "display_domain")?.to_owned(),
            custid: required_field(fields, "custid")?.to_owned(),
            base_domain: required_field(fields, "base_domain")?.to_owned(),
            trd: fields.get("trd").cloned().unwrap_or_default(),
            sld: required_field(fields, "sld")?.to_owned(),
            tld: required_field(fields, "tld")?.to_owned(),
            is_apex: parse_field(fields, "is_apex")?,
            txt_validation_host: required_field(fields, "txt_validation_host")?.to_owned(),
            txt_validation_value: required_field(fields, "txt_validation_value")?.to_owned(),
            verification: parse_field(fields, "verification")?,
            verified: parse_field(fields, "verified")?,
            created: parse_field(fields, "created")?,
            updated: parse_field(fields, "updated")?,
        })
    }
}
