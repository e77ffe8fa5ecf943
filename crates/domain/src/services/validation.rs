//! TXT record lookups used to prove control over a custom domain.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// DNS record type number for TXT.
const TXT_RECORD_TYPE: u16 = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("dns lookup failed: {0}")]
    Lookup(String),
    #[error("dns response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ValidationError {
    fn from(value: reqwest::Error) -> Self {
        Self::Lookup(value.to_string())
    }
}

/// Source of TXT records for a host name.
#[async_trait]
pub trait DomainValidator: Send + Sync {
    async fn txt_records(&self, host: &str) -> Result<Vec<String>, ValidationError>;

    /// True when any TXT record at `host` equals `expected`.
    async fn has_txt_value(&self, host: &str, expected: &str) -> Result<bool, ValidationError> {
        let records = self.txt_records(host).await?;
        Ok(records.iter().any(|record| record.trim() == expected))
    }
}

/// Resolves TXT records through a DNS-over-HTTPS JSON endpoint.
#[derive(Debug, Clone)]
pub struct DohValidator {
    client: reqwest::Client,
    endpoint: String,
}

impl DohValidator {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(endpoint: impl Into<String>) -> Result<Self, ValidationError> {
        let client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default)]
    status: u16,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

#[async_trait]
impl DomainValidator for DohValidator {
    async fn txt_records(&self, host: &str) -> Result<Vec<String>, ValidationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", host), ("type", "TXT")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let records = parse_doh_body(&body)?;
        debug!(host, found = records.len(), "resolved txt records");
        Ok(records)
    }
}

/// Extracts TXT payloads from a DoH JSON body. NXDOMAIN yields no records.
pub fn parse_doh_body(body: &str) -> Result<Vec<String>, ValidationError> {
    let parsed: DohResponse =
        serde_json::from_str(body).map_err(|err| ValidationError::Decode(err.to_string()))?;
    if parsed.status != 0 && parsed.status != 3 {
        return Err(ValidationError::Lookup(format!(
            "resolver returned status {}",
            parsed.status
        )));
    }
    Ok(parsed
        .answer
        .into_iter()
        .filter(|answer| answer.record_type == TXT_RECORD_TYPE)
        .map(|answer| parse_txt_data(&answer.data))
        .collect())
}

/// Joins the quoted character-strings of a TXT rdata value.
pub fn parse_txt_data(data: &str) -> String {
    let trimmed = data.trim();
    if !trimmed.starts_with('"') {
        return trimmed.to_string();
    }

    let mut joined = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in trimmed.chars() {
        match (in_quotes, escaped, c) {
            (true, true, _) => {
                joined.push(c);
                escaped = false;
            }
            (true, false, '\\') => escaped = true,
            (_, false, '"') => in_quotes = !in_quotes,
            (true, false, _) => joined.push(c),
            (false, _, _) => {}
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_segments() {
        assert_eq!(parse_txt_data("\"abc\""), "abc");
        assert_eq!(parse_txt_data("\"abc\" \"def\""), "abcdef");
        assert_eq!(parse_txt_data("\"say \\\"hi\\\"\""), "say \"hi\"");
        assert_eq!(parse_txt_data("bare-value"), "bare-value");
    }

    #[test]
    fn extracts_txt_answers_only() {
        let body = r#"{
            "Status": 0,
            "Answer": [
                {"name": "_vanish-challenge-abc.example.com.", "type": 5, "TTL": 60, "data": "target.example.net."},
                {"name": "_vanish-challenge-abc.example.com.", "type": 16, "TTL": 60, "data": "\"deadbeef\""}
            ]
        }"#;
        assert_eq!(parse_doh_body(body).unwrap(), vec!["deadbeef".to_string()]);
    }

    #[test]
    fn nxdomain_yields_nothing() {
        assert!(parse_doh_body(r#"{"Status": 3}"#).unwrap().is_empty());
        assert!(matches!(
            parse_doh_body(r#"{"Status": 2}"#),
            Err(ValidationError::Lookup(_))
        ));
        assert!(matches!(
            parse_doh_body("<html>"),
            Err(ValidationError::Decode(_))
        ));
    }

    struct FixedRecords(Vec<String>);

    #[async_trait]
    impl DomainValidator for FixedRecords {
        async fn txt_records(&self, _host: &str) -> Result<Vec<String>, ValidationError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn matches_expected_value() {
        let validator = FixedRecords(vec!["other".into(), " token ".into()]);
        assert!(validator.has_txt_value("h", "token").await.unwrap());
        assert!(!validator.has_txt_value("h", "missing").await.unwrap());
    }
}
