use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{generate_validation_value, truncate_chars, CustomDomain, DisplayDomain};
use crate::services::rate_limit::RateBucket;

use super::{lookup_name, to_value, Logic, LogicContext, LogicError, SuccessData};

/// Input longer than this cannot be a hostname, so it is cut before parsing.
const MAX_INPUT_LENGTH: usize = 512;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainParams {
    pub domain: String,
}

/// Looks up a domain owned by the calling customer.
pub(crate) async fn owned_domain(
    ctx: &LogicContext<'_>,
    raw: &str,
) -> Result<CustomDomain, LogicError> {
    let custid = ctx.require_customer()?;
    ctx.domains()
        .find(custid, &lookup_name(raw))
        .await?
        .ok_or_else(|| LogicError::NotFound("Domain not found".to_string()))
}

pub struct AddDomain {
    input: String,
    parsed: Option<DisplayDomain>,
    domain: Option<CustomDomain>,
}

impl AddDomain {
    pub fn new(params: DomainParams) -> Self {
        Self {
            input: truncate_chars(params.domain.trim(), MAX_INPUT_LENGTH),
            parsed: None,
            domain: None,
        }
    }
}

#[async_trait]
impl Logic for AddDomain {
    const BUCKET: RateBucket = RateBucket::AddDomain;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let custid = ctx.require_customer()?;
        if self.input.is_empty() {
            return Err(LogicError::form("Please enter a domain"));
        }
        let parsed = DisplayDomain::parse(&self.input)
            .map_err(|_| LogicError::form("Not a valid public domain"))?;

        let repo = ctx.domains();
        if repo.find(custid, parsed.as_str()).await?.is_some() {
            return Err(LogicError::form("Duplicate domain"));
        }
        if let Some(owner) = repo.owner_of(parsed.as_str()).await? {
            if owner != custid {
                return Err(LogicError::form("Domain is registered to another account"));
            }
        }
        self.parsed = Some(parsed);
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let custid = ctx.require_customer()?;
        let Some(parsed) = self.parsed.as_ref() else {
            return Err(LogicError::form("Please enter a domain"));
        };
        let domain = CustomDomain::new(parsed, custid, generate_validation_value()?, ctx.now);
        ctx.domains().create(&domain).await?;
        self.domain = Some(domain);
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        match &self.domain {
            Some(domain) => SuccessData::record(to_value(domain))
                .with_detail("validation_fqdn", domain.validation_fqdn()),
            None => SuccessData::empty(),
        }
    }
}

pub struct VerifyDomain {
    input: String,
    domain: Option<CustomDomain>,
}

impl VerifyDomain {
    pub fn new(params: DomainParams) -> Self {
        Self {
            input: truncate_chars(params.domain.trim(), MAX_INPUT_LENGTH),
            domain: None,
        }
    }
}

#[async_trait]
impl Logic for VerifyDomain {
    const BUCKET: RateBucket = RateBucket::VerifyDomain;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        self.domain = Some(owned_domain(ctx, &self.input).await?);
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let Some(domain) = self.domain.as_mut() else {
            return Err(LogicError::NotFound("Domain not found".to_string()));
        };
        let host = domain.validation_fqdn();
        // A failed lookup is reported as "not yet verified"; the customer
        // can simply retry.
        let verified = match ctx
            .validator
            .has_txt_value(&host, &domain.txt_validation_value)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(%host, %err, "txt lookup failed");
                false
            }
        };
        domain.record_verification(verified, ctx.now);
        ctx.domains().save(domain).await?;
        info!(domainid = %domain.domainid, verified, "domain verification checked");
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        match &self.domain {
            Some(domain) => {
                SuccessData::record(to_value(domain)).with_detail("verified", domain.verified)
            }
            None => SuccessData::empty(),
        }
    }
}

pub struct RemoveDomain {
    input: String,
    domain: Option<CustomDomain>,
}

impl RemoveDomain {
    pub fn new(params: DomainParams) -> Self {
        Self {
            input: truncate_chars(params.domain.trim(), MAX_INPUT_LENGTH),
            domain: None,
        }
    }
}

#[async_trait]
impl Logic for RemoveDomain {
    const BUCKET: RateBucket = RateBucket::RemoveDomain;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        self.domain = Some(owned_domain(ctx, &self.input).await?);
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        if let Some(domain) = &self.domain {
            ctx.domains().destroy(domain).await?;
        }
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        let mut data = SuccessData::empty();
        if let Some(domain) = &self.domain {
            data = data.with_detail("domain", domain.display_domain.clone());
        }
        data
    }
}

pub struct GetDomain {
    input: String,
    domain: Option<CustomDomain>,
}

impl GetDomain {
    pub fn new(params: DomainParams) -> Self {
        Self {
            input: truncate_chars(params.domain.trim(), MAX_INPUT_LENGTH),
            domain: None,
        }
    }
}

#[async_trait]
impl Logic for GetDomain {
    const BUCKET: RateBucket = RateBucket::GetDomain;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        self.domain = Some(owned_domain(ctx, &self.input).await?);
        Ok(())
    }

    async fn process(&mut self, _ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        match &self.domain {
            Some(domain) => SuccessData::record(to_value(domain))
                .with_detail("validation_fqdn", domain.validation_fqdn()),
            None => SuccessData::empty(),
        }
    }
}

#[derive(Default)]
pub struct ListDomains {
    domains: Vec<CustomDomain>,
}

impl ListDomains {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Logic for ListDomains {
    const BUCKET: RateBucket = RateBucket::ListDomains;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        ctx.require_customer()?;
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let custid = ctx.require_customer()?;
        self.domains = ctx.domains().list(custid).await?;
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        SuccessData::records(self.domains.iter().map(to_value).collect())
    }
}
