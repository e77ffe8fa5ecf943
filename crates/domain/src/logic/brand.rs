use async_trait::async_trait;

use crate::model::{truncate_chars, BrandSettings, BrandUpdate, CustomDomain, Logo, LogoUpload};
use crate::services::rate_limit::RateBucket;

use super::domains::owned_domain;
use super::{to_value, Logic, LogicContext, LogicError, SuccessData};

const MAX_INPUT_LENGTH: usize = 512;

fn sanitize(raw: &str) -> String {
    truncate_chars(raw.trim(), MAX_INPUT_LENGTH)
}

fn missing_domain() -> LogicError {
    LogicError::NotFound("Domain not found".to_string())
}

fn missing_logo() -> LogicError {
    LogicError::NotFound("No logo found".to_string())
}

pub struct GetDomainBrand {
    input: String,
    domain: Option<CustomDomain>,
    brand: BrandSettings,
}

impl GetDomainBrand {
    pub fn new(domain: &str) -> Self {
        Self {
            input: sanitize(domain),
            domain: None,
            brand: BrandSettings::default(),
        }
    }
}

#[async_trait]
impl Logic for GetDomainBrand {
    const BUCKET: RateBucket = RateBucket::GetDomainBrand;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        self.domain = Some(owned_domain(ctx, &self.input).await?);
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let domain = self.domain.as_ref().ok_or_else(missing_domain)?;
        self.brand = ctx.domains().load_brand(domain).await?;
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        let data = SuccessData::record(to_value(&self.brand));
        match &self.domain {
            Some(domain) => data.with_detail("domainid", domain.domainid.clone()),
            None => data,
        }
    }
}

pub struct UpdateDomainBrand {
    input: String,
    update: BrandUpdate,
    domain: Option<CustomDomain>,
    brand: BrandSettings,
}

impl UpdateDomainBrand {
    pub fn new(domain: &str, update: BrandUpdate) -> Self {
        Self {
            input: sanitize(domain),
            update,
            domain: None,
            brand: BrandSettings::default(),
        }
    }
}

#[async_trait]
impl Logic for UpdateDomainBrand {
    const BUCKET: RateBucket = RateBucket::UpdateDomainBrand;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        self.domain = Some(owned_domain(ctx, &self.input).await?);
        self.update.validate()?;
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let domain = self.domain.as_ref().ok_or_else(missing_domain)?;
        let repo = ctx.domains();
        let mut brand = repo.load_brand(domain).await?;
        brand.apply(&self.update)?;
        repo.save_brand(domain, &brand, ctx.now).await?;
        self.brand = brand;
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        SuccessData::record(to_value(&self.brand))
    }
}

pub struct GetDomainLogo {
    input: String,
    logo: Option<Logo>,
}

impl GetDomainLogo {
    pub fn new(domain: &str) -> Self {
        Self {
            input: sanitize(domain),
            logo: None,
        }
    }
}

#[async_trait]
impl Logic for GetDomainLogo {
    const BUCKET: RateBucket = RateBucket::GetDomainLogo;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let domain = owned_domain(ctx, &self.input).await?;
        let logo = ctx.domains().load_logo(&domain).await?;
        self.logo = Some(logo.ok_or_else(missing_logo)?);
        Ok(())
    }

    async fn process(&mut self, _ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        match &self.logo {
            Some(logo) => SuccessData::record(to_value(logo)),
            None => SuccessData::empty(),
        }
    }
}

pub struct UpdateDomainLogo {
    input: String,
    upload: LogoUpload,
    domain: Option<CustomDomain>,
    logo: Option<Logo>,
}

impl UpdateDomainLogo {
    pub fn new(domain: &str, upload: LogoUpload) -> Self {
        Self {
            input: sanitize(domain),
            upload,
            domain: None,
            logo: None,
        }
    }
}

#[async_trait]
impl Logic for UpdateDomainLogo {
    const BUCKET: RateBucket = RateBucket::UpdateDomainLogo;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        self.domain = Some(owned_domain(ctx, &self.input).await?);
        self.logo = Some(Logo::from_upload(&self.upload, ctx.now)?);
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let domain = self.domain.as_ref().ok_or_else(missing_domain)?;
        let logo = self.logo.as_ref().ok_or_else(missing_logo)?;
        ctx.domains().save_logo(domain, logo, ctx.now).await?;
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        match &self.logo {
            Some(logo) => SuccessData::record(to_value(logo)),
            None => SuccessData::empty(),
        }
    }
}

pub struct RemoveDomainLogo {
    input: String,
    domain: Option<CustomDomain>,
}

impl RemoveDomainLogo {
    pub fn new(domain: &str) -> Self {
        Self {
            input: sanitize(domain),
            domain: None,
        }
    }
}

#[async_trait]
impl Logic for RemoveDomainLogo {
    const BUCKET: RateBucket = RateBucket::RemoveDomainLogo;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let domain = owned_domain(ctx, &self.input).await?;
        if ctx.domains().load_logo(&domain).await?.is_none() {
            return Err(missing_logo());
        }
        self.domain = Some(domain);
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let domain = self.domain.as_ref().ok_or_else(missing_domain)?;
        ctx.domains().remove_logo(domain, ctx.now).await?;
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        SuccessData::empty()
    }
}
