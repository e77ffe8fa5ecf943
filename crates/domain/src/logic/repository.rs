use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::model::{BrandSettings, CustomDomain, Logo};
use crate::storage::{
    Batch, ExpirableRecord, ExpirationOptions, Fields, RecordKey, RecordStore, SaveOptions,
    StorageResult,
};

use super::Backend;

/// Custom domains plus their brand and logo records, together with the two
/// lookup indexes. Every record write refreshes the TTL in the same batch.
///
/// Index hashes never expire; entries pointing at lapsed objects are pruned
/// whenever a read stumbles over them.
pub struct DomainRepository<'a> {
    store: &'a dyn Backend,
    ttl: Duration,
}

impl<'a> DomainRepository<'a> {
    pub fn new(store: &'a dyn Backend, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn record(&self, key: RecordKey) -> ExpirableRecord<'a, dyn Backend + 'a> {
        ExpirableRecord::new(self.store, key, self.ttl)
    }

    fn batch(&self) -> Batch<'a, dyn Backend + 'a> {
        Batch::new(self.store)
    }

    /// Domain `display_domain` as claimed by `custid`.
    pub async fn find(
        &self,
        custid: &str,
        display_domain: &str,
    ) -> StorageResult<Option<CustomDomain>> {
        let index = CustomDomain::customer_index_key(custid);
        let Some(domainid) = self.store.hget(&index, display_domain).await? else {
            return Ok(None);
        };
        match self.load(&domainid).await? {
            Some(domain) => Ok(Some(domain)),
            None => {
                self.prune(custid, &[display_domain.to_owned()]).await?;
                Ok(None)
            }
        }
    }

    pub async fn load(&self, domainid: &str) -> StorageResult<Option<CustomDomain>> {
        let fields = self.record(CustomDomain::object_key(domainid)).load().await?;
        fields.as_ref().map(CustomDomain::from_fields).transpose()
    }

    /// Customer currently holding `display_domain`, if any.
    pub async fn owner_of(&self, display_domain: &str) -> StorageResult<Option<String>> {
        let owner = self
            .store
            .hget(&CustomDomain::owners_key(), display_domain)
            .await?;
        match owner {
            Some(custid) => Ok(self
                .find(&custid, display_domain)
                .await?
                .map(|domain| domain.custid)),
            None => Ok(None),
        }
    }

    /// Stores a new domain and both index entries. Fails with a storage
    /// error when another claim raced this one.
    pub async fn create(&self, domain: &CustomDomain) -> StorageResult<()> {
        let owners = CustomDomain::owners_key();
        let mut batch = self.batch();
        batch.watch(&owners).await?;

        let object = self.record(CustomDomain::object_key(&domain.domainid));
        object.queue_save(&mut batch, domain.to_fields(), SaveOptions::default());
        batch.hset(
            &CustomDomain::customer_index_key(&domain.custid),
            Fields::from([(domain.display_domain.clone(), domain.domainid.clone())]),
        );
        batch.hset(
            &owners,
            Fields::from([(domain.display_domain.clone(), domain.custid.clone())]),
        );
        batch.commit().await?;
        info!(domainid = %domain.domainid, "custom domain created");
        Ok(())
    }

    /// Writes the domain object and refreshes the TTL of its brand and logo.
    pub async fn save(&self, domain: &CustomDomain) -> StorageResult<()> {
        let mut batch = self.batch();
        self.record(CustomDomain::object_key(&domain.domainid)).queue_save(
            &mut batch,
            domain.to_fields(),
            SaveOptions::default(),
        );
        self.queue_companion_expiration(&mut batch, domain);
        batch.commit().await
    }

    /// Every live domain of `custid`, ordered by display name.
    pub async fn list(&self, custid: &str) -> StorageResult<Vec<CustomDomain>> {
        let index = self
            .store
            .hgetall(&CustomDomain::customer_index_key(custid))
            .await?
            .unwrap_or_default();

        let mut domains = Vec::with_capacity(index.len());
        let mut stale = Vec::new();
        for (display_domain, domainid) in index {
            match self.load(&domainid).await? {
                Some(domain) => domains.push(domain),
                None => stale.push(display_domain),
            }
        }
        if !stale.is_empty() {
            self.prune(custid, &stale).await?;
        }
        domains.sort_by(|a, b| a.display_domain.cmp(&b.display_domain));
        Ok(domains)
    }

    /// Deletes the domain with its brand and logo and drops index entries.
    pub async fn destroy(&self, domain: &CustomDomain) -> StorageResult<()> {
        let mut batch = self.batch();
        batch
            .delete(&CustomDomain::object_key(&domain.domainid))
            .delete(&CustomDomain::brand_key(&domain.domainid))
            .delete(&CustomDomain::logo_key(&domain.domainid))
            .hdel(
                &CustomDomain::customer_index_key(&domain.custid),
                vec![domain.display_domain.clone()],
            )
            .hdel(
                &CustomDomain::owners_key(),
                vec![domain.display_domain.clone()],
            );
        batch.commit().await?;
        info!(domainid = %domain.domainid, "custom domain removed");
        Ok(())
    }

    pub async fn load_brand(&self, domain: &CustomDomain) -> StorageResult<BrandSettings> {
        let fields = self
            .record(CustomDomain::brand_key(&domain.domainid))
            .load()
            .await?;
        match fields {
            Some(fields) => BrandSettings::from_fields(&fields),
            None => Ok(BrandSettings::default()),
        }
    }

    pub async fn save_brand(
        &self,
        domain: &CustomDomain,
        brand: &BrandSettings,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut batch = self.batch();
        self.record(CustomDomain::brand_key(&domain.domainid)).queue_save(
            &mut batch,
            brand.to_fields(),
            SaveOptions::default(),
        );
        self.queue_touch(&mut batch, domain, now);
        batch.commit().await
    }

    pub async fn load_logo(&self, domain: &CustomDomain) -> StorageResult<Option<Logo>> {
        let fields = self
            .record(CustomDomain::logo_key(&domain.domainid))
            .load()
            .await?;
        fields.as_ref().map(Logo::from_fields).transpose()
    }

    pub async fn save_logo(
        &self,
        domain: &CustomDomain,
        logo: &Logo,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let logo_key = CustomDomain::logo_key(&domain.domainid);
        let mut batch = self.batch();
        // Replace rather than merge so no field of an older upload survives.
        batch.delete(&logo_key);
        self.record(logo_key)
            .queue_save(&mut batch, logo.to_fields(), SaveOptions::default());
        self.queue_touch(&mut batch, domain, now);
        batch.commit().await
    }

    pub async fn remove_logo(&self, domain: &CustomDomain, now: DateTime<Utc>) -> StorageResult<()> {
        let mut batch = self.batch();
        batch.delete(&CustomDomain::logo_key(&domain.domainid));
        self.queue_touch(&mut batch, domain, now);
        batch.commit().await
    }

    /// Bumps the object's `updated` field and refreshes the TTL of the object,
    /// its brand and its logo.
    fn queue_touch(
        &self,
        batch: &mut Batch<'a, dyn Backend + 'a>,
        domain: &CustomDomain,
        now: DateTime<Utc>,
    ) {
        let object = self.record(CustomDomain::object_key(&domain.domainid));
        batch.hset(
            object.key(),
            Fields::from([("updated".to_string(), now.timestamp().to_string())]),
        );
        object.queue_expiration(batch, ExpirationOptions::default());
        self.queue_companion_expiration(batch, domain);
    }

    /// Brand and logo live as long as their domain. Expiring a missing key is
    /// a no-op.
    fn queue_companion_expiration(
        &self,
        batch: &mut Batch<'a, dyn Backend + 'a>,
        domain: &CustomDomain,
    ) {
        for key in [
            CustomDomain::brand_key(&domain.domainid),
            CustomDomain::logo_key(&domain.domainid),
        ] {
            self.record(key)
                .queue_expiration(batch, ExpirationOptions::default());
        }
    }

    async fn prune(&self, custid: &str, display_domains: &[String]) -> StorageResult<()> {
        debug!(custid, stale = display_domains.len(), "pruning stale domain index entries");
        let owners = CustomDomain::owners_key();
        let mut batch = self.batch();
        batch.hdel(
            &CustomDomain::customer_index_key(custid),
            display_domains.to_vec(),
        );
        for display_domain in display_domains {
            if self.store.hget(&owners, display_domain).await?.as_deref() == Some(custid) {
                batch.hdel(&owners, vec![display_domain.clone()]);
            }
        }
        batch.commit().await
    }
}
