/// Identity of whoever issued the current request. Authentication happens
/// upstream; an absent customer id means an anonymous visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    custid: Option<String>,
    ip: String,
}

impl Caller {
    pub fn customer(custid: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            custid: Some(custid.into()),
            ip: ip.into(),
        }
    }

    pub fn anonymous(ip: impl Into<String>) -> Self {
        Self {
            custid: None,
            ip: ip.into(),
        }
    }

    pub fn custid(&self) -> Option<&str> {
        self.custid.as_deref()
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn is_anonymous(&self) -> bool {
        self.custid.is_none()
    }

    /// Key used for rate limiting and feedback attribution.
    pub fn identifier(&self) -> &str {
        self.custid.as_deref().unwrap_or(&self.ip)
    }
}
