use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test, web, App,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use vanish_domain::config::SiteConfig;
use vanish_domain::model::CustomDomain;
use vanish_domain::services::{
    authenticity::{create_challenge, encode_solution, hash_challenge, Solution},
    rate_limit::{RateBucket, RateLimiter},
    telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard},
    validation::{DomainValidator, ValidationError},
};
use vanish_domain::storage::KeyTtl;
use vanish_domain::{FeedbackStore, RecordStore};
use vanish_storage::SeaOrmStorage;

use crate::application::{configure_internal, configure_public};
use crate::handlers::{CUSTOMER_HEADER, FORWARDED_FOR_HEADER};
use crate::state::AppState;

const CUSTOMER: &str = "cust-1";
const SECRET: &str = "feedback-secret";
const PROXY: &str = "127.0.0.1:9000";

/// Serves whatever TXT values the test published, for every host.
#[derive(Default)]
struct StubValidator {
    records: Mutex<Vec<String>>,
    hosts: Mutex<Vec<String>>,
}

impl StubValidator {
    fn publish(&self, value: &str) {
        self.records.lock().unwrap().push(value.to_string());
    }

    fn queried_hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DomainValidator for StubValidator {
    async fn txt_records(&self, host: &str) -> Result<Vec<String>, ValidationError> {
        self.hosts.lock().unwrap().push(host.to_string());
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Always fails, like a resolver that is down.
struct BrokenValidator;

#[async_trait]
impl DomainValidator for BrokenValidator {
    async fn txt_records(&self, _host: &str) -> Result<Vec<String>, ValidationError> {
        Err(ValidationError::Lookup("resolver unreachable".into()))
    }
}

async fn storage() -> SeaOrmStorage {
    SeaOrmStorage::builder()
        .database_url("sqlite::memory:")
        .max_connections(1)
        .build()
        .await
        .expect("storage inits")
}

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST");
    init_telemetry(&config).expect("telemetry inits")
}

fn site() -> SiteConfig {
    SiteConfig::default()
        .with_record_ttl(Duration::from_secs(3_600))
        .with_authenticity_secret(SECRET)
        .with_authenticity_max_number(64)
        .with_trusted_proxies([proxy_peer().ip()])
}

fn proxy_peer() -> std::net::SocketAddr {
    PROXY.parse().unwrap()
}

fn build_state(
    storage: SeaOrmStorage,
    site: SiteConfig,
    validator: Arc<dyn DomainValidator>,
) -> AppState {
    AppState::new(storage, site, validator, telemetry())
}

/// Public listener routes over `state`.
macro_rules! public_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(configure_public),
        )
        .await
    };
}

fn get(uri: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
}

fn post(uri: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
}

/// Adds `$domain` for [`CUSTOMER`] and returns the response body.
macro_rules! add_domain {
    ($app:expr, $domain:expr) => {{
        let req = post("/api/v2/account/domains/add")
            .set_json(json!({ "domain": $domain }))
            .to_request();
        let (status, body) = status_and_body($app, req).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }};
}

async fn status_and_body<S, R, B>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

fn solve(max_number: u64) -> String {
    let challenge = create_challenge(SECRET, max_number, None).expect("challenge");
    let number = (0..=challenge.maxnumber)
        .find(|n| hash_challenge(&challenge.salt, *n) == challenge.challenge)
        .expect("solvable");
    encode_solution(&Solution {
        algorithm: challenge.algorithm,
        challenge: challenge.challenge,
        number,
        salt: challenge.salt,
        signature: challenge.signature,
    })
}

#[actix_web::test]
async fn anonymous_callers_cannot_manage_domains() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v2/account/domains")
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Sign in to manage domains");
}

#[actix_web::test]
async fn adds_and_lists_domains() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);

    let body = add_domain!(&app, "Secrets.Example.com");
    assert_eq!(body["success"], true);
    assert_eq!(body["custid"], CUSTOMER);
    assert_eq!(body["record"]["display_domain"], "secrets.example.com");
    assert_eq!(body["record"]["verification"], "unverified");
    assert_eq!(body["details"]["message"], "Domain added successfully.");
    let fqdn = body["details"]["validation_fqdn"].as_str().unwrap();
    assert!(fqdn.starts_with("_vanish-challenge-"));
    assert!(fqdn.ends_with(".secrets.example.com"));

    add_domain!(&app, "another.org");

    let (status, body) = status_and_body(&app, get("/api/v2/account/domains").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    let names: Vec<&str> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["display_domain"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["another.org", "secrets.example.com"]);
}

#[actix_web::test]
async fn rejects_bad_domain_input() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);

    let req = post("/api/v2/account/domains/add")
        .set_json(json!({ "domain": "   " }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Please enter a domain");

    let req = post("/api/v2/account/domains/add")
        .set_json(json!({ "domain": "localhost" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Not a valid public domain");

    add_domain!(&app, "example.com");
    let req = post("/api/v2/account/domains/add")
        .set_json(json!({ "domain": "EXAMPLE.com" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Duplicate domain");

    let req = test::TestRequest::post()
        .uri("/api/v2/account/domains/add")
        .insert_header((CUSTOMER_HEADER, "cust-2"))
        .set_json(json!({ "domain": "example.com" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Domain is registered to another account");
}

#[actix_web::test]
async fn verifies_domain_when_txt_record_matches() {
    let validator = Arc::new(StubValidator::default());
    let state = build_state(storage().await, site(), validator.clone());
    let app = public_app!(state);

    let added = add_domain!(&app, "example.com");
    let value = added["record"]["txt_validation_value"].as_str().unwrap();
    let fqdn = added["details"]["validation_fqdn"].as_str().unwrap();

    let req = post("/api/v2/account/domains/example.com/verify").to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["verified"], false);
    assert_eq!(body["record"]["verification"], "pending");

    validator.publish(value);
    let req = post("/api/v2/account/domains/example.com/verify").to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["verified"], true);
    assert_eq!(body["details"]["message"], "Domain verified.");
    assert_eq!(body["record"]["verification"], "verified");
    assert_eq!(validator.queried_hosts(), vec![fqdn.to_string(), fqdn.to_string()]);

    let (_, body) = status_and_body(&app, get("/api/v2/account/domains/example.com").to_request()).await;
    assert_eq!(body["record"]["verified"], true);
}

#[actix_web::test]
async fn lookup_failure_leaves_domain_pending() {
    let state = build_state(storage().await, site(), Arc::new(BrokenValidator));
    let app = public_app!(state);
    add_domain!(&app, "example.com");

    let req = post("/api/v2/account/domains/example.com/verify").to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["verification"], "pending");
}

#[actix_web::test]
async fn removes_domain_and_its_records() {
    let storage = storage().await;
    let state = build_state(storage.clone(), site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);

    let added = add_domain!(&app, "example.com");
    let domainid = added["record"]["domainid"].as_str().unwrap().to_string();

    let req = post("/api/v2/account/domains/example.com/remove").to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["domain"], "example.com");
    assert_eq!(body["details"]["message"], "Domain removed successfully.");

    assert!(!storage
        .exists(&CustomDomain::object_key(&domainid))
        .await
        .unwrap());
    let (status, body) = status_and_body(&app, get("/api/v2/account/domains/example.com").to_request()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Domain not found");

    // The name is free again for any customer.
    let req = test::TestRequest::post()
        .uri("/api/v2/account/domains/add")
        .insert_header((CUSTOMER_HEADER, "cust-2"))
        .set_json(json!({ "domain": "example.com" }))
        .to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn domains_of_other_customers_are_not_visible() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);
    add_domain!(&app, "example.com");

    let req = test::TestRequest::get()
        .uri("/api/v2/account/domains/example.com")
        .insert_header((CUSTOMER_HEADER, "cust-2"))
        .to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn updates_brand_settings() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);
    add_domain!(&app, "example.com");

    let (status, body) = status_and_body(&app, get("/api/v2/account/domains/example.com/brand").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["font_family"], "sans");

    let req = test::TestRequest::put()
        .uri("/api/v2/account/domains/example.com/brand")
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
        .set_json(json!({ "primary_color": "#ABC", "font_family": "serif" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["primary_color"], "#aabbcc");
    assert_eq!(body["details"]["message"], "Brand settings saved successfully.");

    let (_, body) = status_and_body(&app, get("/api/v2/account/domains/example.com/brand").to_request()).await;
    assert_eq!(body["record"]["font_family"], "serif");
    assert_eq!(body["record"]["primary_color"], "#aabbcc");

    let req = test::TestRequest::put()
        .uri("/api/v2/account/domains/example.com/brand")
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
        .set_json(json!({ "primary_color": "teal" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid primary color");
}

#[actix_web::test]
async fn uploads_and_removes_logo() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);
    add_domain!(&app, "example.com");

    let (status, body) = status_and_body(&app, get("/api/v2/account/domains/example.com/logo").to_request()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No logo found");

    let req = post("/api/v2/account/domains/example.com/logo")
        .set_json(json!({
            "filename": "logo.png",
            "content_type": "image/png",
            "encoded": "iVBORw0KGgo=",
        }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["bytes"], 8);
    assert_eq!(body["details"]["message"], "Logo saved successfully.");

    let (status, body) = status_and_body(&app, get("/api/v2/account/domains/example.com/logo").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["filename"], "logo.png");

    let req = post("/api/v2/account/domains/example.com/logo")
        .set_json(json!({ "content_type": "application/pdf", "encoded": "AAAA" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Unsupported image type");

    let req = test::TestRequest::delete()
        .uri("/api/v2/account/domains/example.com/logo")
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["message"], "Logo removed.");

    let (status, _) = status_and_body(&app, get("/api/v2/account/domains/example.com/logo").to_request()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn saving_refreshes_record_ttl() {
    let storage = storage().await;
    let site = site().with_record_ttl(Duration::from_secs(120));
    let state = build_state(storage.clone(), site, Arc::new(StubValidator::default()));
    let app = public_app!(state);

    let added = add_domain!(&app, "example.com");
    let key = CustomDomain::object_key(added["record"]["domainid"].as_str().unwrap());

    storage.expire(&key, Duration::from_secs(5)).await.unwrap();
    let req = test::TestRequest::put()
        .uri("/api/v2/account/domains/example.com/brand")
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
        .set_json(json!({ "corner_style": "pill" }))
        .to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    match storage.ttl(&key).await.unwrap() {
        KeyTtl::Expires(remaining) => {
            assert!(remaining > Duration::from_secs(100));
            assert!(remaining <= Duration::from_secs(120));
        }
        other => panic!("expected an expiring key, got {other:?}"),
    }
}

#[actix_web::test]
async fn receives_feedback_from_customers() {
    let storage = storage().await;
    let state = build_state(storage.clone(), site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);

    let req = post("/api/v2/feedback")
        .set_json(json!({ "msg": "love it", "tz": "UTC", "version": "0.6.0" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["details"]["message"],
        "Message received. Send as much as you like!"
    );

    let entries = storage.recent_feedback(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "love it [cust-1] [TZ: UTC] [v0.6.0]");

    let req = post("/api/v2/feedback")
        .set_json(json!({ "msg": "" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You can be more original than that!");
}

#[actix_web::test]
async fn anonymous_feedback_requires_solved_challenge() {
    let storage = storage().await;
    let state = build_state(storage.clone(), site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);
    let peer: std::net::SocketAddr = "203.0.113.9:4000".parse().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v2/feedback")
        .peer_addr(peer)
        .set_json(json!({ "msg": "hello" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot skip authenticity check");

    let req = test::TestRequest::post()
        .uri("/api/v2/feedback")
        .peer_addr(peer)
        .set_json(json!({ "msg": "hello", "authenticity_payload": "bm90IGpzb24=" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You need to be carbon-based to do that");

    let req = test::TestRequest::post()
        .uri("/api/v2/feedback")
        .peer_addr(peer)
        .set_json(json!({ "msg": "hello", "authenticity_payload": solve(64) }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["custid"], Value::Null);

    let entries = storage.recent_feedback(10).await.unwrap();
    assert_eq!(entries[0].message, "hello [203.0.113.9] [TZ: ] [v]");
}

#[actix_web::test]
async fn issues_challenges_only_with_secret() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);
    let req = test::TestRequest::get()
        .uri("/api/v2/authenticity/challenge")
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["algorithm"], "SHA-256");
    assert_eq!(body["maxnumber"], 64);
    assert!(body["salt"].as_str().unwrap().contains("?expires="));

    let state = build_state(
        storage().await,
        SiteConfig::default(),
        Arc::new(StubValidator::default()),
    );
    let app = public_app!(state);
    let req = test::TestRequest::get()
        .uri("/api/v2/authenticity/challenge")
        .to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn rate_limits_per_bucket() {
    let site = site();
    let limiter = RateLimiter::new(site.rate_limit_window()).with_limit(RateBucket::ListDomains, 2);
    let state = build_state(storage().await, site, Arc::new(StubValidator::default()))
        .with_limiter(limiter);
    let app = public_app!(state);

    for _ in 0..2 {
        let (status, _) = status_and_body(&app, get("/api/v2/account/domains").to_request()).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = status_and_body(&app, get("/api/v2/account/domains").to_request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Cripes! You have been rate limited.");

    // Other buckets are untouched.
    add_domain!(&app, "example.com");
}

#[actix_web::test]
async fn customer_header_from_untrusted_peer_is_ignored() {
    let storage = storage().await;
    let state = build_state(storage.clone(), site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);
    let peer: std::net::SocketAddr = "198.51.100.7:5000".parse().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v2/feedback")
        .peer_addr(peer)
        .insert_header((CUSTOMER_HEADER, "cust-1"))
        .set_json(json!({ "msg": "hello" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot skip authenticity check");
    assert!(storage.recent_feedback(10).await.unwrap().is_empty());

    let req = test::TestRequest::get()
        .uri("/api/v2/account/domains")
        .peer_addr(peer)
        .insert_header((CUSTOMER_HEADER, "cust-1"))
        .to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn forwarded_for_from_untrusted_peer_keeps_rate_limit_identity() {
    let site = site();
    let limiter =
        RateLimiter::new(site.rate_limit_window()).with_limit(RateBucket::SendFeedback, 1);
    let state = build_state(storage().await, site, Arc::new(StubValidator::default()))
        .with_limiter(limiter);
    let app = public_app!(state);
    let peer: std::net::SocketAddr = "198.51.100.7:5000".parse().unwrap();

    let mut statuses = Vec::new();
    for hop in ["10.0.0.0", "10.0.0.1", "10.0.0.2"] {
        let req = test::TestRequest::post()
            .uri("/api/v2/feedback")
            .peer_addr(peer)
            .insert_header((FORWARDED_FOR_HEADER, hop))
            .set_json(json!({ "msg": "hello" }))
            .to_request();
        let (status, _) = status_and_body(&app, req).await;
        statuses.push(status);
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::BAD_REQUEST,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

#[actix_web::test]
async fn trusted_proxy_forwards_client_address_and_customer() {
    let storage = storage().await;
    let state = build_state(storage.clone(), site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);

    // The left entry is whatever the client sent; the proxy appended the
    // real address, followed by its own hop.
    let req = test::TestRequest::post()
        .uri("/api/v2/feedback")
        .peer_addr(proxy_peer())
        .insert_header((FORWARDED_FOR_HEADER, "192.0.2.1, 203.0.113.50, 127.0.0.1"))
        .set_json(json!({ "msg": "hello", "authenticity_payload": solve(64) }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["custid"], Value::Null);
    let entries = storage.recent_feedback(10).await.unwrap();
    assert_eq!(entries[0].message, "hello [203.0.113.50] [TZ: ] [v]");

    let req = test::TestRequest::post()
        .uri("/api/v2/feedback")
        .peer_addr(proxy_peer())
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
        .set_json(json!({ "msg": "from a customer" }))
        .to_request();
    let (status, body) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["custid"], CUSTOMER);
}

#[actix_web::test]
async fn verifying_refreshes_brand_and_logo_ttl() {
    let storage = storage().await;
    let state = build_state(storage.clone(), site(), Arc::new(StubValidator::default()));
    let app = public_app!(state);

    let added = add_domain!(&app, "example.com");
    let domainid = added["record"]["domainid"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri("/api/v2/account/domains/example.com/brand")
        .insert_header((CUSTOMER_HEADER, CUSTOMER))
        .set_json(json!({ "font_family": "serif" }))
        .to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let req = post("/api/v2/account/domains/example.com/logo")
        .set_json(json!({
            "filename": "logo.png",
            "content_type": "image/png",
            "encoded": "iVBORw0KGgo=",
        }))
        .to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let brand = CustomDomain::brand_key(&domainid);
    let logo = CustomDomain::logo_key(&domainid);
    storage.expire(&brand, Duration::from_secs(5)).await.unwrap();
    storage.expire(&logo, Duration::from_secs(5)).await.unwrap();

    let req = post("/api/v2/account/domains/example.com/verify").to_request();
    let (status, _) = status_and_body(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    for key in [brand, logo] {
        match storage.ttl(&key).await.unwrap() {
            KeyTtl::Expires(remaining) => assert!(remaining > Duration::from_secs(3_000)),
            other => panic!("expected an expiring key, got {other:?}"),
        }
    }
}

#[actix_web::test]
async fn notices_are_set_internally_and_read_publicly() {
    let state = build_state(
        storage().await,
        site().with_notice_dismiss(Duration::from_secs(60)),
        Arc::new(StubValidator::default()),
    );
    let internal = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure_internal),
    )
    .await;
    let public = public_app!(state);

    let (_, body) = status_and_body(
        &public,
        test::TestRequest::get().uri("/api/v2/notice").to_request(),
    )
    .await;
    assert_eq!(body["is_visible"], false);

    let req = test::TestRequest::post()
        .uri("/api/v2/notice")
        .set_json(json!({ "message": "Maintenance at noon", "kind": "info", "position": "top" }))
        .to_request();
    let (status, _) = status_and_body(&internal, req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = status_and_body(
        &public,
        test::TestRequest::get().uri("/api/v2/notice").to_request(),
    )
    .await;
    assert_eq!(body["is_visible"], true);
    assert_eq!(body["message"], "Maintenance at noon");
    assert_eq!(body["kind"], "info");
    assert_eq!(body["position"], "top");

    let req = test::TestRequest::post()
        .uri("/api/v2/notice")
        .set_json(json!({ "message": "" }))
        .to_request();
    let (_, body) = status_and_body(&internal, req).await;
    assert_eq!(body["is_visible"], false);
    assert_eq!(body["kind"], Value::Null);

    let req = test::TestRequest::post()
        .uri("/api/v2/notice")
        .set_json(json!({ "message": "no kind" }))
        .to_request();
    let (status, _) = status_and_body(&internal, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn metrics_are_served_on_internal_listener() {
    let state = build_state(storage().await, site(), Arc::new(StubValidator::default()));
    let internal = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_internal),
    )
    .await;
    let resp = test::call_service(
        &internal,
        test::TestRequest::get().uri("/metrics").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}
