use actix_web::{web, HttpRequest, HttpResponse};
use vanish_domain::logic::{
    AddDomain, DomainParams, GetDomain, ListDomains, RemoveDomain, VerifyDomain,
};

use crate::state::AppState;

use super::{caller_from_request, process_action, retrieve_records, ApiError};

fn path_params(domain: String) -> DomainParams {
    DomainParams { domain }
}

pub async fn add_domain_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<DomainParams>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    process_action(
        &state,
        &caller,
        AddDomain::new(payload.into_inner()),
        "Domain added successfully.",
        "Domain could not be added.",
    )
    .await
}

pub async fn list_domains_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    retrieve_records(&state, &caller, ListDomains::new()).await
}

pub async fn get_domain_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    let logic = GetDomain::new(path_params(path.into_inner()));
    retrieve_records(&state, &caller, logic).await
}

pub async fn verify_domain_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    process_action(
        &state,
        &caller,
        VerifyDomain::new(path_params(path.into_inner())),
        "Domain verified.",
        "Domain could not be verified.",
    )
    .await
}

pub async fn remove_domain_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    process_action(
        &state,
        &caller,
        RemoveDomain::new(path_params(path.into_inner())),
        "Domain removed successfully.",
        "Domain could not be removed.",
    )
    .await
}
