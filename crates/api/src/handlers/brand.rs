use actix_web::{web, HttpRequest, HttpResponse};
use vanish_domain::logic::{
    GetDomainBrand, GetDomainLogo, RemoveDomainLogo, UpdateDomainBrand, UpdateDomainLogo,
};
use vanish_domain::model::{BrandUpdate, LogoUpload};

use crate::state::AppState;

use super::{caller_from_request, process_action, retrieve_records, ApiError};

pub async fn get_domain_brand_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    retrieve_records(&state, &caller, GetDomainBrand::new(&path)).await
}

pub async fn update_domain_brand_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<BrandUpdate>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    process_action(
        &state,
        &caller,
        UpdateDomainBrand::new(&path, payload.into_inner()),
        "Brand settings saved successfully.",
        "Brand settings could not be saved.",
    )
    .await
}

pub async fn get_domain_logo_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    retrieve_records(&state, &caller, GetDomainLogo::new(&path)).await
}

pub async fn update_domain_logo_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<LogoUpload>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    process_action(
        &state,
        &caller,
        UpdateDomainLogo::new(&path, payload.into_inner()),
        "Logo saved successfully.",
        "Logo could not be saved.",
    )
    .await
}

pub async fn remove_domain_logo_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    process_action(
        &state,
        &caller,
        RemoveDomainLogo::new(&path),
        "Logo removed.",
        "Logo could not be removed.",
    )
    .await
}
