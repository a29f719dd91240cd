use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::gateway::{CheckoutRequest, PaymentGateway};
use crate::models::*;
use crate::repo::Repo;

/// Currency every checkout session is charged in.
const CURRENCY: &str = "BDT";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(liveness))
        .service(web::resource("/featuredmarathon").route(web::get().to(featured_marathons)))
        .service(web::resource("/upcomingmarathon").route(web::get().to(upcoming_marathons)))
        .service(web::resource("/allmarathons").route(web::get().to(all_marathons)))
        .service(
            web::resource("/allmarathonswithoutemail")
                .route(web::get().to(all_marathons_without_email)),
        )
        .service(web::resource("/marathons/{id}").route(web::get().to(get_marathon)))
        .service(web::resource("/marathon").route(web::post().to(create_marathon)))
        .service(web::resource("/marathon/{id}").route(web::put().to(replace_marathon)))
        .service(
            web::resource("/marathon/increment/{id}").route(web::patch().to(increment_reg_count)),
        )
        .service(
            web::resource("/marathon/decrement/{id}").route(web::patch().to(decrement_reg_count)),
        )
        .service(web::resource("/allmarathons/{id}").route(web::delete().to(delete_marathon)))
        .service(web::resource("/registrations").route(web::post().to(create_registration)))
        .service(
            web::resource("/registrations/{id}")
                .route(web::get().to(get_registration))
                .route(web::put().to(replace_registration))
                .route(web::delete().to(delete_registration)),
        )
        .service(web::resource("/applied").route(web::get().to(applied_registrations)))
        .service(web::resource("/aggregate").route(web::get().to(aggregate_marathons)))
        .service(web::resource("/success/{tran_id}").route(web::post().to(payment_success)))
        .service(web::resource("/failed").route(web::post().to(payment_failed)));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    /// Present when gateway credentials are configured; flips registration
    /// creation into the payment-initiating variant.
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub urls: RedirectUrls,
}

#[derive(Clone)]
pub struct RedirectUrls {
    /// Externally reachable base of this server; gateway callbacks land here.
    pub server_base: String,
    /// Frontend base; browsers are sent here after a callback resolves.
    pub client_base: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct OwnerQuery {
    pub email: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SortQuery {
    #[serde(rename = "sortOption")]
    pub sort_option: Option<String>,
}

fn parse_object_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::BadRequest)
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("Location", location))
        .finish()
}

async fn liveness() -> &'static str {
    "Pace Pulse server is running"
}

#[utoipa::path(
    get,
    path = "/featuredmarathon",
    responses((status = 200, description = "Random sample of 6 marathons", body = [Marathon]))
)]
pub async fn featured_marathons(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let marathons = data.repo.sample_marathons(SAMPLE_SIZE).await?;
    Ok(HttpResponse::Ok().json(marathons))
}

#[utoipa::path(
    get,
    path = "/upcomingmarathon",
    responses((status = 200, description = "Random sample of 6 marathons still open for registration", body = [Marathon]))
)]
pub async fn upcoming_marathons(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let marathons = data
        .repo
        .sample_upcoming_marathons(SAMPLE_SIZE, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(marathons))
}

#[utoipa::path(
    get,
    path = "/allmarathons",
    params(("email" = Option<String>, Query, description = "Creator email; must match the bearer token")),
    responses(
        (status = 200, description = "Marathons created by the caller", body = [Marathon]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Email does not match the token")
    )
)]
pub async fn all_marathons(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<OwnerQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_owner(query.email.as_deref())?;
    let marathons = data.repo.list_marathons(query.email.as_deref(), None).await?;
    Ok(HttpResponse::Ok().json(marathons))
}

#[utoipa::path(
    get,
    path = "/allmarathonswithoutemail",
    params(("sortOption" = Option<String>, Query, description = "`registration` or `marathon`; anything else keeps store order")),
    responses((status = 200, description = "All marathons", body = [Marathon]))
)]
pub async fn all_marathons_without_email(
    data: web::Data<AppState>,
    query: web::Query<SortQuery>,
) -> Result<HttpResponse, ApiError> {
    let sort = query.sort_option.as_deref().and_then(MarathonSort::parse);
    let marathons = data.repo.list_marathons(None, sort).await?;
    Ok(HttpResponse::Ok().json(marathons))
}

#[utoipa::path(
    get,
    path = "/marathons/{id}",
    params(("id" = String, Path, description = "Marathon id")),
    responses((status = 200, description = "The marathon, or null when absent", body = Marathon))
)]
pub async fn get_marathon(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let marathon = data.repo.get_marathon(id).await?;
    Ok(HttpResponse::Ok().json(marathon))
}

#[utoipa::path(
    post,
    path = "/marathon",
    request_body = Marathon,
    responses((status = 200, description = "Inserted", body = InsertOutcome))
)]
pub async fn create_marathon(
    data: web::Data<AppState>,
    payload: web::Json<Marathon>,
) -> Result<HttpResponse, ApiError> {
    let outcome = data.repo.insert_marathon(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    put,
    path = "/marathon/{id}",
    request_body = Marathon,
    params(("id" = String, Path, description = "Marathon id")),
    responses((status = 200, description = "Upsert-replaced; absent ids are created", body = UpdateOutcome))
)]
pub async fn replace_marathon(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<Marathon>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let outcome = data.repo.replace_marathon(id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    patch,
    path = "/marathon/increment/{id}",
    params(("id" = String, Path, description = "Marathon id")),
    responses((status = 200, description = "Counter bumped by one", body = UpdateOutcome))
)]
pub async fn increment_reg_count(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let outcome = data.repo.adjust_reg_count(id, 1).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    patch,
    path = "/marathon/decrement/{id}",
    params(("id" = String, Path, description = "Marathon id")),
    responses((status = 200, description = "Counter dropped by one", body = UpdateOutcome))
)]
pub async fn decrement_reg_count(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let outcome = data.repo.adjust_reg_count(id, -1).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    delete,
    path = "/allmarathons/{id}",
    params(("id" = String, Path, description = "Marathon id")),
    responses((status = 200, description = "Deleted; zero count when absent", body = DeleteOutcome))
)]
pub async fn delete_marathon(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let outcome = data.repo.delete_marathon(id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    post,
    path = "/registrations",
    request_body = Registration,
    responses(
        (status = 200, description = "Insert outcome, or `{ \"url\": ... }` pointing at the hosted checkout page"),
        (status = 404, description = "Referenced marathon does not exist (payment variant)")
    )
)]
pub async fn create_registration(
    data: web::Data<AppState>,
    payload: web::Json<Registration>,
) -> Result<HttpResponse, ApiError> {
    let mut registration = payload.into_inner();

    let Some(gateway) = data.gateway.clone() else {
        // insert-only variant: store the payload verbatim
        let outcome = data.repo.insert_registration(registration).await?;
        return Ok(HttpResponse::Ok().json(outcome));
    };

    // Payment-initiating variant: a linear sequence, each step aborting the
    // request on failure. The marathon lookup runs first so no payment is ever
    // started for a non-existent event.
    let marathon_ref = registration.marathon_id.as_deref().ok_or(ApiError::BadRequest)?;
    let marathon_id = parse_object_id(marathon_ref)?;
    let marathon = data
        .repo
        .get_marathon(marathon_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let name = registration.display_name();
    let tran_id = uuid::Uuid::new_v4().simple().to_string();
    registration.name = Some(name.clone());
    registration.tran_id = Some(tran_id.clone());
    registration.status = Some(RegistrationStatus::Pending);
    let fee = registration.fee.unwrap_or(0.0);
    let email = registration.user_email.clone().unwrap_or_default();
    data.repo.insert_registration(registration).await?;

    let session = gateway
        .create_session(&CheckoutRequest {
            tran_id: tran_id.clone(),
            amount: fee,
            currency: CURRENCY.to_string(),
            customer_name: name,
            customer_email: email,
            product_name: marathon
                .title
                .unwrap_or_else(|| "Marathon registration".to_string()),
            success_url: format!("{}/success/{}", data.urls.server_base, tran_id),
            fail_url: format!("{}/failed", data.urls.server_base),
            cancel_url: format!("{}/failed", data.urls.server_base),
        })
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "url": session.redirect_url })))
}

#[utoipa::path(
    get,
    path = "/registrations/{id}",
    params(("id" = String, Path, description = "Registration id")),
    responses((status = 200, description = "The registration, or null when absent", body = Registration))
)]
pub async fn get_registration(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let registration = data.repo.get_registration(id).await?;
    Ok(HttpResponse::Ok().json(registration))
}

#[utoipa::path(
    put,
    path = "/registrations/{id}",
    request_body = Registration,
    params(("id" = String, Path, description = "Registration id")),
    responses((status = 200, description = "Upsert-replaced", body = UpdateOutcome))
)]
pub async fn replace_registration(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<Registration>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let outcome = data.repo.replace_registration(id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    delete,
    path = "/registrations/{id}",
    params(("id" = String, Path, description = "Registration id")),
    responses((status = 200, description = "Deleted; zero count when absent", body = DeleteOutcome))
)]
pub async fn delete_registration(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_object_id(&path.into_inner())?;
    let outcome = data.repo.delete_registration(id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    get,
    path = "/applied",
    params(("email" = Option<String>, Query, description = "Registrant email; must match the bearer token")),
    responses(
        (status = 200, description = "The caller's registrations", body = [Registration]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Email does not match the token")
    )
)]
pub async fn applied_registrations(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<OwnerQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_owner(query.email.as_deref())?;
    // with payments on, only completed signups count
    let paid_only = data.gateway.is_some();
    let registrations = data
        .repo
        .registrations_for_email(&auth.0.email, paid_only)
        .await?;
    Ok(HttpResponse::Ok().json(registrations))
}

#[utoipa::path(
    get,
    path = "/aggregate",
    params(("email" = Option<String>, Query, description = "Registrant email; must match the bearer token")),
    responses(
        (status = 200, description = "Marathons behind the caller's registrations, in registration order", body = [Marathon]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Email does not match the token")
    )
)]
pub async fn aggregate_marathons(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<OwnerQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_owner(query.email.as_deref())?;
    let paid_only = data.gateway.is_some();
    let registrations = data
        .repo
        .registrations_for_email(&auth.0.email, paid_only)
        .await?;
    // One lookup per registration. Quadratic-ish against the store, fine at
    // the volumes a single organizer produces.
    let mut marathons = Vec::with_capacity(registrations.len());
    for registration in &registrations {
        let Some(raw) = registration.marathon_id.as_deref() else { continue };
        let Ok(id) = ObjectId::parse_str(raw) else { continue };
        if let Some(marathon) = data.repo.get_marathon(id).await? {
            marathons.push(marathon);
        }
    }
    Ok(HttpResponse::Ok().json(marathons))
}

/// Gateway success callback. The transaction id is the only credential; the
/// pending-state check is what stops replays from double counting.
pub async fn payment_success(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tran_id = path.into_inner();
    match data.repo.mark_paid(&tran_id).await? {
        Some(registration) => {
            if let Some(raw) = registration.marathon_id.as_deref() {
                if let Ok(marathon_id) = ObjectId::parse_str(raw) {
                    data.repo.adjust_reg_count(marathon_id, 1).await?;
                }
            }
            Ok(redirect(format!("{}/success/{}", data.urls.client_base, tran_id)))
        }
        None => Ok(redirect(format!("{}/failed", data.urls.client_base))),
    }
}

/// Gateway failure callback; nothing to correlate, just send the browser back.
pub async fn payment_failed(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(redirect(format!("{}/failed", data.urls.client_base)))
}
