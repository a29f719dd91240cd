use crate::models::{
    DeleteOutcome, InsertOutcome, Marathon, Registration, RegistrationStatus, UpdateOutcome,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::featured_marathons,
        crate::routes::upcoming_marathons,
        crate::routes::all_marathons,
        crate::routes::all_marathons_without_email,
        crate::routes::get_marathon,
        crate::routes::create_marathon,
        crate::routes::replace_marathon,
        crate::routes::increment_reg_count,
        crate::routes::decrement_reg_count,
        crate::routes::delete_marathon,
        crate::routes::create_registration,
        crate::routes::get_registration,
        crate::routes::replace_registration,
        crate::routes::delete_registration,
        crate::routes::applied_registrations,
        crate::routes::aggregate_marathons,
    ),
    components(schemas(
        Marathon, Registration, RegistrationStatus,
        InsertOutcome, UpdateOutcome, DeleteOutcome
    )),
    tags(
        (name = "marathons", description = "Marathon event operations"),
        (name = "registrations", description = "Registration and checkout operations"),
    )
)]
pub struct ApiDoc;
