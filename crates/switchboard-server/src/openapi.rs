use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::routes::status::status,
        super::routes::dispatch::dispatch,
        super::routes::sessions::turns,
    ),
    components(schemas(
        super::routes::status::StatusResponse,
        super::routes::status::CapabilityReport,
        super::routes::dispatch::DispatchPayload,
        super::routes::dispatch::DispatchAck,
        super::routes::sessions::TurnsResponse,
        switchboard::Turn,
        switchboard::Role,
        switchboard::CapabilityStatus,
    ))
)]
pub struct ApiDoc;

pub fn generate_schema() -> String {
    let api_doc = ApiDoc::openapi();
    serde_json::to_string_pretty(&api_doc).unwrap()
}
