//! OpenAPI document and Swagger UI mount for the webhook surface.

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "jewelbot-api",
        description = "WhatsApp commerce bot webhooks: messaging events and payment notifications"
    ),
    paths(
        crate::handlers::whatsapp::verify_subscription,
        crate::handlers::whatsapp::receive_event,
        crate::handlers::payments::payment_webhook,
        crate::handlers::payments::payment_callback,
    ),
    components(schemas(crate::errors::ErrorResponse)),
    tags(
        (name = "WhatsApp", description = "Inbound messaging webhook"),
        (name = "Payments", description = "Payment gateway notifications")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
