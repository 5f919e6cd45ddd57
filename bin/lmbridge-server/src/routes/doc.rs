use utoipa::OpenApi;

use crate::routes::{echo, health, v1};

#[derive(OpenApi)]
#[openapi(info(
    title = "lmbridge-server",
    description = "OpenAI-compatible chat completions served by a local code model"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(echo::EchoApi::openapi());
    root.merge(v1::api_docs());
    root
}
