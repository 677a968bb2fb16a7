use utoipa::OpenApi;

use super::handlers::{health, session};

#[derive(OpenApi)]
#[openapi(
    paths(health::health, session::session, session::logout),
    components(schemas(health::Health, session::SessionResponse)),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Identity resolution and session governance")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_documents_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert!(paths.contains(&"/health"));
        assert!(paths.contains(&"/v1/auth/session"));
        assert!(paths.contains(&"/v1/auth/logout"));
    }
}
