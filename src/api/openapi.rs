//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{admin, auth, authorities, health, public, scans, users, works};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Musicat API",
        version = "1.0.0",
        description = "MARC21 cataloging of printed and manuscript music"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&BearerAuth),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        auth::change_password,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::delete_user,
        // Works
        works::list_works,
        works::get_work,
        works::get_work_by_control_number,
        works::create_work,
        works::update_work,
        works::delete_work,
        works::restore_work,
        works::get_work_marc,
        // Scans
        scans::list_scans,
        scans::upload_scan,
        scans::reorder_scans,
        scans::update_scan,
        scans::delete_scan,
        scans::download_scan,
        // Authorities
        authorities::search_authorities,
        authorities::get_authority,
        authorities::create_authority,
        authorities::rename_authority,
        authorities::authority_usage,
        // Admin
        admin::purge,
        // Public
        public::list_works,
        public::get_work,
        public::get_work_marc,
        public::list_scans,
        public::download_scan,
    ),
    components(
        schemas(
            // Auth
            crate::models::user::LoginRequest,
            crate::models::user::LoginResponse,
            crate::models::user::ChangePassword,
            // Users
            crate::models::user::User,
            crate::models::user::CreateUser,
            crate::models::enums::UserRole,
            // Works
            crate::models::work::Work,
            crate::models::work::WorkDraft,
            crate::models::work::WorkSummary,
            crate::models::work::TitleStatement,
            crate::models::work::UniformTitleEntry,
            crate::models::work::AgentEntry,
            crate::models::work::Publication,
            crate::models::work::PhysicalDescription,
            crate::models::work::Identifier,
            crate::models::work::Incipit,
            crate::models::work::PerformancePart,
            crate::models::work::PerformanceMedium,
            crate::models::work::SeriesStatement,
            crate::models::work::Note,
            crate::models::work::WorkLink,
            crate::models::work::Location,
            crate::models::work::ElectronicAccess,
            crate::models::enums::RecordType,
            crate::models::enums::BibliographicLevel,
            crate::models::enums::IdentifierKind,
            crate::models::enums::NoteKind,
            crate::models::enums::LinkKind,
            crate::models::enums::AccessRelationship,
            crate::marc::MarcOutput,
            super::WorkPage,
            // Scans
            crate::models::scan::Scan,
            crate::models::scan::UpdateScan,
            crate::models::scan::ReorderScans,
            // Authorities
            crate::models::authority::Authority,
            crate::models::authority::AuthorityRef,
            crate::models::authority::AuthorityInput,
            crate::models::authority::AuthorityUsage,
            crate::models::enums::AuthorityKind,
            // Admin
            crate::services::catalog::PurgeReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::error::FieldError,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "User management"),
        (name = "works", description = "Bibliographic records of printed and manuscript music"),
        (name = "scans", description = "Digitized pages attached to works"),
        (name = "authorities", description = "Controlled headings shared across works"),
        (name = "admin", description = "Administration"),
        (name = "public", description = "Anonymous read-only catalog")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_catalog_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/works/{id}/marc"));
        assert!(doc.paths.paths.contains_key("/public/works"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
