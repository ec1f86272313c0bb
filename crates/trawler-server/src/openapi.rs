use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Trawler API",
        version = "0.3.0",
        description = "Crawl orchestration: trigger crawls, schedule sources, inspect runs."
    ),
    paths(
        crate::routes::trigger_crawl,
        crate::routes::schedule,
        crate::routes::enqueue_run,
        crate::routes::list_runs,
        crate::routes::get_run,
        crate::routes::stats,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::TriggerCrawlRequest,
        crate::dto::TriggerCrawlResponse,
        crate::dto::ScheduleRequest,
        crate::dto::ScheduleResponse,
        crate::dto::EnqueueRequest,
        crate::dto::EnqueueResponse,
        crate::dto::RunResponse,
        crate::dto::RunListResponse,
        crate::dto::StatsResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "crawl", description = "Ad-hoc interactive crawls"),
        (name = "runs", description = "Scheduling and run lifecycle"),
        (name = "system", description = "Health and statistics"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "API key. Set via TRAWLER_SERVER_API_KEY environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
