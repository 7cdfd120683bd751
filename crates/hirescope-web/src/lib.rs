//! Axum JSON endpoints over the filter engine.
//!
//! Every request builds its own [`FilterSession`] from query parameters; only
//! the listing catalog and the facet configuration are shared.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hirescope_core::DataUnavailableError;
use hirescope_filter::{
    FacetConfig, FacetCount, FacetGroup, FacetStore, FilterCriteria, FilterSession, ResultPage,
    ValidationError, VisibleResults,
};
use hirescope_storage::{AdminPage, HttpClientConfig, ListingCatalog, ListingsLocation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "hirescope-web";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub listings: ListingsLocation,
    pub facets_path: Option<PathBuf>,
    pub http: HttpClientConfig,
}

impl WebConfig {
    pub fn from_env() -> Self {
        let mut http = HttpClientConfig::default();
        if let Some(secs) = std::env::var("HIRESCOPE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            http.timeout = Duration::from_secs(secs);
        }
        http.user_agent = Some(
            std::env::var("HIRESCOPE_USER_AGENT").unwrap_or_else(|_| "hirescope/0.1".to_string()),
        );
        Self {
            port: std::env::var("HIRESCOPE_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            listings: ListingsLocation::parse(
                &std::env::var("HIRESCOPE_LISTINGS")
                    .unwrap_or_else(|_| "./fixtures/listings.json".to_string()),
            ),
            facets_path: std::env::var("HIRESCOPE_FACETS").ok().map(PathBuf::from),
            http,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ListingCatalog>,
    pub facets: Arc<FacetStore>,
}

impl AppState {
    pub fn new(catalog: ListingCatalog, facets: FacetStore) -> Self {
        Self {
            catalog: Arc::new(catalog),
            facets: Arc::new(facets),
        }
    }

    pub async fn from_config(config: &WebConfig) -> anyhow::Result<Self> {
        let facet_config = match &config.facets_path {
            Some(path) => FacetConfig::load(path)?,
            None => FacetConfig::builtin(),
        };
        let facets = FacetStore::from_config(facet_config)?;
        let source = config.listings.open(config.http.clone())?;
        let catalog = ListingCatalog::load(source).await;
        Ok(Self::new(catalog, facets))
    }

    fn session(&self) -> FilterSession {
        FilterSession::new(FacetStore::clone(&self.facets))
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Unavailable {
        reason: String,
        page: ResultPage,
        criteria: Box<FilterCriteria>,
        facets: Vec<FacetGroup>,
    },
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response()
            }
            ApiError::Unavailable {
                reason,
                page,
                criteria,
                facets,
            } => {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": format!("listing data unavailable: {reason}"),
                        "noData": true,
                        "page": page,
                        "facets": facets,
                        "criteria": criteria,
                    })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetGroupView {
    #[serde(flatten)]
    pub group: FacetGroup,
    pub counts: Vec<FacetCount>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingsResponse {
    pub page: ResultPage,
    pub facets: Vec<FacetGroupView>,
    pub criteria: FilterCriteria,
}

#[derive(Debug, Deserialize, Default)]
struct AdminListingsQuery {
    page: Option<usize>,
    per_page: Option<usize>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/listings", get(listings_handler))
        .route("/facets", get(facets_handler))
        .route("/admin/listings", get(admin_listings_handler))
        .route("/admin/refresh", post(admin_refresh_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: WebConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config).await?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, listings = ?config.listings, "hirescope web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(WebConfig::from_env()).await
}

/// Build a fresh session from raw query pairs, applied as one batch.
pub fn session_from_query(
    base: FilterSession,
    pairs: &[(String, String)],
) -> Result<FilterSession, ValidationError> {
    let mut session = base;
    session.apply_assignments(pairs.iter().map(|(name, value)| (name.as_str(), value.as_str())))?;
    Ok(session)
}

async fn healthz_handler(State(state): State<Arc<AppState>>) -> Response {
    let listings = state.catalog.snapshot().await.ok().map(|s| s.listings.len());
    Json(json!({ "status": "ok", "listings": listings })).into_response()
}

async fn listings_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListingsResponse>, ApiError> {
    let session = session_from_query(state.session(), &pairs)?;
    let snapshot = state.catalog.snapshot().await;
    let listings = snapshot.as_ref().map(|s| s.listings.as_slice());

    let page = match session.visible_results(listings) {
        VisibleResults::Ready { page } => page,
        VisibleResults::NoData { reason, page } => {
            warn!(%reason, "listings requested while catalog unavailable");
            return Err(ApiError::Unavailable {
                reason,
                page,
                criteria: Box::new(session.criteria().clone()),
                facets: session.facets().groups().to_vec(),
            });
        }
    };

    let listings = listings.unwrap_or_default();
    let facets = session
        .facets()
        .groups()
        .iter()
        .map(|group| FacetGroupView {
            group: group.clone(),
            counts: session.facet_counts(listings, group.kind()),
        })
        .collect();

    Ok(Json(ListingsResponse {
        page,
        facets,
        criteria: session.criteria().clone(),
    }))
}

async fn facets_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.session().facets().groups().to_vec()).into_response()
}

async fn admin_listings_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListingsQuery>,
) -> Response {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(20);
    match state.catalog.fetch_page(page, per_page).await {
        Ok(page) => Json::<AdminPage>(page).into_response(),
        Err(err) => unavailable(err),
    }
}

async fn admin_refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.catalog.refresh().await {
        Ok(count) => Json(json!({ "listings": count })).into_response(),
        Err(err) => unavailable(err),
    }
}

fn unavailable(err: DataUnavailableError) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": err.to_string(), "noData": true })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use hirescope_core::Listing;
    use hirescope_storage::{FileListingSource, StaticListingSource};
    use http_body_util::BodyExt;
    use std::path::Path;
    use tower::ServiceExt;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .unwrap()
    }

    fn listings() -> Vec<Listing> {
        vec![
            Listing::new(1, "Backend Engineer")
                .with_category("tech")
                .with_destination(0, 10)
                .with_salary(1_000, 2_000)
                .with_job_types(["Full Time"]),
            Listing::new(2, "Backend Lead")
                .with_category("tech")
                .with_destination(0, 10)
                .with_salary(1_000, 2_000)
                .with_job_types(["Part Time"]),
            Listing::new(3, "Designer")
                .with_category("design")
                .with_destination(0, 10)
                .with_salary(1_000, 2_000)
                .with_job_types(["Full Time"]),
        ]
    }

    async fn static_app() -> Router {
        let catalog = ListingCatalog::load(Arc::new(StaticListingSource::new(listings()))).await;
        app(AppState::new(catalog, FacetStore::builtin()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn ids(body: &serde_json::Value) -> Vec<u64> {
        body["page"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["id"].as_u64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn listings_apply_query_criteria() {
        let (status, body) = get_json(static_app().await, "/listings?keyword=backend&sort=des").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec![2, 1]);
        assert_eq!(body["page"]["totalMatched"], 2);
        assert_eq!(body["criteria"]["keyword"], "backend");
    }

    #[tokio::test]
    async fn repeated_set_params_accumulate_and_flag_facets() {
        let (status, body) =
            get_json(static_app().await, "/listings?jobTypes=full-time&jobTypes=part-time&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec![1, 2]);
        assert_eq!(body["page"]["totalMatched"], 3);

        let job_types = &body["facets"][0];
        assert_eq!(job_types["kind"], "jobTypes");
        let values = job_types["values"].as_array().unwrap();
        assert_eq!(values[0]["isSelected"], true);
        assert_eq!(values[1]["isSelected"], true);
        assert_eq!(values[2]["isSelected"], false);
        assert_eq!(job_types["counts"][0]["count"], 2);
    }

    #[tokio::test]
    async fn invalid_range_is_bad_request() {
        let (status, body) =
            get_json(static_app().await, "/listings?salaryMin=5000&salaryMax=10").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("salary"));

        let (status, _) = get_json(static_app().await, "/listings?bogus=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn range_halves_are_order_independent() {
        for uri in [
            "/listings?salaryMin=25000&salaryMax=30000",
            "/listings?salaryMax=30000&salaryMin=25000",
            "/listings?destinationMin=150&destinationMax=200",
        ] {
            let (status, body) = get_json(static_app().await, uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body["page"]["totalMatched"], 0, "{uri}");
        }

        let (_, body) = get_json(static_app().await, "/listings?salaryMin=25000&salaryMax=30000").await;
        assert_eq!(body["criteria"]["salary"]["min"], 25000);
        assert_eq!(body["criteria"]["salary"]["max"], 30000);
    }

    #[tokio::test]
    async fn missing_data_is_signalled_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FileListingSource::new(dir.path().join("gone.json")));
        let app = app(AppState::new(ListingCatalog::load(source).await, FacetStore::builtin()));

        let (status, body) = get_json(app.clone(), "/listings").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["noData"], true);
        assert!(body["page"]["items"].as_array().unwrap().is_empty());

        let (_, health) = get_json(app, "/healthz").await;
        assert!(health["listings"].is_null());
    }

    #[tokio::test]
    async fn facets_endpoint_has_nothing_selected() {
        let (status, body) = get_json(static_app().await, "/facets").await;
        assert_eq!(status, StatusCode::OK);
        let groups = body.as_array().unwrap();
        assert_eq!(groups.len(), 4);
        assert!(groups
            .iter()
            .flat_map(|g| g["values"].as_array().unwrap())
            .all(|v| v["isSelected"] == false));
    }

    #[tokio::test]
    async fn admin_pagination_clamps() {
        let (status, body) = get_json(static_app().await, "/admin/listings?page=7&per_page=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 2);
        assert_eq!(body["totalPages"], 2);
        assert_eq!(body["items"][0]["id"], 3);
    }

    #[tokio::test]
    async fn admin_refresh_reports_count() {
        let resp = static_app()
            .await
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/admin/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn workspace_fixture_loads() {
        let source = Arc::new(FileListingSource::new(workspace_root().join("fixtures/listings.json")));
        let app = app(AppState::new(ListingCatalog::load(source).await, FacetStore::builtin()));
        let (status, body) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["listings"].as_u64().unwrap() > 0);
    }

    #[test]
    fn session_from_query_is_per_request() {
        let base = FilterSession::default();
        let pairs = vec![
            ("experienceLevels".to_string(), "Mid Level".to_string()),
            ("experience_levels".to_string(), "director".to_string()),
            ("tag".to_string(), "Remote".to_string()),
        ];
        let session = session_from_query(base.clone(), &pairs).unwrap();
        assert_eq!(session.criteria().experience_levels().len(), 2);
        assert_eq!(session.criteria().tag(), "Remote");
        assert!(session.facets().is_consistent_with(session.criteria()));
        assert!(base.criteria().is_default());
    }
}
