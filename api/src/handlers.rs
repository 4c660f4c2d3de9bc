use crate::headers::AlertHeaders;
use crate::pagination::{self, PaginationConfig};
use application::{ApplicationError, AuthorService, ENTITY_NAME, SaveOutcome};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use domain::{Author, AuthorId};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const AUTHORS_URL: &str = "/api/authors";
const AUTHORS_SEARCH_URL: &str = "/api/_search/authors";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub author_service: Arc<AuthorService>,
    pub alerts: Arc<AlertHeaders>,
    pub pagination: PaginationConfig,
}

/// Builds the HTTP router for the Author resource.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/authors",
            get(list_authors_handler)
                .post(create_author_handler)
                .put(update_author_handler),
        )
        .route(
            "/api/authors/:id",
            get(get_author_handler).delete(delete_author_handler),
        )
        .route("/api/_search/authors", get(search_authors_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- API Handlers ---

async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (StatusCode::OK, "OK")
}

/// POST /api/authors
async fn create_author_handler(
    State(state): State<AppState>,
    Json(author): Json<Author>,
) -> Response {
    debug!(?author, "REST request to save Author");
    match state.author_service.create(author).await {
        Ok(created) => created_response(&state, created),
        Err(e) => map_application_error_to_response(&state.alerts, e),
    }
}

/// PUT /api/authors
async fn update_author_handler(
    State(state): State<AppState>,
    Json(author): Json<Author>,
) -> Response {
    debug!(?author, "REST request to update Author");
    match state.author_service.update(author).await {
        Ok(SaveOutcome::Created(created)) => created_response(&state, created),
        Ok(SaveOutcome::Updated(updated)) => {
            let headers = state
                .alerts
                .entity_updated(ENTITY_NAME, &id_param(&updated));
            (StatusCode::OK, headers, Json(updated)).into_response()
        }
        Err(e) => map_application_error_to_response(&state.alerts, e),
    }
}

/// GET /api/authors
async fn list_authors_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    debug!("REST request to get a page of Authors");
    let request = match pagination::page_request(&params, &state.pagination) {
        Ok(request) => request,
        Err(e) => return map_application_error_to_response(&state.alerts, e),
    };

    match state.author_service.find_all(&request).await {
        Ok(page) => {
            let headers = pagination::pagination_headers(&page, AUTHORS_URL);
            (StatusCode::OK, headers, Json(page.content)).into_response()
        }
        Err(e) => map_application_error_to_response(&state.alerts, e),
    }
}

/// GET /api/authors/:id
async fn get_author_handler(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    debug!(author_id = id, "REST request to get Author");
    match state.author_service.find_one(AuthorId::new(id)).await {
        Ok(Some(author)) => (StatusCode::OK, Json(author)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => map_application_error_to_response(&state.alerts, e),
    }
}

/// DELETE /api/authors/:id
async fn delete_author_handler(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    debug!(author_id = id, "REST request to delete Author");
    let id = AuthorId::new(id);
    match state.author_service.delete(id).await {
        Ok(()) => {
            let headers = state.alerts.entity_deleted(ENTITY_NAME, &id.to_string());
            (StatusCode::OK, headers).into_response()
        }
        Err(e) => map_application_error_to_response(&state.alerts, e),
    }
}

/// GET /api/_search/authors?query=
async fn search_authors_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let query = params
        .iter()
        .find(|(key, _)| key == "query")
        .map(|(_, value)| value.as_str())
        .unwrap_or_default();
    debug!(query, "REST request to search for a page of Authors");

    let request = match pagination::page_request(&params, &state.pagination) {
        Ok(request) => request,
        Err(e) => return map_application_error_to_response(&state.alerts, e),
    };

    match state.author_service.search(query, &request).await {
        Ok(page) => {
            let headers = pagination::search_pagination_headers(query, &page, AUTHORS_SEARCH_URL);
            (StatusCode::OK, headers, Json(page.content)).into_response()
        }
        Err(e) => map_application_error_to_response(&state.alerts, e),
    }
}

fn created_response(state: &AppState, author: Author) -> Response {
    let id = id_param(&author);
    let mut headers: HeaderMap = state.alerts.entity_created(ENTITY_NAME, &id);
    if let Ok(location) = HeaderValue::from_str(&format!("{}/{}", AUTHORS_URL, id)) {
        headers.insert(header::LOCATION, location);
    }
    (StatusCode::CREATED, headers, Json(author)).into_response()
}

fn id_param(author: &Author) -> String {
    author.id.map(|id| id.to_string()).unwrap_or_default()
}

// --- Error Mapping ---

/// JSON problem body returned for every error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    title: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_name: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_key: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'static str>,
}

impl ErrorBody {
    fn plain(status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: status.as_u16(),
            entity_name: None,
            error_key: None,
            message: None,
            params: None,
        }
    }
}

fn problem(status: StatusCode, title: impl Into<String>) -> Response {
    (status, Json(ErrorBody::plain(status, title))).into_response()
}

/// Maps application errors to HTTP responses. Internal details are logged, never returned.
fn map_application_error_to_response(alerts: &AlertHeaders, err: ApplicationError) -> Response {
    match err {
        ApplicationError::BadRequestAlert {
            message,
            entity,
            error_key,
        } => {
            warn!(entity, error_key, "Bad request: {}", message);
            let body = ErrorBody {
                entity_name: Some(entity),
                error_key: Some(error_key),
                message: Some(format!("error.{}", error_key)),
                params: Some(entity),
                ..ErrorBody::plain(StatusCode::BAD_REQUEST, message)
            };
            (
                StatusCode::BAD_REQUEST,
                alerts.failure(entity, error_key),
                Json(body),
            )
                .into_response()
        }
        ApplicationError::InvalidInput(msg) => {
            warn!("Invalid input: {}", msg);
            problem(StatusCode::BAD_REQUEST, msg)
        }
        ApplicationError::DomainError(domain_err) => {
            warn!("Domain validation failed: {}", domain_err);
            problem(StatusCode::BAD_REQUEST, domain_err.to_string())
        }
        ApplicationError::RepositoryError(msg) | ApplicationError::IndexError(msg) => {
            error!("Underlying infrastructure error: {}", msg);
            problem(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred",
            )
        }
        ApplicationError::SearchError { source } => {
            error!("Search error: {}", source);
            problem(StatusCode::INTERNAL_SERVER_ERROR, "Search failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::{AuthorRepository, IndexOutbox, IndexSynchronizer, RetryPolicy};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use domain::{Page, PageRequest};
    use infrastructure::{InMemoryAuthorIndex, InMemoryAuthorRepository};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        index: Arc<InMemoryAuthorIndex>,
    }

    fn app_with(repo: Arc<dyn AuthorRepository>) -> TestApp {
        let index = Arc::new(InMemoryAuthorIndex::new());
        let sync = Arc::new(IndexSynchronizer::new(
            repo.clone(),
            index.clone(),
            Arc::new(IndexOutbox::new()),
            RetryPolicy::default(),
        ));
        let state = AppState {
            author_service: Arc::new(AuthorService::new(repo, index.clone(), sync)),
            alerts: Arc::new(AlertHeaders::new("myLibApp").unwrap()),
            pagination: PaginationConfig::default(),
        };
        TestApp {
            router: router(state),
            index,
        }
    }

    fn app() -> TestApp {
        app_with(Arc::new(InMemoryAuthorRepository::new()))
    }

    async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        app.router.clone().oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    async fn create(app: &TestApp, name: &str) -> Value {
        let response = send(app, Method::POST, "/api/authors", Some(json!({ "name": name }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let app = app();
        let response = send(&app, Method::GET, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"OK");
    }

    #[tokio::test]
    async fn create_get_delete_round_trip() {
        let app = app();

        let response = send(
            &app,
            Method::POST,
            "/api/authors",
            Some(json!({ "name": "Orwell" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(header_str(&response, "location"), "/api/authors/1");
        assert_eq!(header_str(&response, "x-mylibapp-alert"), "myLibApp.author.created");
        assert_eq!(header_str(&response, "x-mylibapp-params"), "1");
        assert_eq!(body_json(response).await, json!({ "id": 1, "name": "Orwell" }));
        assert!(app.index.contains(AuthorId::new(1)));

        let response = send(&app, Method::GET, "/api/authors/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "id": 1, "name": "Orwell" }));

        let response = send(&app, Method::DELETE, "/api/authors/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-mylibapp-alert"), "myLibApp.author.deleted");
        assert_eq!(header_str(&response, "x-mylibapp-params"), "1");
        assert!(body_bytes(response).await.is_empty());
        assert!(!app.index.contains(AuthorId::new(1)));

        let response = send(&app, Method::GET, "/api/authors/1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn create_with_id_is_rejected_without_writes() {
        let app = app();

        let response = send(
            &app,
            Method::POST,
            "/api/authors",
            Some(json!({ "id": 7, "name": "X" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(header_str(&response, "x-mylibapp-error"), "error.idexists");
        assert_eq!(header_str(&response, "x-mylibapp-params"), "author");
        let body = body_json(response).await;
        assert_eq!(body["errorKey"], "idexists");
        assert_eq!(body["entityName"], "author");
        assert_eq!(body["status"], 400);

        let response = send(&app, Method::GET, "/api/authors", None).await;
        assert_eq!(header_str(&response, "x-total-count"), "0");
        assert!(app.index.is_empty());
    }

    #[tokio::test]
    async fn update_without_id_creates() {
        let app = app();
        let response = send(&app, Method::PUT, "/api/authors", Some(json!({ "name": "Huxley" }))).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(header_str(&response, "location"), "/api/authors/1");
        assert_eq!(header_str(&response, "x-mylibapp-alert"), "myLibApp.author.created");
    }

    #[tokio::test]
    async fn update_existing_author_replaces_fields() {
        let app = app();
        create(&app, "Orwel").await;

        let response = send(
            &app,
            Method::PUT,
            "/api/authors",
            Some(json!({ "id": 1, "name": "Orwell" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-mylibapp-alert"), "myLibApp.author.updated");
        assert_eq!(header_str(&response, "x-mylibapp-params"), "1");

        let response = send(&app, Method::GET, "/api/authors/1", None).await;
        assert_eq!(body_json(response).await["name"], "Orwell");
    }

    #[tokio::test]
    async fn update_with_unknown_id_creates_under_that_id() {
        let app = app();

        let response = send(
            &app,
            Method::PUT,
            "/api/authors",
            Some(json!({ "id": 5, "name": "X" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-mylibapp-params"), "5");

        let response = send(&app, Method::GET, "/api/authors/5", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let next = create(&app, "Y").await;
        assert_eq!(next["id"], 6);
    }

    #[tokio::test]
    async fn create_after_max_id_fails_without_overwriting() {
        let app = app();
        let response = send(
            &app,
            Method::PUT,
            "/api/authors",
            Some(json!({ "id": i64::MAX, "name": "Explicit" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::POST, "/api/authors", Some(json!({ "name": "Generated" }))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = send(&app, Method::GET, "/api/authors/9223372036854775807", None).await;
        assert_eq!(body_json(response).await["name"], "Explicit");
    }

    #[tokio::test]
    async fn delete_of_missing_author_is_ok() {
        let app = app();
        let response = send(&app, Method::DELETE, "/api/authors/99", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-mylibapp-params"), "99");
    }

    #[tokio::test]
    async fn list_pages_with_total_count_and_links() {
        let app = app();
        for name in ["A", "B", "C", "D", "E"] {
            create(&app, name).await;
        }

        let response = send(&app, Method::GET, "/api/authors?page=0&size=2", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-total-count"), "5");
        assert_eq!(
            header_str(&response, "link"),
            "</api/authors?page=1&size=2>; rel=\"next\",\
             </api/authors?page=2&size=2>; rel=\"last\",\
             </api/authors?page=0&size=2>; rel=\"first\""
        );
        assert_eq!(
            body_json(response).await,
            json!([{ "id": 1, "name": "A" }, { "id": 2, "name": "B" }])
        );
    }

    #[tokio::test]
    async fn list_with_huge_page_number_is_empty() {
        let app = app();
        create(&app, "A").await;

        let response = send(
            &app,
            Method::GET,
            "/api/authors?page=18446744073709551615",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-total-count"), "1");
        assert!(!header_str(&response, "link").contains("rel=\"next\""));
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn list_honours_sort_parameter() {
        let app = app();
        for name in ["B", "C", "A"] {
            create(&app, name).await;
        }

        let response = send(&app, Method::GET, "/api/authors?sort=name,desc", None).await;

        let names: Vec<Value> = body_json(response)
            .await
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("C"), json!("B"), json!("A")]);
    }

    #[tokio::test]
    async fn list_rejects_unknown_sort_property() {
        let app = app();
        let response = send(&app, Method::GET, "/api/authors?sort=age", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["status"], 400);
    }

    #[tokio::test]
    async fn search_returns_matches_with_query_in_links() {
        let app = app();
        create(&app, "George Orwell").await;
        create(&app, "Aldous Huxley").await;

        let response = send(
            &app,
            Method::GET,
            "/api/_search/authors?query=george%20orwell",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-total-count"), "1");
        assert!(
            header_str(&response, "link")
                .contains("</api/_search/authors?page=0&size=20&query=george+orwell>; rel=\"first\"")
        );
        assert_eq!(
            body_json(response).await,
            json!([{ "id": 1, "name": "George Orwell" }])
        );
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_empty_array() {
        let app = app();
        let response = send(&app, Method::GET, "/api/_search/authors?query=orwell", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-total-count"), "0");
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn search_requires_a_query() {
        let app = app();
        for uri in [
            "/api/_search/authors",
            "/api/_search/authors?query=",
            "/api/_search/authors?query=%20%20",
            "/api/_search/authors?query=%22unterminated",
        ] {
            let response = send(&app, Method::GET, uri, None).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    struct FailingRepository;

    #[async_trait]
    impl AuthorRepository for FailingRepository {
        async fn save(&self, _author: &Author) -> Result<Author, ApplicationError> {
            Err(ApplicationError::RepositoryError("disk full".to_string()))
        }

        async fn find_all(&self, _page: &PageRequest) -> Result<Page<Author>, ApplicationError> {
            Err(ApplicationError::RepositoryError("disk full".to_string()))
        }

        async fn find_one(&self, _id: AuthorId) -> Result<Option<Author>, ApplicationError> {
            Err(ApplicationError::RepositoryError("disk full".to_string()))
        }

        async fn delete(&self, _id: AuthorId) -> Result<bool, ApplicationError> {
            Err(ApplicationError::RepositoryError("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn entity_store_failure_is_a_generic_server_error() {
        let app = app_with(Arc::new(FailingRepository));

        let response = send(&app, Method::POST, "/api/authors", Some(json!({ "name": "Orwell" }))).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["title"], "An internal server error occurred");
        assert!(!body.to_string().contains("disk full"));
        assert!(app.index.is_empty());

        let response = send(&app, Method::DELETE, "/api/authors/1", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
