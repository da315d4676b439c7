use std::future::{ready, Ready};

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::Cookie;
use actix_web::dev::Payload;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType, LOCATION};
use actix_web::http::StatusCode;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{self, AuthError, LoginForm, NewAccount, SignupForm, UserProfile};
use crate::data::{normalize, sample_table, RawTable, SchemaVariant};
use crate::database::{Database, StoreError, DEFAULT_LOAD_LIMIT};
use crate::error::PipelineError;
use crate::model::{self, GradePredictor, SplitParams, DEFAULT_SEED, DEFAULT_TEST_FRACTION};
use crate::pages;
use crate::pipeline::{self, DataSource};
use crate::remote::RemoteEndpoint;
use crate::session::{Page, Session, SessionStore, SESSION_COOKIE};

pub const MIN_TEST_SIZE: f64 = 0.1;
pub const MAX_TEST_SIZE: f64 = 0.5;
pub const MAX_RANDOM_STATE: i64 = 100;
pub const PROCESSED_CSV_NAME: &str = "processed_data.csv";

/// Shared by every worker; the only state that outlives a request.
pub struct AppState {
    pub db: Option<Database>,
    pub sessions: SessionStore,
    pub bcrypt_cost: u32,
    pub remote: Option<RemoteEndpoint>,
}

impl AppState {
    pub fn new(db: Option<Database>, bcrypt_cost: u32, remote: Option<RemoteEndpoint>) -> Self {
        AppState {
            db,
            sessions: SessionStore::new(),
            bcrypt_cost,
            remote,
        }
    }

    pub fn with_session_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.sessions = SessionStore::with_ttl(ttl);
        self
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please log in first")]
    Unauthorized,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Invalid request")]
    Validation(Vec<String>),
    #[error("{0}")]
    Unavailable(&'static str),
    #[error("Request body must be UTF-8 CSV text")]
    Encoding,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) | ApiError::Encoding => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pipeline(PipelineError::Remote(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Pipeline(PipelineError::Csv(_)) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Auth(AuthError::UsernameTaken | AuthError::EmailTaken) => StatusCode::CONFLICT,
            ApiError::Auth(AuthError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::ConnectionFailed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Auth(_) | ApiError::Store(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details: &[String] = match self {
            ApiError::Validation(errors) | ApiError::Auth(AuthError::Validation(errors)) => errors,
            _ => &[],
        };
        if self.status_code().is_server_error() {
            warn!(error = %self, "request failed");
        }
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "details": details,
        }))
    }
}

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let session = match (req.app_data::<web::Data<AppState>>(), req.cookie(SESSION_COOKIE)) {
            (Some(state), Some(cookie)) => state.sessions.resolve(cookie.value()),
            _ => Session::LoggedOut,
        };
        ready(Ok(session))
    }
}

fn require_user(session: &Session) -> Result<&UserProfile, ApiError> {
    session.user().ok_or(ApiError::Unauthorized)
}

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    pub test_size: Option<f64>,
    pub random_state: Option<i64>,
}

impl RunQuery {
    pub fn params(&self) -> Result<SplitParams, ApiError> {
        let test_fraction = self.test_size.unwrap_or(DEFAULT_TEST_FRACTION);
        let seed = self.random_state.unwrap_or(DEFAULT_SEED as i64);

        let mut errors = Vec::new();
        if !(MIN_TEST_SIZE..=MAX_TEST_SIZE).contains(&test_fraction) {
            errors.push(format!(
                "test_size must be between {MIN_TEST_SIZE} and {MAX_TEST_SIZE}"
            ));
        }
        if !(0..=MAX_RANDOM_STATE).contains(&seed) {
            errors.push(format!("random_state must be between 0 and {MAX_RANDOM_STATE}"));
        }
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        Ok(SplitParams {
            test_fraction,
            seed: seed as u64,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub limit: Option<i64>,
}

/// An empty body selects the built-in sample.
fn upload_table(body: &[u8]) -> Result<(RawTable, DataSource), ApiError> {
    let text = std::str::from_utf8(body).map_err(|_| ApiError::Encoding)?;
    if text.trim().is_empty() {
        return Ok((sample_table(), DataSource::Sample));
    }
    Ok((RawTable::from_reader(text.as_bytes())?, DataSource::Uploaded))
}

fn attachment(filename: &str) -> ContentDisposition {
    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(filename.to_string())],
    }
}

fn html(page: Page) -> HttpResponse {
    let body = match page {
        Page::Login => pages::LOGIN_PAGE,
        Page::Signup => pages::SIGNUP_PAGE,
        Page::Dashboard => pages::DASHBOARD_PAGE,
    };
    HttpResponse::Ok().content_type("text/html").body(body)
}

async fn index(session: Session) -> HttpResponse {
    html(session.page(Page::Dashboard))
}

async fn signup_page(session: Session) -> HttpResponse {
    match session.page(Page::Signup) {
        Page::Signup => html(Page::Signup),
        _ => HttpResponse::Found().insert_header((LOCATION, "/")).finish(),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Student Performance Dashboard is running!")
}

async fn signup(
    state: web::Data<AppState>,
    form: web::Json<SignupForm>,
) -> Result<HttpResponse, ApiError> {
    auth::validate_signup(&form)?;
    auth::create_account(state.db.as_ref(), NewAccount::from(&*form), state.bcrypt_cost).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Account created successfully! Please log in."
    })))
}

async fn login(
    state: web::Data<AppState>,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    if form.username.is_empty() || form.password.is_empty() {
        return Err(ApiError::Validation(vec![
            "Please enter both username and password".to_string(),
        ]));
    }

    let profile = auth::authenticate(state.db.as_ref(), &form.username, &form.password)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let token = state.sessions.open(profile.clone());
    info!(username = %profile.username, "user logged in");

    let max_age = i64::try_from(state.sessions.ttl().as_secs()).unwrap_or(i64::MAX);
    let cookie = Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(max_age))
        .finish();
    Ok(HttpResponse::Ok().cookie(cookie).json(profile))
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        state.sessions.close(cookie.value());
    }
    let mut removal = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    removal.make_removal();
    HttpResponse::Ok()
        .cookie(removal)
        .json(json!({ "message": "Logged out" }))
}

async fn me(session: Session) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(require_user(&session)?))
}

fn run_dashboard(
    user: &UserProfile,
    table: &RawTable,
    source: DataSource,
    params: SplitParams,
) -> Result<HttpResponse, ApiError> {
    let run = pipeline::run(table, source, params)?;
    let dashboard = run.dashboard(&user.username, Local::now().naive_local());
    Ok(HttpResponse::Ok().json(dashboard))
}

async fn sample(session: Session, query: web::Query<RunQuery>) -> Result<HttpResponse, ApiError> {
    let user = require_user(&session)?;
    run_dashboard(user, &sample_table(), DataSource::Sample, query.params()?)
}

async fn predict(
    session: Session,
    query: web::Query<RunQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&session)?;
    let params = query.params()?;
    let (table, source) = upload_table(&body)?;
    run_dashboard(user, &table, source, params)
}

async fn export_csv(session: Session, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    require_user(&session)?;
    let (table, _) = upload_table(&body)?;
    let csv = normalize(&table)?.to_csv()?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header(attachment(PROCESSED_CSV_NAME))
        .body(csv))
}

async fn export_log(
    session: Session,
    query: web::Query<RunQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&session)?;
    let params = query.params()?;
    let (table, source) = upload_table(&body)?;

    let run = pipeline::run(&table, source, params)?;
    let timestamp = Local::now().naive_local();

    Ok(HttpResponse::Ok()
        .content_type("text/plain")
        .insert_header(attachment(&crate::report::log_file_name(timestamp)))
        .body(run.log(&user.username, timestamp)))
}

fn store(state: &AppState) -> Result<&Database, ApiError> {
    state
        .db
        .as_ref()
        .ok_or(ApiError::Unavailable("Database connection failed"))
}

async fn save_records(
    state: web::Data<AppState>,
    session: Session,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&session)?;
    let db = store(&state)?;
    let (table, _) = upload_table(&body)?;

    let dataset = normalize(&table)?;
    if dataset.schema() != SchemaVariant::Detailed {
        return Err(ApiError::Validation(vec![
            "Only detailed uploads can be saved".to_string(),
        ]));
    }

    let saved = db.save_records(&user.username, &dataset).await?;
    info!(username = %user.username, saved, "stored student records");
    Ok(HttpResponse::Created().json(json!({ "saved": saved })))
}

async fn load_records(
    state: web::Data<AppState>,
    session: Session,
    query: web::Query<RecordsQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&session)?;
    let db = store(&state)?;

    let limit = query.limit.unwrap_or(DEFAULT_LOAD_LIMIT);
    if limit < 1 {
        return Err(ApiError::Validation(vec!["limit must be positive".to_string()]));
    }

    let records = db.load_records(&user.username, limit).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[derive(Debug, Serialize)]
struct RemotePrediction {
    student: String,
    predicted: f64,
}

async fn predict_remote(
    state: web::Data<AppState>,
    session: Session,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    require_user(&session)?;
    let endpoint = state
        .remote
        .clone()
        .ok_or(ApiError::Unavailable("No prediction endpoint configured"))?;

    let (table, _) = upload_table(&body)?;
    let dataset = normalize(&table)?;
    let (features, _) = model::select_features(&dataset)?;
    let names = features.names().to_vec();

    // ureq blocks, so keep it off the async workers.
    let predictions = web::block(move || endpoint.predict(&features))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let rows: Vec<RemotePrediction> = predictions
        .into_iter()
        .enumerate()
        .map(|(row, predicted)| RemotePrediction {
            student: dataset.record(row).student_id.unwrap_or_else(|| row.to_string()),
            predicted,
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "features": names,
        "predictions": rows,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/signup", web::get().to(signup_page))
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api")
                .route("/signup", web::post().to(signup))
                .route("/login", web::post().to(login))
                .route("/logout", web::post().to(logout))
                .route("/me", web::get().to(me))
                .route("/sample", web::get().to(sample))
                .route("/predict", web::post().to(predict))
                .route("/predict/remote", web::post().to(predict_remote))
                .route("/export/csv", web::post().to(export_csv))
                .route("/export/log", web::post().to(export_log))
                .service(
                    web::resource("/records")
                        .route(web::post().to(save_records))
                        .route(web::get().to(load_records)),
                ),
        );
}
