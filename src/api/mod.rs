pub mod session;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::db::{create_pool, get_current_week, get_pick_history, init_database_with_pool, seed_data};
use crate::error::{AppError, AppResult};
use crate::models::{
    ApiResponse, DashboardSummary, LeaderboardEntry, LoginRequest, MatchView, PickHistoryEntry, PickRequest,
    RecordedResult, ResultRequest, WeekInfo,
};
use crate::services::{
    dashboard, leaderboard, pending_results, record_result, submit_pick, week_board, week_overview, PickSubmission,
    ScheduleFetcher,
};
use session::{cleared_session_cookie, issue_token, session_cookie, AdminUser, CurrentUser};

/// Shared per-process state: the pool and the configuration built at startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }
}

pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let pool = create_pool(&config.database_url).await?;
    init_database_with_pool(&pool).await?;
    seed_data(&pool, &config).await?;

    if config.espn_sync {
        let week = get_current_week(&pool, config.current_week_override).await?;
        let outcome = ScheduleFetcher::new(&config)?.sync_week(&pool, week).await?;
        tracing::info!("Startup schedule sync for week {}: {:?}", week, outcome.source);
    }

    let address = config.server_address();
    let app = create_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Pick'em API server listening on {}", address);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/users", get(list_users_handler))
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/api/all-picks", get(all_picks_handler))
        .route("/api/available-weeks", get(available_weeks_handler))
        .route("/api/matches", get(matches_handler))
        .route("/api/picks", post(save_pick_handler))
        .route("/api/admin/results", post(record_result_handler))
        .route("/api/admin/pending-results", get(pending_results_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
}

async fn health_check() -> Json<ApiResponse<HealthPayload>> {
    Json(ApiResponse::success(HealthPayload { status: "ok" }))
}

// GET /api/users - names for the login dropdown
#[derive(Serialize)]
struct UsersPayload {
    users: Vec<String>,
}

async fn list_users_handler(State(state): State<AppState>) -> Json<ApiResponse<UsersPayload>> {
    let users = state.config.users.iter().map(|u| u.name.clone()).collect();
    Json(ApiResponse::success(UsersPayload { users }))
}

// POST /api/login
#[derive(Serialize)]
struct LoginPayload {
    username: String,
    token: String,
    is_admin: bool,
}

async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = body?;
    let username = request
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::bad_request("Benutzername erforderlich"))?;

    let Some(user) = state.config.find_user_by_name(&username) else {
        tracing::warn!("Login attempt with unknown name '{}'", username);
        return Err(AppError::Unauthorized);
    };

    let token = issue_token(&state.config, user)?;
    let mut headers = HeaderMap::new();
    if let Some(cookie) = session_cookie(&token, &state.config) {
        headers.insert(header::SET_COOKIE, cookie);
    }

    tracing::info!("{} logged in", user.name);
    let payload = LoginPayload {
        username: user.name.clone(),
        token,
        is_admin: state.config.is_admin(&user.name),
    };
    let message = format!("Willkommen, {}!", user.name);
    Ok((headers, Json(ApiResponse::with_message(payload, message))))
}

// POST /api/logout
async fn logout_handler() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, cleared_session_cookie());
    (headers, Json(ApiResponse::message("Erfolgreich abgemeldet")))
}

// GET /api/dashboard
async fn dashboard_handler(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<ApiResponse<DashboardSummary>>> {
    let summary = dashboard(&state.pool, &state.config, user.id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

// GET /api/leaderboard
#[derive(Serialize)]
struct LeaderboardPayload {
    leaderboard: Vec<LeaderboardEntry>,
}

async fn leaderboard_handler(State(state): State<AppState>) -> AppResult<Json<ApiResponse<LeaderboardPayload>>> {
    let board = leaderboard(&state.pool, state.config.rank_policy).await?;
    Ok(Json(ApiResponse::success(LeaderboardPayload { leaderboard: board })))
}

// GET /api/all-picks
#[derive(Serialize)]
struct AllPicksPayload {
    picks: Vec<PickHistoryEntry>,
}

async fn all_picks_handler(State(state): State<AppState>) -> AppResult<Json<ApiResponse<AllPicksPayload>>> {
    let picks = get_pick_history(&state.pool).await?;
    Ok(Json(ApiResponse::success(AllPicksPayload { picks })))
}

// GET /api/available-weeks
#[derive(Serialize)]
struct WeeksPayload {
    weeks: Vec<WeekInfo>,
    current_week: i64,
}

async fn available_weeks_handler(State(state): State<AppState>) -> AppResult<Json<ApiResponse<WeeksPayload>>> {
    let (weeks, current_week) = week_overview(&state.pool, &state.config).await?;
    Ok(Json(ApiResponse::success(WeeksPayload { weeks, current_week })))
}

// GET /api/matches?week=N
#[derive(Deserialize)]
struct MatchesQuery {
    week: Option<i64>,
}

#[derive(Serialize)]
struct MatchesPayload {
    week: i64,
    matches: Vec<MatchView>,
    picks: BTreeMap<String, i64>,
    unpickable_teams: Vec<i64>,
}

async fn matches_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    query: Result<Query<MatchesQuery>, axum::extract::rejection::QueryRejection>,
) -> AppResult<Json<ApiResponse<MatchesPayload>>> {
    let Query(params) = query.map_err(|_| AppError::bad_request("Ungültige Woche"))?;
    let week = match params.week {
        Some(week) => week,
        None => get_current_week(&state.pool, state.config.current_week_override).await?,
    };
    if !(1..=crate::config::SEASON_WEEKS).contains(&week) {
        return Err(AppError::bad_request("Ungültige Woche"));
    }

    let board = week_board(&state.pool, user.id, week).await?;
    Ok(Json(ApiResponse::success(MatchesPayload {
        week,
        matches: board.matches,
        picks: board.picks,
        unpickable_teams: board.unpickable_teams,
    })))
}

// POST /api/picks
#[derive(Serialize)]
struct SavedPickPayload {
    week: i64,
    match_id: i64,
    team_id: i64,
}

async fn save_pick_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<Json<PickRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<SavedPickPayload>>> {
    let Json(request) = body?;
    let (Some(match_id), Some(team_id)) = (request.match_id, request.team_id) else {
        return Err(AppError::bad_request("Spiel und Team erforderlich"));
    };

    let saved = submit_pick(
        &state.pool,
        user.id,
        PickSubmission {
            match_id,
            team_id,
            week: request.week,
        },
        Utc::now(),
    )
    .await?;

    let message = format!("Pick gespeichert: {}", saved.team.name);
    Ok(Json(ApiResponse::with_message(
        SavedPickPayload {
            week: saved.pick.week,
            match_id: saved.pick.match_id,
            team_id: saved.pick.team_id,
        },
        message,
    )))
}

// POST /api/admin/results
async fn record_result_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    body: Result<Json<ResultRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<RecordedResult>>> {
    let Json(request) = body?;
    let (Some(match_id), Some(home_score), Some(away_score)) =
        (request.match_id, request.home_score, request.away_score)
    else {
        return Err(AppError::bad_request("Spiel und Ergebnis erforderlich"));
    };

    let result = record_result(&state.pool, match_id, home_score, away_score, &admin.name, Utc::now()).await?;
    Ok(Json(ApiResponse::with_message(result, "Ergebnis gespeichert")))
}

// GET /api/admin/pending-results
#[derive(Serialize)]
struct PendingPayload {
    matches: Vec<MatchView>,
}

async fn pending_results_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<PendingPayload>>> {
    let matches = pending_results(&state.pool, Utc::now()).await?;
    Ok(Json(ApiResponse::success(PendingPayload { matches })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_matches_by_week, test_pool};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> (Router, AppState) {
        let state = AppState::new(test_pool().await, AppConfig::default());
        (create_router(state.clone()), state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn login(app: &Router, name: &str) -> String {
        let (status, body) = send(app, post_json("/api/login", None, json!({"username": name}))).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn login_sets_cookie_and_rejects_unknown_names() {
        let (app, _) = test_app().await;

        let response = app
            .clone()
            .oneshot(post_json("/api/login", None, json!({"username": "Daniel"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("pickem_session="));

        let (status, body) = send(&app, post_json("/api/login", None, json!({"username": "Mallory"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));

        let (status, body) = send(&app, post_json("/api/login", None, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("Benutzername erforderlich"));
    }

    #[tokio::test]
    async fn dashboard_requires_session() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, get_with("/api/dashboard", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], json!("Nicht angemeldet"));

        let (status, _) = send(&app, get_with("/api/dashboard", Some("not-a-token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn manuel_dashboard_via_cookie() {
        let (app, _) = test_app().await;
        let token = login(&app, "Manuel").await;

        let request = Request::get("/api/dashboard")
            .header(header::COOKIE, format!("pickem_session={}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["total_points"], json!(1));
        assert_eq!(body["total_picks"], json!(2));
        assert_eq!(body["current_week"], json!(3));
    }

    #[tokio::test]
    async fn leaderboard_and_weeks_are_public() {
        let (app, _) = test_app().await;

        let (status, body) = send(&app, get_with("/api/leaderboard", None)).await;
        assert_eq!(status, StatusCode::OK);
        let board = body["leaderboard"].as_array().unwrap();
        assert_eq!(board.len(), 4);
        assert_eq!(board[0]["rank"], json!(1));
        assert_eq!(board[3]["username"], json!("Manuel"));

        let (status, body) = send(&app, get_with("/api/available-weeks", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["weeks"].as_array().unwrap().len(), 18);
        assert_eq!(body["weeks"][0]["status"], json!("completed"));

        let (_, body) = send(&app, get_with("/api/all-picks", None)).await;
        assert_eq!(body["picks"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn matches_and_pick_validation() {
        let (app, state) = test_app().await;
        let token = login(&app, "Raff").await;

        let (status, body) = send(&app, get_with("/api/matches?week=3", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matches"].as_array().unwrap().len(), 16);
        assert_eq!(body["unpickable_teams"], json!([]));

        let (status, _) = send(&app, get_with("/api/matches?week=19", Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // the seeded season lies in the past, so kickoff has passed
        let game = get_matches_by_week(&state.pool, 3).await.unwrap().remove(0);
        let pick = json!({"match_id": game.id, "team_id": game.home_team_id, "week": 3});
        let (status, body) = send(&app, post_json("/api/picks", Some(&token), pick)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("Spiel hat bereits begonnen"));

        let (status, _) = send(&app, post_json("/api/picks", Some(&token), json!({"match_id": 9999, "team_id": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, post_json("/api/picks", Some(&token), json!({"team_id": 1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, post_json("/api/picks", None, json!({"match_id": 1, "team_id": 1}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_endpoints_require_admin() {
        let (app, state) = test_app().await;
        let daniel = login(&app, "Daniel").await;
        let manuel = login(&app, "Manuel").await;

        let (status, _) = send(&app, get_with("/api/admin/pending-results", Some(&daniel))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, get_with("/api/admin/pending-results", Some(&manuel))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["matches"].as_array().unwrap().is_empty());

        let game = get_matches_by_week(&state.pool, 3).await.unwrap().remove(0);
        let result = json!({"match_id": game.id, "home_score": 24, "away_score": 17});

        let (status, _) = send(&app, post_json("/api/admin/results", Some(&daniel), result.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, post_json("/api/admin/results", Some(&manuel), result)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["winner_team_id"], json!(game.home_team_id));

        let (status, _) = send(&app, post_json("/api/admin/results", Some(&manuel), json!({"match_id": game.id}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(Request::post("/api/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
