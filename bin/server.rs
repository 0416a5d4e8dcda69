// UK Household Food Trends - Web Server
// Read-only JSON API over the joined facts and every analysis

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use food_trends::{load_joined_facts, setup_database, Analysis, AnalyticsReport, JoinedFact};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

/// Snapshot of the joined view; every handler computes from this
fn joined_facts(state: &AppState) -> Result<Vec<JoinedFact>, Response> {
    let conn = state.db.lock().map_err(|_| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "database lock poisoned".to_string())
    })?;

    load_joined_facts(&conn).map_err(|e| {
        log::error!("Error reading joined facts: {:#}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/joined - Every joined (code, year) row
async fn get_joined(State(state): State<AppState>) -> Response {
    match joined_facts(&state) {
        Ok(facts) => ApiResponse::ok(facts),
        Err(response) => response,
    }
}

/// GET /api/analytics/:name - One analysis by name
async fn get_analysis(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let analysis: Analysis = match name.parse() {
        Ok(analysis) => analysis,
        Err(message) => return error_response(StatusCode::NOT_FOUND, message),
    };

    match joined_facts(&state) {
        Ok(facts) => ApiResponse::ok(analysis.run(&facts)),
        Err(response) => response,
    }
}

/// GET /api/report - Every analysis in one document
async fn get_report(State(state): State<AppState>) -> Response {
    match joined_facts(&state) {
        Ok(facts) => ApiResponse::ok(AnalyticsReport::build(&facts)),
        Err(response) => response,
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("🌐 UK Household Food Trends - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("FOOD_TRENDS_DB").unwrap_or_else(|_| "food_trends.db".to_string());
    let addr = std::env::var("FOOD_TRENDS_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    if !std::path::Path::new(&db_path).exists() {
        anyhow::bail!("database not found at {db_path} (run `food-trends init` and `food-trends load` first)");
    }

    let conn = Connection::open(&db_path)?;
    setup_database(&conn)?;
    println!("✓ Database opened: {}", db_path);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/joined", get(get_joined))
        .route("/analytics/:name", get(get_analysis))
        .route("/report", get(get_report))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    for analysis in Analysis::ALL {
        println!("   /api/analytics/{}", analysis);
    }
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}
