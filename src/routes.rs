// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{games, leaderboard, play, players, questions},
    state::AppState,
};

/// Assembles the main application router.
///
/// * `/api/games` — host management, keyed by game id.
/// * `/api/host/{passcode}` — host actions on one game.
/// * `/api/play/{passcode}` — player-facing join/quiz flow.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let game_routes = Router::new()
        .route("/", post(games::create_game).get(games::list_games))
        .route(
            "/{id}",
            put(games::update_game).delete(games::delete_game),
        );

    let host_routes = Router::new()
        .route("/{passcode}/activate", post(games::activate_game))
        .route("/{passcode}/end", post(games::end_game))
        .route(
            "/{passcode}/questions/{index}",
            get(questions::get_question).put(questions::save_question),
        )
        .route("/{passcode}/players", get(players::list_players))
        .route("/{passcode}/leaderboard", get(leaderboard::get_leaderboard))
        .route("/{passcode}/reveal", get(leaderboard::reveal_stream));

    let play_routes = Router::new()
        .route("/{passcode}", get(play::game_info))
        .route("/{passcode}/join", post(players::join_game))
        .route("/{passcode}/leave", post(players::leave_game))
        .route("/{passcode}/start", post(play::start_session))
        .route("/{passcode}/confirm", post(play::confirm_session))
        .route("/{passcode}/answer", post(play::submit_answer))
        .route("/{passcode}/result", get(play::result));

    Router::new()
        .nest("/api/games", game_routes)
        .nest("/api/host", host_routes)
        .nest("/api/play", play_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
