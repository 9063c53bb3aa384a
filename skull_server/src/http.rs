use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use skull_core::GamePhase;

use crate::SharedState;

/// 只读的发现接口：只查询注册表和游戏状态，不变更任何对局。
/// 唯一的例外是 POST /api/rooms，它通过注册表建房，等价于
/// WebSocket 上的 CreateRoom。
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/rooms", get(list_rooms).post(create_room))
        .route("/api/rooms/{code}", get(room_details))
        .route("/api/stats", get(stats))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_rooms(State(state): State<SharedState>) -> Json<Value> {
    let rooms: Vec<Value> = state
        .registry
        .codes()
        .into_iter()
        .filter_map(|code| {
            let room = state.registry.lookup(&code)?;
            let gs = room.state.lock();
            let in_progress = gs.phase != GamePhase::Waiting;
            Some(json!({
                "code": code,
                "player_count": gs.players.len(),
                "in_progress": in_progress,
            }))
        })
        .collect();

    Json(json!({ "rooms": rooms }))
}

async fn create_room(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let (code, _room) = state.registry.create();
    // 与 WebSocket 建房一致：宽限期内无人加入的房间会被回收
    crate::ws::schedule_cleanup(state.clone(), code.clone());
    (StatusCode::CREATED, Json(json!({ "room_code": code })))
}

async fn room_details(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let room = state.registry.lookup(&code).ok_or(StatusCode::NOT_FOUND)?;
    let gs = room.state.lock();

    // 只暴露概要字段，绝不带出任何玩家的牌
    Ok(Json(json!({
        "room_code": code,
        "player_count": gs.players.len(),
        "phase": gs.phase,
        "round": gs.round,
    })))
}

async fn stats(State(state): State<SharedState>) -> Json<Value> {
    let codes = state.registry.codes();
    let total_players: usize = codes
        .iter()
        .filter_map(|code| state.registry.lookup(code))
        .map(|room| room.state.lock().players.len())
        .sum();

    Json(json!({
        "active_rooms": codes.len(),
        "total_players": total_players,
    }))
}

// --- 单元测试 ---
