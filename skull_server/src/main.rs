use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

mod config;
mod error;
mod http;
mod registry;
mod ws;

use config::Config;
use registry::RoomRegistry;

/// 服务器全局状态
///
/// 注册表显式持有而不是全局静态量，同一进程里可以并存多个
/// 互不相干的实例（测试时各建各的）。
pub struct AppState {
    pub registry: RoomRegistry,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = SharedState::new(AppState {
        registry: RoomRegistry::new(),
        config,
    });

    let app = Router::new()
        .route("/ws", get(ws::websocket_handler))
        .merge(http::router())
        .with_state(state);

    info!("骷髅牌服务器正在监听 {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}
