//! # 健康检查服务
//!
//! 只暴露 `GET /health`，返回信号引擎的运行状态。

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use pulse_core::engine::entity::EngineStatus;
use pulse_engine::SignalEngine;
use std::sync::Arc;
use tracing::info;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SignalEngine>,
}

async fn health(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// # Summary
/// 绑定端口并持续提供服务，直到所在任务被取消。
///
/// # Arguments
/// * `bind_addr` - 形如 `0.0.0.0:8080` 的监听地址。
pub async fn serve(state: AppState, bind_addr: String) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Health endpoint listening on http://{}/health", bind_addr);
    axum::serve(listener, router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse_bus::EventBus;
    use pulse_core::common::TimeFrame;
    use pulse_core::common::time::RealTimeProvider;
    use pulse_core::config::AppConfig;
    use pulse_core::market::error::MarketError;
    use pulse_core::market::port::{FeedStatus, KlineStream, MarketDataProvider};
    use pulse_core::test_utils::MemSignalStore;
    use pulse_engine::{EngineSettings, StaticCatalog};

    struct IdleFeed;

    #[async_trait]
    impl MarketDataProvider for IdleFeed {
        async fn subscribe(
            &self,
            _symbols: &[String],
            _timeframes: &[TimeFrame],
        ) -> Result<KlineStream, MarketError> {
            Ok(Box::pin(futures::stream::pending()))
        }

        fn status(&self) -> FeedStatus {
            FeedStatus {
                connected: true,
                subscription_count: 2,
            }
        }
    }

    fn engine() -> Arc<SignalEngine> {
        let mut config = AppConfig::default();
        config.feed.symbols = vec!["BTCUSDT".to_string()];
        Arc::new(SignalEngine::new(
            Arc::new(IdleFeed),
            Arc::new(StaticCatalog::builtin()),
            Arc::new(MemSignalStore::new()),
            Arc::new(EventBus::default()),
            Arc::new(RealTimeProvider),
            EngineSettings::from(&config),
        ))
    }

    #[tokio::test]
    async fn test_health_reports_engine_status() {
        let engine = engine();
        let state = AppState {
            engine: Arc::clone(&engine),
        };

        let Json(before) = health(State(state.clone())).await;
        assert!(!before.running);
        assert_eq!(before.subscription_count, 2);

        engine.start().await.unwrap();
        let Json(after) = health(State(state)).await;
        assert!(after.running);
        assert_eq!(after.buffered_symbol_timeframe_pairs, 0);
        engine.stop().await;
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = EngineStatus {
            running: true,
            buffered_symbol_timeframe_pairs: 3,
            subscription_count: 4,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["bufferedSymbolTimeframePairs"], 3);
        assert_eq!(json["subscriptionCount"], 4);
    }
}
