mod logging;
mod server;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pulse_bus::EventBus;
use pulse_core::common::time::RealTimeProvider;
use pulse_core::signal::port::SignalStore;
use pulse_engine::{EngineSettings, SignalEngine, StaticCatalog, builtin_strategies, load_dir};
use pulse_feed::{FeedSettings, WsFeed};
use pulse_monitor::SignalMonitor;
use pulse_store::SqliteSignalStore;
use server::AppState;
use tracing::{error, info, warn};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到引擎与监控器。
///
/// # Logic
/// 1. 加载并校验配置，配置错误直接退出。
/// 2. 初始化全局日志。
/// 3. 实例化基础设施层（Store、Feed、Bus）。
/// 4. 组装策略目录。
/// 5. 先启动监控器再启动引擎，保证引擎产生的首个信号也能被跟踪。
/// 6. 启动健康检查服务。
/// 7. 挂起等待外部信号退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置
    let config = settings::load(Path::new(settings::DEFAULT_CONFIG_PATH))?;
    config.validate()?;

    // 2. 日志
    let data_dir = PathBuf::from(&config.store.data_dir);
    let _log_guard = logging::init(&data_dir.join("logs"));
    info!("Pulse signal engine starting...");

    if rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    // 3. 基础设施层
    if !pulse_store::config::set_root_dir(data_dir) {
        warn!("Store root directory was already set");
    }
    let store: Arc<dyn SignalStore> = Arc::new(SqliteSignalStore::new().await?);
    let bus = Arc::new(EventBus::default());
    let feed = Arc::new(WsFeed::new(FeedSettings::from(&config.feed)));

    // 4. 策略目录
    let mut strategies = builtin_strategies();
    if let Some(dir) = &config.strategies.dir {
        strategies.extend(load_dir(Path::new(dir))?);
    }
    let catalog = Arc::new(StaticCatalog::new(strategies));

    // 5. 监控器与引擎
    let monitor = Arc::new(SignalMonitor::new(Arc::clone(&store), Arc::clone(&bus)));
    let monitor_task = Arc::clone(&monitor).run().await?;

    let engine = Arc::new(SignalEngine::new(
        feed,
        catalog,
        store,
        bus,
        Arc::new(RealTimeProvider),
        EngineSettings::from(&config),
    ));
    engine.start().await?;

    // 6. 健康检查
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let mut server_task = tokio::spawn(server::serve(
        AppState {
            engine: Arc::clone(&engine),
        },
        bind_addr,
    ));

    // 7. 等待退出
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
        }
        served = &mut server_task => {
            match served {
                Ok(Err(e)) => error!("Health server failed: {}", e),
                Err(e) => error!("Health server task aborted: {}", e),
                Ok(Ok(())) => warn!("Health server exited"),
            }
        }
    }

    engine.stop().await;
    monitor_task.abort();
    server_task.abort();
    info!(
        "Pulse signal engine stopped ({} signals still tracked)",
        monitor.tracked_count()
    );
    Ok(())
}
