use config::{Config, Environment, File};
use pulse_core::config::AppConfig;
use std::path::Path;

/// 默认配置文件位置，不存在时只使用内置默认值与环境变量
pub const DEFAULT_CONFIG_PATH: &str = "config/pulse.toml";

const ENV_PREFIX: &str = "PULSE";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("feed.symbols")
        .with_list_parse_key("feed.timeframes")
        .try_parsing(true)
}

/// # Summary
/// 加载应用配置。
///
/// # Logic
/// 1. 以 `AppConfig` 的默认值为底。
/// 2. 叠加可选的配置文件。
/// 3. 叠加 `PULSE__<SECTION>__<KEY>` 形式的环境变量，列表项用逗号分隔。
///
/// # Arguments
/// * `path` - 配置文件路径，文件缺失不视为错误。
///
/// # Returns
/// * `Result<AppConfig, config::ConfigError>` - 文件格式或字段类型错误时返回错误。
pub fn load(path: &Path) -> Result<AppConfig, config::ConfigError> {
    build(path, environment())
}

fn build(path: &Path, env: Environment) -> Result<AppConfig, config::ConfigError> {
    Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(env)
        .build()?
        .try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::common::TimeFrame;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = build(&dir.path().join("absent.toml"), env_from(&[])).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine.min_candles, 50);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        std::fs::write(
            &path,
            r#"
            [feed]
            url = "wss://stream.example.com/stream?streams="
            symbols = ["BTCUSDT"]
            timeframes = ["1h"]

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        let config = build(
            &path,
            env_from(&[
                ("PULSE__FEED__SYMBOLS", "BTCUSDT,ETHUSDT"),
                ("PULSE__ENGINE__WORKERS", "2"),
            ]),
        )
        .unwrap();

        assert_eq!(config.feed.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(config.feed.timeframes, vec![TimeFrame::Hour1]);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.engine.workers, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        std::fs::write(&path, "[server]\nport = \"not a port\"\n").unwrap();
        assert!(build(&path, env_from(&[])).is_err());
    }
}
