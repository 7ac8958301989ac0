use async_trait::async_trait;
use pulse_core::common::Direction;
use pulse_core::store::error::StoreError;
use pulse_core::strategy::entity::{
    EntryCondition, EntryRule, ExitRule, IndicatorSpec, IndicatorType, PriceSource, RuleSet,
    StrategyBody, StrategyDefinition, Threshold,
};
use pulse_core::strategy::port::StrategyCatalog;
use std::path::Path;
use tracing::{info, warn};

pub const MA_CROSSOVER_ID: &str = "6f1c2a3e-9b4d-4e21-8a57-0c3d9e1f7a01";
pub const RSI_DIVERGENCE_ID: &str = "a2d47b18-53c6-4f0e-9d2b-7e8f1a6c4b02";
pub const MOMENTUM_BREAKOUT_ID: &str = "d9e35c71-0a8f-4b6d-b1c4-3f2e5a7d8c03";

/// 内置策略统一使用 1:2 的风险回报
fn default_exit_rules() -> Vec<ExitRule> {
    vec![ExitRule::stop_loss_pct(2.0), ExitRule::take_profit_pct(4.0)]
}

fn indicator(kind: IndicatorType, period: usize, std_dev: Option<f64>) -> IndicatorSpec {
    IndicatorSpec {
        kind,
        period: Some(period),
        std_dev,
        source: PriceSource::Close,
    }
}

fn rule(condition: EntryCondition, direction: Direction) -> EntryRule {
    EntryRule {
        condition,
        direction,
    }
}

/// # Summary
/// 内置策略目录。
///
/// # Logic
/// 1. MA Crossover：EMA 9 上穿 EMA 21 做多，下穿做空。
/// 2. RSI Divergence：RSI 14 低于 30 做多，高于 70 做空。
/// 3. Momentum Breakout：收盘价上穿布林上轨做多，下穿下轨做空。
pub fn builtin_strategies() -> Vec<StrategyDefinition> {
    vec![
        StrategyDefinition {
            id: MA_CROSSOVER_ID.to_string(),
            name: "MA Crossover".to_string(),
            category: Some("trend".to_string()),
            body: StrategyBody::Rules(RuleSet {
                indicators: vec![
                    indicator(IndicatorType::Ema, 9, None),
                    indicator(IndicatorType::Ema, 21, None),
                ],
                entry_rules: vec![
                    rule(
                        EntryCondition::Crossover {
                            left: "EMA_9".into(),
                            right: "EMA_21".into(),
                        },
                        Direction::Buy,
                    ),
                    rule(
                        EntryCondition::Crossunder {
                            left: "EMA_9".into(),
                            right: "EMA_21".into(),
                        },
                        Direction::Sell,
                    ),
                ],
            }),
            exit_rules: default_exit_rules(),
        },
        StrategyDefinition {
            id: RSI_DIVERGENCE_ID.to_string(),
            name: "RSI Divergence".to_string(),
            category: Some("mean-reversion".to_string()),
            body: StrategyBody::Rules(RuleSet {
                indicators: vec![indicator(IndicatorType::Rsi, 14, None)],
                entry_rules: vec![
                    rule(
                        EntryCondition::LessThan {
                            left: "RSI_14".into(),
                            right: Threshold::Value(30.0),
                        },
                        Direction::Buy,
                    ),
                    rule(
                        EntryCondition::GreaterThan {
                            left: "RSI_14".into(),
                            right: Threshold::Value(70.0),
                        },
                        Direction::Sell,
                    ),
                ],
            }),
            exit_rules: default_exit_rules(),
        },
        StrategyDefinition {
            id: MOMENTUM_BREAKOUT_ID.to_string(),
            name: "Momentum Breakout".to_string(),
            category: Some("breakout".to_string()),
            body: StrategyBody::Rules(RuleSet {
                indicators: vec![indicator(IndicatorType::BollingerBands, 20, Some(2.0))],
                entry_rules: vec![
                    rule(
                        EntryCondition::Crossover {
                            left: "CLOSE".into(),
                            right: "BB_upper".into(),
                        },
                        Direction::Buy,
                    ),
                    rule(
                        EntryCondition::Crossunder {
                            left: "CLOSE".into(),
                            right: "BB_lower".into(),
                        },
                        Direction::Sell,
                    ),
                ],
            }),
            exit_rules: default_exit_rules(),
        },
    ]
}

/// # Summary
/// 从目录加载策略文件。
///
/// # Logic
/// 1. `*.json` 反序列化为 `StrategyDefinition`。
/// 2. `*.kuri` 作为 Kuri 策略，ID 与名称取文件名 (不含扩展名)，附带默认离场规则。
/// 3. 单个文件读取或解析失败时记录 warn 并跳过。
///
/// # Arguments
/// * `dir` - 策略目录。
///
/// # Returns
/// * `Result<Vec<StrategyDefinition>, StoreError>` - 目录本身不可读时返回错误。
pub fn load_dir(dir: &Path) -> Result<Vec<StrategyDefinition>, StoreError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| StoreError::InitError(format!("{}: {}", dir.display(), e)))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut strategies = Vec::new();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Catalog: cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => match serde_json::from_str::<StrategyDefinition>(&text) {
                Ok(def) => strategies.push(def),
                Err(e) => warn!("Catalog: invalid strategy file {}: {}", path.display(), e),
            },
            Some("kuri") => strategies.push(StrategyDefinition {
                id: stem.to_string(),
                name: stem.to_string(),
                category: Some("kuri".to_string()),
                body: StrategyBody::Kuri { source: text },
                exit_rules: default_exit_rules(),
            }),
            _ => {}
        }
    }

    info!("Catalog: loaded {} strategies from {}", strategies.len(), dir.display());
    Ok(strategies)
}

/// # Summary
/// 固定内容的策略目录。
pub struct StaticCatalog {
    strategies: Vec<StrategyDefinition>,
}

impl StaticCatalog {
    pub fn new(strategies: Vec<StrategyDefinition>) -> Self {
        Self { strategies }
    }

    /// 只含内置策略的目录
    pub fn builtin() -> Self {
        Self::new(builtin_strategies())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[async_trait]
impl StrategyCatalog for StaticCatalog {
    async fn list(&self) -> Result<Vec<StrategyDefinition>, StoreError> {
        Ok(self.strategies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_ids_are_stable_and_unique() {
        let strategies = builtin_strategies();
        let ids: HashSet<_> = strategies.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(MA_CROSSOVER_ID));
        assert!(strategies.iter().all(|s| s.exit_rules == default_exit_rules()));
    }

    #[test]
    fn test_load_dir_reads_json_and_kuri() {
        let dir = tempfile::tempdir().unwrap();
        let def = &builtin_strategies()[1];
        std::fs::write(
            dir.path().join("rsi.json"),
            serde_json::to_string(def).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("breakout.kuri"), "buy_signal = close > 10").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "breakout");
        assert!(matches!(loaded[0].body, StrategyBody::Kuri { .. }));
        assert_eq!(&loaded[1], def);
    }

    #[test]
    fn test_load_missing_dir_fails() {
        assert!(load_dir(Path::new("/definitely/not/here")).is_err());
    }

    #[tokio::test]
    async fn test_static_catalog_lists_builtins() {
        let catalog = StaticCatalog::builtin();
        assert_eq!(catalog.list().await.unwrap().len(), 3);
    }
}
