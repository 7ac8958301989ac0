use dashmap::DashMap;
use pulse_core::common::{Direction, TimeFrame};
use pulse_core::engine::error::EngineError;
use pulse_core::market::entity::Candle;
use pulse_core::strategy::entity::{
    EntryCondition, EntryRule, ExitKind, ExitRule, IndicatorSpec, IndicatorType, PriceSource,
    RuleSet, SignalProposal, StrategyBody, StrategyDefinition, Threshold,
};
use pulse_indicator::{
    Cross, DEFAULT_RSI_PERIOD, Series, bollinger_bands, detect_crossover, ema, rsi, sma,
};
use pulse_kuri::{KuriError, KuriProgram, Limits, MarketData, SignalKind, StrategySignal};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 均线类指标未声明周期时的默认值
const DEFAULT_MA_PERIOD: usize = 20;
const DEFAULT_BB_PERIOD: usize = 20;
const DEFAULT_BB_STD_DEV: f64 = 2.0;

/// 单个指标的输出：主序列与可选的子输出 (布林带的 upper / middle / lower)
struct IndicatorOutput {
    main: Series,
    parts: HashMap<&'static str, Series>,
}

impl IndicatorOutput {
    fn single(main: Series) -> Self {
        Self {
            main,
            parts: HashMap::new(),
        }
    }
}

/// # Summary
/// 一次评估内的指标查找表。
///
/// # Invariants
/// - 每个声明的指标只计算一次，键为 `IndicatorSpec::key()`。
/// - 行情别名 (`CLOSE` 等) 与指标共用同一张表。
struct IndicatorTable {
    outputs: HashMap<String, IndicatorOutput>,
    // 第一个布林带指标的键，供 `BB_*` 别名使用
    first_bands: Option<String>,
}

fn column(candles: &[Candle], source: PriceSource) -> Vec<f64> {
    candles
        .iter()
        .map(|c| match source {
            PriceSource::Open => c.open,
            PriceSource::High => c.high,
            PriceSource::Low => c.low,
            PriceSource::Close => c.close,
            PriceSource::Volume => c.volume,
        })
        .collect()
}

impl IndicatorTable {
    fn build(indicators: &[IndicatorSpec], candles: &[Candle]) -> Self {
        let mut outputs = HashMap::new();
        for (alias, source) in [
            ("OPEN", PriceSource::Open),
            ("HIGH", PriceSource::High),
            ("LOW", PriceSource::Low),
            ("CLOSE", PriceSource::Close),
            ("VOLUME", PriceSource::Volume),
        ] {
            let series = column(candles, source).into_iter().map(Some).collect();
            outputs.insert(alias.to_string(), IndicatorOutput::single(series));
        }

        let mut first_bands = None;
        for spec in indicators {
            let key = spec.key();
            if outputs.contains_key(&key) {
                continue;
            }
            let data = column(candles, spec.source);
            let output = match spec.kind {
                IndicatorType::Sma => {
                    IndicatorOutput::single(sma(&data, spec.period.unwrap_or(DEFAULT_MA_PERIOD)))
                }
                IndicatorType::Ema => {
                    IndicatorOutput::single(ema(&data, spec.period.unwrap_or(DEFAULT_MA_PERIOD)))
                }
                IndicatorType::Rsi => {
                    IndicatorOutput::single(rsi(&data, spec.period.unwrap_or(DEFAULT_RSI_PERIOD)))
                }
                IndicatorType::BollingerBands => {
                    let bands = bollinger_bands(
                        &data,
                        spec.period.unwrap_or(DEFAULT_BB_PERIOD),
                        spec.std_dev.unwrap_or(DEFAULT_BB_STD_DEV),
                    );
                    if first_bands.is_none() {
                        first_bands = Some(key.clone());
                    }
                    IndicatorOutput {
                        main: bands.middle.clone(),
                        parts: HashMap::from([
                            ("upper", bands.upper),
                            ("middle", bands.middle),
                            ("lower", bands.lower),
                        ]),
                    }
                }
            };
            outputs.insert(key, output);
        }

        Self {
            outputs,
            first_bands,
        }
    }

    /// # Summary
    /// 解析操作数名称。
    ///
    /// # Logic
    /// 1. 行情别名按大写匹配。
    /// 2. 完整键命中时返回主序列。
    /// 3. `BB_upper` 等指向第一个布林带指标的子输出。
    /// 4. 否则按最后一个 `_` 拆成 (指标键, 子输出) 再查。
    fn resolve(&self, name: &str) -> Option<&Series> {
        let upper = name.to_uppercase();
        if matches!(upper.as_str(), "OPEN" | "HIGH" | "LOW" | "CLOSE" | "VOLUME") {
            return self.outputs.get(&upper).map(|o| &o.main);
        }
        if let Some(output) = self.outputs.get(name) {
            return Some(&output.main);
        }
        if let Some(part) = name.strip_prefix("BB_")
            && let Some(key) = &self.first_bands
        {
            return self.outputs.get(key)?.parts.get(part);
        }
        let (key, part) = name.rsplit_once('_')?;
        self.outputs.get(key)?.parts.get(part)
    }

    fn latest(&self, name: &str, index: usize) -> Option<f64> {
        self.resolve(name)?.get(index).copied().flatten()
    }
}

/// # Summary
/// 在最新一根上检查单条规则，命中时返回触发原因。
///
/// # Logic
/// 任何操作数无法解析或在最新位置为空都视为未触发，不报错。
fn check_rule(rule: &EntryRule, table: &IndicatorTable, last: usize) -> Option<String> {
    match &rule.condition {
        EntryCondition::Crossover { left, right } => {
            let cross = detect_crossover(table.resolve(left)?, table.resolve(right)?, last)?;
            (cross == Cross::Up).then(|| format!("{} crossed above {}", left, right))
        }
        EntryCondition::Crossunder { left, right } => {
            let cross = detect_crossover(table.resolve(left)?, table.resolve(right)?, last)?;
            (cross == Cross::Down).then(|| format!("{} crossed below {}", left, right))
        }
        EntryCondition::GreaterThan { left, right } => {
            let value = table.latest(left, last)?;
            let (target, label) = threshold(table, right, last)?;
            (value > target).then(|| format!("{} ({:.2}) > {}", left, value, label))
        }
        EntryCondition::LessThan { left, right } => {
            let value = table.latest(left, last)?;
            let (target, label) = threshold(table, right, last)?;
            (value < target).then(|| format!("{} ({:.2}) < {}", left, value, label))
        }
    }
}

fn threshold(table: &IndicatorTable, right: &Threshold, last: usize) -> Option<(f64, String)> {
    match right {
        Threshold::Value(v) => Some((*v, v.to_string())),
        Threshold::Series(name) => {
            let v = table.latest(name, last)?;
            Some((v, format!("{} ({:.2})", name, v)))
        }
    }
}

/// `strategy.entry` 自带的百分比止损止盈覆盖策略级离场规则
fn entry_exit_rules(signal: &StrategySignal, defaults: &[ExitRule]) -> Vec<ExitRule> {
    let mut rules = defaults.to_vec();
    if let Some(sl) = signal.stop_loss {
        rules.retain(|r| r.kind != ExitKind::StopLoss);
        rules.push(ExitRule::stop_loss_pct(sl));
    }
    if let Some(tp) = signal.take_profit {
        rules.retain(|r| r.kind != ExitKind::TakeProfit);
        rules.push(ExitRule::take_profit_pct(tp));
    }
    rules
}

/// # Summary
/// 策略评估器：对一个 K 线窗口运行规则策略或 Kuri 脚本，产出信号提案。
///
/// # Invariants
/// - 窗口长度不足 `min_candles` 时不评估 (缓冲阶段)。
/// - 只读访问窗口快照，不持有任何可变共享状态 (编译缓存除外)。
/// - Kuri 脚本按策略 ID 只编译一次；编译失败同样被缓存，该策略此后直接跳过。
pub struct StrategyEvaluator {
    limits: Limits,
    min_candles: usize,
    programs: DashMap<String, Result<Arc<KuriProgram>, KuriError>>,
}

impl StrategyEvaluator {
    pub fn new(limits: Limits, min_candles: usize) -> Self {
        Self {
            limits,
            min_candles,
            programs: DashMap::new(),
        }
    }

    pub fn min_candles(&self) -> usize {
        self.min_candles
    }

    /// 已缓存的编译结果数量 (含编译失败)
    pub fn cached_programs(&self) -> usize {
        self.programs.len()
    }

    /// 编译失败而被跳过的策略数量
    pub fn rejected_programs(&self) -> usize {
        self.programs.iter().filter(|p| p.value().is_err()).count()
    }

    /// # Summary
    /// 评估单个策略。
    ///
    /// # Arguments
    /// * `strategy` - 策略定义。
    /// * `candles` - 按时间升序的已收盘 K 线。
    ///
    /// # Returns
    /// * `Result<Vec<SignalProposal>, EngineError>` - 脚本错误返回 `EngineError::Script`。
    pub fn evaluate(
        &self,
        strategy: &StrategyDefinition,
        candles: &[Candle],
    ) -> Result<Vec<SignalProposal>, EngineError> {
        if candles.len() < self.min_candles.max(1) {
            debug!(
                "Evaluator: {} skipped, {} candles buffered (need {})",
                strategy.name,
                candles.len(),
                self.min_candles
            );
            return Ok(Vec::new());
        }

        match &strategy.body {
            StrategyBody::Rules(rules) => Ok(self.evaluate_rules(strategy, rules, candles)),
            StrategyBody::Kuri { source } => self
                .evaluate_kuri(strategy, source, candles)
                .map_err(|e| EngineError::Script {
                    strategy_id: strategy.id.clone(),
                    message: e.to_string(),
                }),
        }
    }

    /// # Summary
    /// 依次评估全部策略，单个策略失败不影响其余策略。
    ///
    /// # Logic
    /// 1. 逐个调用 `evaluate`。
    /// 2. 失败时以 warn 记录策略 ID、名称与标的，然后继续。
    pub fn evaluate_all(
        &self,
        strategies: &[StrategyDefinition],
        symbol: &str,
        timeframe: TimeFrame,
        candles: &[Candle],
    ) -> Vec<SignalProposal> {
        let mut proposals = Vec::new();
        for strategy in strategies {
            match self.evaluate(strategy, candles) {
                Ok(found) => proposals.extend(found),
                Err(e) => warn!(
                    "Evaluator: strategy {} ({}) failed on {} {}: {}",
                    strategy.id, strategy.name, symbol, timeframe, e
                ),
            }
        }
        proposals
    }

    fn evaluate_rules(
        &self,
        strategy: &StrategyDefinition,
        rules: &RuleSet,
        candles: &[Candle],
    ) -> Vec<SignalProposal> {
        let table = IndicatorTable::build(&rules.indicators, candles);
        let last = candles.len().saturating_sub(1);

        rules
            .entry_rules
            .iter()
            .filter_map(|rule| {
                let reason = check_rule(rule, &table, last)?;
                Some(SignalProposal {
                    strategy_id: strategy.id.clone(),
                    strategy_name: strategy.name.clone(),
                    strategy_category: strategy.category.clone(),
                    direction: rule.direction,
                    reason,
                    exit_rules: strategy.exit_rules.clone(),
                })
            })
            .collect()
    }

    /// # Summary
    /// 取出缓存的编译结果，首次访问时编译。
    ///
    /// # Returns
    /// * `Ok(Some(program))` - 可执行的程序。
    /// * `Ok(None)` - 之前已编译失败，跳过且不再记录日志。
    /// * `Err(e)` - 本次首次编译失败，由调用方记录一次。
    fn program(
        &self,
        strategy_id: &str,
        source: &str,
    ) -> Result<Option<Arc<KuriProgram>>, KuriError> {
        if let Some(cached) = self.programs.get(strategy_id) {
            return Ok(cached.value().as_ref().ok().map(Arc::clone));
        }
        let compiled = KuriProgram::compile(source).map(Arc::new);
        self.programs
            .insert(strategy_id.to_string(), compiled.clone());
        compiled.map(Some)
    }

    /// # Summary
    /// 逐根执行 Kuri 脚本并提取最后一根上的信号。
    ///
    /// # Logic
    /// 1. 取 `timestamp` 等于最后一根下标的 `strategy.entry` 信号。
    /// 2. 再读取 `buy_signal` / `sell_signal` 变量在最后一根的取值，
    ///    为尚无提案的方向补充提案。
    fn evaluate_kuri(
        &self,
        strategy: &StrategyDefinition,
        source: &str,
        candles: &[Candle],
    ) -> Result<Vec<SignalProposal>, KuriError> {
        let Some(program) = self.program(&strategy.id, source)? else {
            debug!("Evaluator: {} skipped, script failed to compile", strategy.name);
            return Ok(Vec::new());
        };
        let output = program.run_bars(&MarketData::from_candles(candles), &self.limits)?;
        let last = candles.len().saturating_sub(1);

        let mut proposals: Vec<SignalProposal> = output
            .signals
            .iter()
            .filter(|s| s.kind == SignalKind::Entry && s.timestamp == last)
            .filter_map(|s| {
                Some(SignalProposal {
                    strategy_id: strategy.id.clone(),
                    strategy_name: strategy.name.clone(),
                    strategy_category: strategy.category.clone(),
                    direction: s.direction?,
                    reason: format!("strategy.entry \"{}\" at {:.4}", s.id, s.price),
                    exit_rules: entry_exit_rules(s, &strategy.exit_rules),
                })
            })
            .collect();

        for (name, direction) in [("buy_signal", Direction::Buy), ("sell_signal", Direction::Sell)] {
            if output.last(name).is_true() && !proposals.iter().any(|p| p.direction == direction) {
                proposals.push(SignalProposal {
                    strategy_id: strategy.id.clone(),
                    strategy_name: strategy.name.clone(),
                    strategy_category: strategy.category.clone(),
                    direction,
                    reason: format!("{} is true", name),
                    exit_rules: strategy.exit_rules.clone(),
                });
            }
        }
        Ok(proposals)
    }
}
