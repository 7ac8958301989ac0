use super::{Env, execute};
use crate::error::KuriError;
use crate::ir::{Builtin, Program};
use crate::limits::{Budget, Limits};
use crate::market::MarketData;
use crate::value::{Scalar, Series, Value};
use pulse_core::common::Direction;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 策略调用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Entry,
    Close,
}

/// # Summary
/// `strategy.entry` / `strategy.close` 在某根 K 线上产生的信号。
///
/// # Invariants
/// - 只有条件在当根取值为 `true` 时才会产生。
/// - `price` 为当根收盘价，`timestamp` 为 K 线下标。
/// - `stop_loss` / `take_profit` 为相对入场价的百分比。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub direction: Option<Direction>,
    pub id: String,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub timestamp: usize,
}

/// # Summary
/// 逐根执行结果。
#[derive(Debug, Clone, Default)]
pub struct BarOutput {
    pub signals: Vec<StrategySignal>,
    // 每个变量的逐根历史
    pub variables: HashMap<String, Series>,
}

impl BarOutput {
    /// 变量在最后一根上的值
    pub fn last(&self, name: &str) -> Scalar {
        self.variables.get(name).map_or(Scalar::Na, Series::last)
    }
}

struct BarEnv<'a> {
    data: &'a MarketData,
    bar: usize,
    history: HashMap<String, Arc<Vec<Scalar>>>,
    strings: HashMap<String, String>,
    signals: Vec<StrategySignal>,
}

impl BarEnv<'_> {
    // 所有变量的历史延长一格，默认 na
    fn begin_bar(&mut self, bar: usize) {
        self.bar = bar;
        for values in self.history.values_mut() {
            Arc::make_mut(values).push(Scalar::Na);
        }
    }

    fn text_arg(func: Builtin, value: Option<&Value>, what: &str) -> Result<String, KuriError> {
        match value {
            Some(Value::Str(s)) => Ok(s.clone()),
            _ => Err(KuriError::type_error(format!(
                "{}: {} must be a string",
                func.name(),
                what
            ))),
        }
    }

    fn price(&self) -> Result<f64, KuriError> {
        self.data
            .close_at(self.bar)
            .ok_or_else(|| KuriError::type_error(format!("no close price at bar {}", self.bar)))
    }
}

impl Env for BarEnv<'_> {
    fn load(&mut self, name: &str) -> Result<Value, KuriError> {
        if let Some(text) = self.strings.get(name) {
            return Ok(Value::Str(text.clone()));
        }
        let len = self.bar + 1;
        if let Some(values) = self.history.get(name) {
            return Ok(Value::Series(Series::prefix(values, len)));
        }
        self.data
            .series(name, len)
            .map(Value::Series)
            .ok_or_else(|| KuriError::UndefinedVariable(name.to_string()))
    }

    fn store(&mut self, name: &str, value: Value) -> Result<(), KuriError> {
        let current = match value {
            Value::Str(text) => {
                self.strings.insert(name.to_string(), text);
                return Ok(());
            }
            other => other.current(),
        };
        self.strings.remove(name);
        let bar = self.bar;
        let values = self
            .history
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(vec![Scalar::Na; bar + 1]));
        if let Some(slot) = Arc::make_mut(values).get_mut(bar) {
            *slot = current;
        }
        Ok(())
    }

    fn effect(&mut self, func: Builtin, args: &[Value]) -> Result<Value, KuriError> {
        match func {
            // 逐根模型不产生绘图
            Builtin::Plot => Ok(Value::Scalar(Scalar::Na)),
            Builtin::StrategyEntry => {
                let id = Self::text_arg(func, args.first(), "id")?;
                let raw_direction = Self::text_arg(func, args.get(1), "direction")?;
                let direction = raw_direction
                    .parse::<Direction>()
                    .map_err(KuriError::type_error)?;
                let triggered = args.get(2).is_some_and(|c| c.current().is_true());
                if triggered {
                    let signal = StrategySignal {
                        kind: SignalKind::Entry,
                        direction: Some(direction),
                        id,
                        price: self.price()?,
                        stop_loss: args.get(3).and_then(|v| v.current().num()),
                        take_profit: args.get(4).and_then(|v| v.current().num()),
                        timestamp: self.bar,
                    };
                    self.signals.push(signal);
                }
                Ok(Value::Scalar(Scalar::Na))
            }
            Builtin::StrategyClose => {
                let id = Self::text_arg(func, args.first(), "id")?;
                if args.get(1).is_some_and(|c| c.current().is_true()) {
                    let signal = StrategySignal {
                        kind: SignalKind::Close,
                        direction: None,
                        id,
                        price: self.price()?,
                        stop_loss: None,
                        take_profit: None,
                        timestamp: self.bar,
                    };
                    self.signals.push(signal);
                }
                Ok(Value::Scalar(Scalar::Na))
            }
            _ => Err(KuriError::Unsupported(func.name().to_string())),
        }
    }

    fn condition(&self, value: &Value) -> Result<bool, KuriError> {
        Ok(value.current().is_true())
    }
}

/// # Summary
/// 逐根执行：对第 `i` 根 K 线执行一遍程序，只能看到 `[0..=i]` 的数据。
///
/// # Logic
/// 1. 输入长度超过上限时直接拒绝。
/// 2. 每根开始时操作计数清零，所有变量历史延长一格 (`na`)。
/// 3. 赋值写入变量在当根的元素；读取变量得到截至当根的历史序列。
/// 4. `if` 以条件在当根的取值判定。
/// 5. `strategy.entry` / `strategy.close` 仅在条件当根为 `true` 时记录信号。
///
/// # Complexity
/// 指标函数在每根上对 `[0..=i]` 整段前缀重新计算，总代价为 O(N²)。
/// 这样每根看到的值与只拿到该前缀时完全一致，不需要为每个调用点维护增量状态。
/// 引擎窗口上限为数百根，`max_series_len` 与 `max_total_time` 限制了最坏情况。
///
/// # Arguments
/// * `program` - 已降级的程序。
/// * `data` - 行情序列。
/// * `limits` - 安全限制。
///
/// # Returns
/// * `Result<BarOutput, KuriError>` - 信号与变量历史；任何错误终止整次执行。
pub fn run_bars(
    program: &Program,
    data: &MarketData,
    limits: &Limits,
) -> Result<BarOutput, KuriError> {
    limits.check_series_len(data.len())?;

    let mut env = BarEnv {
        data,
        bar: 0,
        history: program
            .variables
            .iter()
            .map(|name| (name.clone(), Arc::new(Vec::with_capacity(data.len()))))
            .collect(),
        strings: HashMap::new(),
        signals: Vec::new(),
    };
    let mut budget = Budget::new(*limits);
    let mut registers = vec![Value::default(); program.registers];

    for bar in 0..data.len() {
        budget.start_bar();
        // 先释放上一根的寄存器，历史缓冲才不会被复制
        registers.fill(Value::default());
        env.begin_bar(bar);
        execute(program, &mut env, &mut budget, &mut registers)?;
    }

    debug!(
        "Kuri: bar execution finished, bars={}, signals={}",
        data.len(),
        env.signals.len()
    );

    Ok(BarOutput {
        signals: env.signals,
        variables: env
            .history
            .into_iter()
            .map(|(name, values)| (name, Series::new(Arc::unwrap_or_clone(values))))
            .collect(),
    })
}
