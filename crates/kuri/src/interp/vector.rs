use super::{Env, execute};
use crate::error::KuriError;
use crate::ir::{Builtin, Program};
use crate::limits::{Budget, Limits};
use crate::market::MarketData;
use crate::value::{Scalar, Series, Value};
use serde::Serialize;
use std::collections::HashMap;

/// 绘图输出，供前端展示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plot {
    pub title: String,
    pub values: Vec<Option<f64>>,
}

/// # Summary
/// 向量化执行结果：全部变量的完整序列与绘图。
#[derive(Debug, Clone, Default)]
pub struct VectorOutput {
    pub variables: HashMap<String, Value>,
    pub plots: Vec<Plot>,
}

impl VectorOutput {
    /// 变量在第 `index` 个位置是否为 `true`，标量变量对所有位置取同一值
    pub fn is_true_at(&self, name: &str, index: usize) -> bool {
        match self.variables.get(name) {
            Some(Value::Series(s)) => s.as_slice().get(index).is_some_and(Scalar::is_true),
            Some(Value::Scalar(s)) => s.is_true(),
            _ => false,
        }
    }

    /// 变量在最后一个位置的值
    pub fn last(&self, name: &str) -> Scalar {
        self.variables.get(name).map_or(Scalar::Na, Value::current)
    }

    pub fn series(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.variables.get(name).and_then(Value::as_series).map(Series::to_options)
    }
}

struct VectorEnv<'a> {
    data: &'a MarketData,
    variables: HashMap<String, Value>,
    plots: Vec<Plot>,
}

impl Env for VectorEnv<'_> {
    fn load(&mut self, name: &str) -> Result<Value, KuriError> {
        if let Some(value) = self.variables.get(name) {
            return Ok(value.clone());
        }
        if let Some(series) = self.data.series(name, self.data.len()) {
            return Ok(Value::Series(series));
        }
        // 已声明但尚未赋值
        Ok(Value::Scalar(Scalar::Na))
    }

    fn store(&mut self, name: &str, value: Value) -> Result<(), KuriError> {
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    fn effect(&mut self, func: Builtin, args: &[Value]) -> Result<Value, KuriError> {
        if func != Builtin::Plot {
            return Err(KuriError::Unsupported(func.name().to_string()));
        }
        let values = match args.first() {
            Some(Value::Series(s)) => s.to_options(),
            Some(Value::Scalar(s)) => vec![s.num(); self.data.len()],
            _ => return Err(KuriError::type_error("plot expects a number or series")),
        };
        let title = match args.get(1) {
            Some(Value::Str(t)) => t.clone(),
            _ => format!("plot{}", self.plots.len()),
        };
        self.plots.push(Plot { title, values });
        Ok(Value::Scalar(Scalar::Na))
    }

    fn condition(&self, value: &Value) -> Result<bool, KuriError> {
        match value {
            Value::Series(_) => Err(KuriError::type_error(
                "if condition must be a single value in vectorized execution",
            )),
            other => Ok(other.current().is_true()),
        }
    }
}

/// # Summary
/// 向量化执行：整段程序只执行一次，每个变量绑定完整序列。
///
/// # Logic
/// 1. 输入长度超过上限时直接拒绝，不执行任何指令。
/// 2. 一次性执行整个程序，`plot` 记录到绘图输出。
/// 3. `strategy.*` 调用在该模型下报错，应使用逐根执行。
///
/// # Arguments
/// * `program` - 已降级的程序。
/// * `data` - 行情序列。
/// * `limits` - 安全限制。
///
/// # Returns
/// * `Result<VectorOutput, KuriError>` - 全部变量与绘图。
pub fn run_vectorized(
    program: &Program,
    data: &MarketData,
    limits: &Limits,
) -> Result<VectorOutput, KuriError> {
    limits.check_series_len(data.len())?;

    let mut env = VectorEnv {
        data,
        variables: HashMap::new(),
        plots: Vec::new(),
    };
    let mut budget = Budget::new(*limits);
    let mut registers = vec![Value::default(); program.registers];
    execute(program, &mut env, &mut budget, &mut registers)?;

    Ok(VectorOutput {
        variables: env.variables,
        plots: env.plots,
    })
}
