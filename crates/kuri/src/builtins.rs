use crate::error::KuriError;
use crate::ir::Builtin;
use crate::value::{Scalar, Series, Value};
use pulse_indicator::{DEFAULT_RSI_PERIOD, ema, rsi, sma};

/// # Summary
/// 执行纯计算类内置函数 (指标与交叉)。
///
/// # Logic
/// 序列参数中若含有 `na`，只对最后一个 `na` 之后的连续数值段计算，
/// 前面的位置全部输出 `na`，保证输出与输入等长对齐。
///
/// # Returns
/// `plot` 与 `strategy.*` 不在此处处理，传入时返回 `Unsupported`。
pub fn call_pure(func: Builtin, args: &[Value]) -> Result<Value, KuriError> {
    match func {
        Builtin::Sma | Builtin::Ema => {
            let source = series_arg(func, args.first())?;
            let period = period_arg(func, args.get(1))?;
            let f = if func == Builtin::Sma { sma } else { ema };
            Ok(on_dense_tail(source, |dense| f(dense, period)))
        }
        Builtin::Rsi => {
            let source = series_arg(func, args.first())?;
            let period = match args.get(1) {
                Some(_) => period_arg(func, args.get(1))?,
                None => DEFAULT_RSI_PERIOD,
            };
            Ok(on_dense_tail(source, |dense| rsi(dense, period)))
        }
        Builtin::Crossover | Builtin::Crossunder => {
            let (a, b) = (arg(func, args.first())?, arg(func, args.get(1))?);
            cross(func == Builtin::Crossover, a, b)
        }
        Builtin::Plot | Builtin::StrategyEntry | Builtin::StrategyClose => {
            Err(KuriError::Unsupported(func.name().to_string()))
        }
    }
}

fn arg(func: Builtin, value: Option<&Value>) -> Result<&Value, KuriError> {
    value.ok_or_else(|| KuriError::type_error(format!("{}: missing argument", func.name())))
}

fn series_arg(func: Builtin, value: Option<&Value>) -> Result<&Series, KuriError> {
    match arg(func, value)? {
        Value::Series(s) => Ok(s),
        other => Err(KuriError::type_error(format!(
            "{} expects a series, got {}",
            func.name(),
            other.type_name()
        ))),
    }
}

/// 周期参数必须是正整数
pub(crate) fn period_arg(func: Builtin, value: Option<&Value>) -> Result<usize, KuriError> {
    let raw = match arg(func, value)?.current() {
        Scalar::Num(n) => n,
        other => {
            return Err(KuriError::type_error(format!(
                "{}: period must be a number, got {:?}",
                func.name(),
                other
            )));
        }
    };
    if raw.fract() != 0.0 || raw < 1.0 || raw > f64::from(u32::MAX) {
        return Err(KuriError::type_error(format!(
            "{}: period must be a positive integer, got {}",
            func.name(),
            raw
        )));
    }
    // 已校验为 [1, u32::MAX] 区间内的整数
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let period = raw as u32;
    usize::try_from(period).map_err(|e| KuriError::type_error(e.to_string()))
}

fn on_dense_tail(source: &Series, f: impl Fn(&[f64]) -> Vec<Option<f64>>) -> Value {
    let values = source.as_slice();
    let start = values
        .iter()
        .rposition(|v| !matches!(v, Scalar::Num(_)))
        .map_or(0, |i| i + 1);
    let dense: Vec<f64> = values[start..].iter().filter_map(Scalar::num).collect();

    let mut out = vec![Scalar::Na; start];
    out.extend(f(&dense).into_iter().map(Scalar::from_option));
    Value::Series(Series::new(out))
}

fn cross(up: bool, a: &Value, b: &Value) -> Result<Value, KuriError> {
    let len = match (a, b) {
        (Value::Series(s), Value::Series(t)) if s.len() != t.len() => {
            return Err(KuriError::type_error(format!(
                "crossover: series length mismatch: {} vs {}",
                s.len(),
                t.len()
            )));
        }
        (Value::Series(s), _) | (_, Value::Series(s)) => s.len(),
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            return Err(KuriError::type_error("crossover expects numbers"));
        }
        _ => return Ok(Value::bool(false)),
    };

    let at = |v: &Value, i: usize| match v {
        Value::Series(s) => s.as_slice().get(i).copied().unwrap_or_default(),
        other => other.current(),
    };

    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let crossed = match i.checked_sub(1) {
            Some(prev) => match (at(a, i), at(b, i), at(a, prev), at(b, prev)) {
                (Scalar::Num(x), Scalar::Num(y), Scalar::Num(px), Scalar::Num(py)) => {
                    if up {
                        x > y && px <= py
                    } else {
                        x < y && px >= py
                    }
                }
                _ => false,
            },
            None => false,
        };
        out.push(Scalar::Bool(crossed));
    }
    Ok(Value::Series(Series::new(out)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Value {
        Value::Series(Series::new(values.iter().copied().map(Scalar::Num).collect()))
    }

    fn bools(value: &Value) -> Vec<bool> {
        value
            .as_series()
            .unwrap()
            .as_slice()
            .iter()
            .map(Scalar::is_true)
            .collect()
    }

    #[test]
    fn test_sma_skips_leading_na() {
        let mut values = vec![Scalar::Na, Scalar::Na];
        values.extend([1.0, 2.0, 3.0].map(Scalar::Num));
        let source = Value::Series(Series::new(values));
        let out = call_pure(Builtin::Sma, &[source, Value::num(2.0)]).unwrap();
        assert_eq!(
            out.as_series().unwrap().as_slice(),
            &[
                Scalar::Na,
                Scalar::Na,
                Scalar::Na,
                Scalar::Num(1.5),
                Scalar::Num(2.5)
            ]
        );
    }

    #[test]
    fn test_crossover_counts_touch_as_below() {
        let close = nums(&[1.0, 1.0, 1.0, 5.0, 1.0]);
        let ma = call_pure(Builtin::Sma, &[close.clone(), Value::num(3.0)]).unwrap();
        let up = call_pure(Builtin::Crossover, &[close.clone(), ma.clone()]).unwrap();
        assert_eq!(bools(&up), vec![false, false, false, true, false]);
        let down = call_pure(Builtin::Crossunder, &[close, ma]).unwrap();
        assert_eq!(bools(&down), vec![false, false, false, false, true]);
    }

    #[test]
    fn test_crossover_against_constant_level() {
        let rsi_like = nums(&[25.0, 28.0, 32.0, 35.0]);
        let up = call_pure(Builtin::Crossover, &[rsi_like, Value::num(30.0)]).unwrap();
        assert_eq!(bools(&up), vec![false, false, true, false]);
    }

    #[test]
    fn test_invalid_period() {
        let close = nums(&[1.0, 2.0]);
        assert!(call_pure(Builtin::Sma, &[close.clone(), Value::num(0.0)]).is_err());
        assert!(call_pure(Builtin::Ema, &[close.clone(), Value::num(2.5)]).is_err());
        assert!(call_pure(Builtin::Sma, &[Value::num(1.0), Value::num(2.0)]).is_err());
        assert!(call_pure(Builtin::Rsi, &[close]).is_ok());
    }
}
