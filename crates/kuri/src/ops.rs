//! 两种执行模型共享的运算语义。
//!
//! 标量与序列混合运算时标量被广播到序列的每个位置；任一元素为 `na` 时结果为 `na`。

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::KuriError;
use crate::value::{Scalar, Series, Value};

/// # Summary
/// 元素级二元运算。
///
/// # Logic
/// 1. 任一侧为 `Na` 得到 `Na`。
/// 2. 算术仅接受数字，除数为 0 得到 `Na`。
/// 3. 比较接受数字；`==`/`!=` 额外接受布尔。
/// 4. `and`/`or` 仅接受布尔。
pub fn apply_binary(op: BinaryOp, lhs: Scalar, rhs: Scalar) -> Result<Scalar, KuriError> {
    let result = match (lhs, rhs) {
        (Scalar::Na, _) | (_, Scalar::Na) => Scalar::Na,
        (Scalar::Num(a), Scalar::Num(b)) => match op {
            BinaryOp::Add => Scalar::Num(a + b),
            BinaryOp::Sub => Scalar::Num(a - b),
            BinaryOp::Mul => Scalar::Num(a * b),
            BinaryOp::Div if b == 0.0 => Scalar::Na,
            BinaryOp::Div => Scalar::Num(a / b),
            BinaryOp::Greater => Scalar::Bool(a > b),
            BinaryOp::Less => Scalar::Bool(a < b),
            BinaryOp::GreaterEq => Scalar::Bool(a >= b),
            BinaryOp::LessEq => Scalar::Bool(a <= b),
            BinaryOp::Eq => Scalar::Bool(a == b),
            BinaryOp::NotEq => Scalar::Bool(a != b),
            BinaryOp::And | BinaryOp::Or => {
                return Err(mismatch(op, "number", "number"));
            }
        },
        (Scalar::Bool(a), Scalar::Bool(b)) => match op {
            BinaryOp::And => Scalar::Bool(a && b),
            BinaryOp::Or => Scalar::Bool(a || b),
            BinaryOp::Eq => Scalar::Bool(a == b),
            BinaryOp::NotEq => Scalar::Bool(a != b),
            _ => return Err(mismatch(op, "bool", "bool")),
        },
        (Scalar::Num(_), Scalar::Bool(_)) => return Err(mismatch(op, "number", "bool")),
        (Scalar::Bool(_), Scalar::Num(_)) => return Err(mismatch(op, "bool", "number")),
    };
    Ok(result)
}

fn mismatch(op: BinaryOp, lhs: &str, rhs: &str) -> KuriError {
    KuriError::type_error(format!("cannot apply '{}' to {} and {}", op, lhs, rhs))
}

/// # Summary
/// 值级二元运算，处理标量/序列广播。
///
/// # Returns
/// 两个序列长度不一致时返回类型错误。
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, KuriError> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Eq => Ok(Value::bool(a == b)),
            BinaryOp::NotEq => Ok(Value::bool(a != b)),
            _ => Err(mismatch(op, "string", "string")),
        },
        (Value::Str(_), other) | (other, Value::Str(_)) => {
            Err(mismatch(op, "string", other.type_name()))
        }
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(apply_binary(op, *a, *b)?)),
        (Value::Series(a), Value::Scalar(b)) => map_series(a, |x| apply_binary(op, x, *b)),
        (Value::Scalar(a), Value::Series(b)) => map_series(b, |y| apply_binary(op, *a, y)),
        (Value::Series(a), Value::Series(b)) => {
            if a.len() != b.len() {
                return Err(KuriError::type_error(format!(
                    "series length mismatch: {} vs {}",
                    a.len(),
                    b.len()
                )));
            }
            let values = a
                .as_slice()
                .iter()
                .zip(b.as_slice())
                .map(|(x, y)| apply_binary(op, *x, *y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Series(Series::new(values)))
        }
    }
}

/// 值级一元运算
pub fn unary(op: UnaryOp, value: &Value) -> Result<Value, KuriError> {
    let apply = |x: Scalar| -> Result<Scalar, KuriError> {
        match (op, x) {
            (_, Scalar::Na) => Ok(Scalar::Na),
            (UnaryOp::Neg, Scalar::Num(n)) => Ok(Scalar::Num(-n)),
            (UnaryOp::Not, Scalar::Bool(b)) => Ok(Scalar::Bool(!b)),
            (UnaryOp::Neg, Scalar::Bool(_)) => Err(KuriError::type_error("cannot negate a bool")),
            (UnaryOp::Not, Scalar::Num(_)) => {
                Err(KuriError::type_error("'not' expects a bool, got number"))
            }
        }
    };
    match value {
        Value::Scalar(x) => Ok(Value::Scalar(apply(*x)?)),
        Value::Series(s) => map_series(s, apply),
        Value::Str(_) => Err(KuriError::type_error("unary operator applied to string")),
    }
}

fn map_series(
    series: &Series,
    f: impl Fn(Scalar) -> Result<Scalar, KuriError>,
) -> Result<Value, KuriError> {
    let values = series
        .as_slice()
        .iter()
        .map(|x| f(*x))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Series(Series::new(values)))
}
