use serde::Serialize;
use std::sync::Arc;

/// # Summary
/// 单个元素值。`Na` 表示缺失，参与任何运算都得到 `Na`。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Na,
    Num(f64),
    Bool(bool),
}

impl Scalar {
    pub fn num(&self) -> Option<f64> {
        match self {
            Scalar::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// 仅 `Bool(true)` 为真，`Na` 视为假
    pub fn is_true(&self) -> bool {
        matches!(self, Scalar::Bool(true))
    }

    pub fn is_na(&self) -> bool {
        matches!(self, Scalar::Na)
    }

    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Scalar::Na, Scalar::Num)
    }
}

/// # Summary
/// 不可变序列视图。
///
/// # Invariants
/// - 多个视图可以共享同一底层缓冲，`len` 指定视图可见的前缀长度。
/// - 逐根模型通过前缀视图保证第 `i` 根只能看到 `[0..=i]` 的数据。
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    data: Arc<Vec<Scalar>>,
    len: usize,
}

impl Series {
    pub fn new(values: Vec<Scalar>) -> Self {
        let len = values.len();
        Self {
            data: Arc::new(values),
            len,
        }
    }

    /// 共享缓冲上的前缀视图，`len` 超过缓冲长度时截断
    pub fn prefix(data: &Arc<Vec<Scalar>>, len: usize) -> Self {
        Self {
            data: Arc::clone(data),
            len: len.min(data.len()),
        }
    }

    pub fn as_slice(&self) -> &[Scalar] {
        self.data.get(..self.len).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 当前 (最后一个可见) 元素
    pub fn last(&self) -> Scalar {
        self.as_slice().last().copied().unwrap_or_default()
    }

    pub fn to_options(&self) -> Vec<Option<f64>> {
        self.as_slice().iter().map(Scalar::num).collect()
    }
}

/// # Summary
/// 解释器中的运行期值。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Series(Series),
    Str(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(Scalar::Na)
    }
}

impl Value {
    pub fn num(n: f64) -> Self {
        Value::Scalar(Scalar::Num(n))
    }

    pub fn bool(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(Scalar::Na) => "na",
            Value::Scalar(Scalar::Num(_)) => "number",
            Value::Scalar(Scalar::Bool(_)) => "bool",
            Value::Series(_) => "series",
            Value::Str(_) => "string",
        }
    }

    /// 当前元素：序列取最后一个元素，字符串视为 `Na`
    pub fn current(&self) -> Scalar {
        match self {
            Value::Scalar(s) => *s,
            Value::Series(s) => s.last(),
            Value::Str(_) => Scalar::Na,
        }
    }

    pub fn as_series(&self) -> Option<&Series> {
        match self {
            Value::Series(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_view_hides_future_values() {
        let data = Arc::new(vec![Scalar::Num(1.0), Scalar::Num(2.0), Scalar::Num(3.0)]);
        let view = Series::prefix(&data, 2);
        assert_eq!(view.as_slice(), &[Scalar::Num(1.0), Scalar::Num(2.0)]);
        assert_eq!(view.last(), Scalar::Num(2.0));
        assert_eq!(Series::prefix(&data, 10).len(), 3);
    }

    #[test]
    fn test_truthiness() {
        assert!(Scalar::Bool(true).is_true());
        assert!(!Scalar::Na.is_true());
        assert!(!Scalar::Num(1.0).is_true());
        assert_eq!(Value::Str("x".into()).current(), Scalar::Na);
    }
}
