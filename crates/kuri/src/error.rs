use std::time::Duration;
use thiserror::Error;

/// # Summary
/// 运行时安全限制的种类。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitKind {
    // 输入序列超长，执行前拒绝
    SeriesLength { len: usize, max: usize },
    // 单根 K 线内执行的操作数超限
    OpsPerBar { max: u64 },
    // 累计墙钟时间超限
    ExecutionTime { elapsed: Duration, max: Duration },
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::SeriesLength { len, max } => {
                write!(f, "series length {} exceeds limit {}", len, max)
            }
            LimitKind::OpsPerBar { max } => write!(f, "more than {} operations in one bar", max),
            LimitKind::ExecutionTime { elapsed, max } => write!(
                f,
                "execution took {}ms, limit is {}ms",
                elapsed.as_millis(),
                max.as_millis()
            ),
        }
    }
}

/// # Summary
/// Kuri 脚本错误。
///
/// # Invariants
/// - 任何错误都终止当前脚本的整次执行，由调用方捕获后继续处理其他策略。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KuriError {
    #[error("Syntax error at {line}:{column}: {message}")]
    Lex {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("{function} expects {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },
    #[error("Type error: {0}")]
    Type(String),
    #[error("{0} is not available in this execution model")]
    Unsupported(String),
    #[error("Runtime limit exceeded: {0}")]
    Limit(LimitKind),
}

impl KuriError {
    pub fn type_error(message: impl Into<String>) -> Self {
        KuriError::Type(message.into())
    }

    /// 是否为编译期错误 (词法、语法、未定义名字)
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            KuriError::Lex { .. }
                | KuriError::Parse { .. }
                | KuriError::UndefinedVariable(_)
                | KuriError::UnknownFunction(_)
                | KuriError::Arity { .. }
        )
    }
}
