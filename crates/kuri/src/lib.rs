//! Kuri 策略脚本语言运行时。
//!
//! 源码经过 `tokenize` → `parse` → `lower` 编译为寄存器式 IR，再由两种执行模型解释：
//! - 向量化：整段程序执行一次，变量绑定完整序列，用于指标与图表输出。
//! - 逐根：对每根 K 线执行一次，变量绑定截至当根的历史，支持 `strategy.*` 信号调用。
//!
//! 两种模型共享同一套运算语义 (`ops` 与 `builtins`)。

pub mod ast;
mod builtins;
pub mod error;
mod interp;
pub mod ir;
pub mod lexer;
pub mod limits;
pub mod market;
pub mod ops;
pub mod parser;
pub mod value;

pub use error::{KuriError, LimitKind};
pub use interp::bar::{BarOutput, SignalKind, StrategySignal};
pub use interp::vector::{Plot, VectorOutput};
pub use limits::Limits;
pub use market::MarketData;
pub use value::{Scalar, Series, Value};

use ir::{Builtin, Program};
use tracing::debug;

/// # Summary
/// 编译后的 Kuri 脚本 (IR)。
#[derive(Debug, Clone)]
pub struct KuriProgram {
    program: Program,
}

impl KuriProgram {
    /// # Summary
    /// 编译脚本源码。
    ///
    /// # Returns
    /// * `Result<Self, KuriError>` - 词法/语法错误、未知函数或未定义变量。
    pub fn compile(source: &str) -> Result<Self, KuriError> {
        let tokens = lexer::tokenize(source)?;
        let script = parser::parse(&tokens)?;
        let program = ir::lower(&script)?;
        debug!(
            "Kuri: compiled {} statements into {} instructions",
            script.statements.len(),
            program.instrs.len()
        );
        Ok(Self { program })
    }

    pub fn ir(&self) -> &Program {
        &self.program
    }

    /// 是否使用了 `strategy.*` 调用，需要逐根执行
    pub fn is_strategy(&self) -> bool {
        self.program.uses(Builtin::StrategyEntry) || self.program.uses(Builtin::StrategyClose)
    }

    pub fn run_vectorized(
        &self,
        data: &MarketData,
        limits: &Limits,
    ) -> Result<VectorOutput, KuriError> {
        interp::vector::run_vectorized(&self.program, data, limits)
    }

    pub fn run_bars(&self, data: &MarketData, limits: &Limits) -> Result<BarOutput, KuriError> {
        interp::bar::run_bars(&self.program, data, limits)
    }
}
