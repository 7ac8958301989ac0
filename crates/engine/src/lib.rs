//! 信号引擎：策略评估器、离场价位计算、内置策略目录与把它们串起来的运行时。

pub mod builtin;
pub mod evaluator;
pub mod exit;
pub mod runtime;

pub use builtin::{StaticCatalog, builtin_strategies, load_dir};
pub use evaluator::StrategyEvaluator;
pub use exit::{ExitLevels, exit_levels};
pub use runtime::{EngineSettings, SignalEngine};
