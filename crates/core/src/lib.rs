//! 信号引擎的核心领域层：实体、端口 (Port) 与各领域错误定义。
//!
//! 本 crate 不依赖任何具体实现，所有适配器 crate 通过这里的 Trait 进行装配。

pub mod common;
pub mod config;
pub mod engine;
pub mod market;
pub mod signal;
pub mod store;
pub mod strategy;

#[cfg(feature = "test-utils")]
pub mod test_utils;
