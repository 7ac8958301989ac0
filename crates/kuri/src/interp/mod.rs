//! 解释器。两种执行模型共用同一套指令分派，只在名字绑定与副作用上不同。

pub mod bar;
pub mod vector;

use crate::builtins;
use crate::error::KuriError;
use crate::ir::{Builtin, Const, Instr, Program, Reg};
use crate::limits::Budget;
use crate::ops;
use crate::value::{Scalar, Value};

/// # Summary
/// 执行模型相关的环境：变量读写、带副作用的内置函数与条件判定。
pub(crate) trait Env {
    fn load(&mut self, name: &str) -> Result<Value, KuriError>;

    fn store(&mut self, name: &str, value: Value) -> Result<(), KuriError>;

    /// `plot` 与 `strategy.*` 等带副作用的调用
    fn effect(&mut self, func: Builtin, args: &[Value]) -> Result<Value, KuriError>;

    fn condition(&self, value: &Value) -> Result<bool, KuriError>;
}

fn is_effect(func: Builtin) -> bool {
    matches!(
        func,
        Builtin::Plot | Builtin::StrategyEntry | Builtin::StrategyClose
    )
}

fn register(registers: &[Value], reg: Reg) -> Result<&Value, KuriError> {
    registers
        .get(reg)
        .ok_or_else(|| KuriError::type_error(format!("invalid register r{}", reg)))
}

fn set(registers: &mut [Value], reg: Reg, value: Value) -> Result<(), KuriError> {
    let slot = registers
        .get_mut(reg)
        .ok_or_else(|| KuriError::type_error(format!("invalid register r{}", reg)))?;
    *slot = value;
    Ok(())
}

fn constant(value: &Const) -> Value {
    match value {
        Const::Num(n) => Value::num(*n),
        Const::Bool(b) => Value::bool(*b),
        Const::Na => Value::Scalar(Scalar::Na),
        Const::Str(s) => Value::Str(s.clone()),
    }
}

/// # Summary
/// 顺序执行一遍程序。
///
/// # Logic
/// 每条指令先扣减预算，再按指令类型分派；跳转通过改写程序计数器实现。
pub(crate) fn execute<E: Env>(
    program: &Program,
    env: &mut E,
    budget: &mut Budget,
    registers: &mut [Value],
) -> Result<(), KuriError> {
    let mut pc = 0;
    while let Some(instr) = program.instrs.get(pc) {
        budget.tick()?;
        pc += 1;
        match instr {
            Instr::Const { dst, value } => set(registers, *dst, constant(value))?,
            Instr::Load { dst, name } => {
                let value = env.load(name)?;
                set(registers, *dst, value)?;
            }
            Instr::Store { name, src } => {
                let value = register(registers, *src)?.clone();
                env.store(name, value)?;
            }
            Instr::Unary { dst, op, src } => {
                let value = ops::unary(*op, register(registers, *src)?)?;
                set(registers, *dst, value)?;
            }
            Instr::Binary { dst, op, lhs, rhs } => {
                let value = ops::binary(*op, register(registers, *lhs)?, register(registers, *rhs)?)?;
                set(registers, *dst, value)?;
            }
            Instr::Call { dst, func, args } => {
                let values = args
                    .iter()
                    .map(|r| register(registers, *r).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                let value = if is_effect(*func) {
                    env.effect(*func, &values)?
                } else {
                    builtins::call_pure(*func, &values)?
                };
                set(registers, *dst, value)?;
            }
            Instr::JumpIfFalse { cond, target } => {
                if !env.condition(register(registers, *cond)?)? {
                    pc = *target;
                }
            }
            Instr::Jump { target } => pc = *target,
        }
    }
    Ok(())
}
