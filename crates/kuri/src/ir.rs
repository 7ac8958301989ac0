use crate::ast::{BinaryOp, Expr, Script, Stmt, UnaryOp};
use crate::error::KuriError;
use std::collections::HashSet;

/// 虚拟寄存器编号
pub type Reg = usize;

/// 行情内置序列名
pub const MARKET_SERIES: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// # Summary
/// 内置函数表。名字在降级阶段解析，运行时不再做字符串匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Sma,
    Ema,
    Rsi,
    Crossover,
    Crossunder,
    Plot,
    StrategyEntry,
    StrategyClose,
}

impl Builtin {
    pub fn resolve(name: &str) -> Option<Self> {
        let builtin = match name {
            "sma" | "ta.sma" => Builtin::Sma,
            "ema" | "ta.ema" => Builtin::Ema,
            "rsi" | "ta.rsi" => Builtin::Rsi,
            "crossover" | "ta.crossover" => Builtin::Crossover,
            "crossunder" | "ta.crossunder" => Builtin::Crossunder,
            "plot" => Builtin::Plot,
            "strategy.entry" => Builtin::StrategyEntry,
            "strategy.close" => Builtin::StrategyClose,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Sma => "sma",
            Builtin::Ema => "ema",
            Builtin::Rsi => "rsi",
            Builtin::Crossover => "crossover",
            Builtin::Crossunder => "crossunder",
            Builtin::Plot => "plot",
            Builtin::StrategyEntry => "strategy.entry",
            Builtin::StrategyClose => "strategy.close",
        }
    }

    // 允许的实参个数 (闭区间)
    fn arity(&self) -> (usize, usize) {
        match self {
            Builtin::Sma | Builtin::Ema | Builtin::Crossover | Builtin::Crossunder => (2, 2),
            Builtin::Rsi | Builtin::Plot => (1, 2),
            Builtin::StrategyEntry => (3, 5),
            Builtin::StrategyClose => (2, 2),
        }
    }
}

/// 常量
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Num(f64),
    Bool(bool),
    Na,
    Str(String),
}

/// # Summary
/// 寄存器式中间表示指令。
///
/// # Invariants
/// - 跳转目标总是落在 `[0, instrs.len()]` 区间内，等于长度表示程序结束。
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Const { dst: Reg, value: Const },
    Load { dst: Reg, name: String },
    Store { name: String, src: Reg },
    Unary { dst: Reg, op: UnaryOp, src: Reg },
    Binary { dst: Reg, op: BinaryOp, lhs: Reg, rhs: Reg },
    Call { dst: Reg, func: Builtin, args: Vec<Reg> },
    JumpIfFalse { cond: Reg, target: usize },
    Jump { target: usize },
}

/// 降级后的可执行程序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub instrs: Vec<Instr>,
    pub registers: usize,
    // 脚本中出现过赋值的变量名，按首次出现顺序排列
    pub variables: Vec<String>,
}

impl Program {
    /// 脚本中是否调用了指定内置函数
    pub fn uses(&self, func: Builtin) -> bool {
        self.instrs
            .iter()
            .any(|i| matches!(i, Instr::Call { func: f, .. } if *f == func))
    }
}

/// # Summary
/// 将语法树降级为寄存器式 IR。
///
/// # Logic
/// 1. 先收集全部赋值目标，使变量可以在首次赋值之前被引用 (此时值为 `na`)。
/// 2. 引用既不是行情序列也不是赋值目标的名字，视为未定义变量。
/// 3. 函数名解析为 `Builtin`，未知函数与实参个数错误均在此阶段报告。
///
/// # Returns
/// * `Result<Program, KuriError>` - 编译期错误。
pub fn lower(script: &Script) -> Result<Program, KuriError> {
    let mut variables = Vec::new();
    collect_assignments(&script.statements, &mut variables);
    let known: HashSet<String> = variables.iter().cloned().collect();

    let mut lowerer = Lowerer {
        instrs: Vec::new(),
        next_reg: 0,
        known,
    };
    lowerer.block(&script.statements)?;
    Ok(Program {
        instrs: lowerer.instrs,
        registers: lowerer.next_reg,
        variables,
    })
}

fn collect_assignments(statements: &[Stmt], out: &mut Vec<String>) {
    for stmt in statements {
        match stmt {
            Stmt::Assign { name, .. } => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_assignments(then_branch, out);
                collect_assignments(else_branch, out);
            }
            Stmt::Expr(_) => {}
        }
    }
}

struct Lowerer {
    instrs: Vec<Instr>,
    next_reg: Reg,
    known: HashSet<String>,
}

impl Lowerer {
    fn alloc(&mut self) -> Reg {
        let reg = self.next_reg;
        self.next_reg += 1;
        reg
    }

    fn block(&mut self, statements: &[Stmt]) -> Result<(), KuriError> {
        for stmt in statements {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), KuriError> {
        match stmt {
            Stmt::Assign { name, expr } => {
                let src = self.expr(expr)?;
                self.instrs.push(Instr::Store {
                    name: name.clone(),
                    src,
                });
            }
            Stmt::Expr(expr) => {
                self.expr(expr)?;
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.expr(cond)?;
                let branch_at = self.instrs.len();
                self.instrs.push(Instr::JumpIfFalse { cond, target: 0 });
                self.block(then_branch)?;

                if else_branch.is_empty() {
                    self.patch(branch_at, self.instrs.len());
                } else {
                    let skip_at = self.instrs.len();
                    self.instrs.push(Instr::Jump { target: 0 });
                    self.patch(branch_at, self.instrs.len());
                    self.block(else_branch)?;
                    self.patch(skip_at, self.instrs.len());
                }
            }
        }
        Ok(())
    }

    fn patch(&mut self, at: usize, to: usize) {
        if let Some(Instr::JumpIfFalse { target, .. } | Instr::Jump { target }) =
            self.instrs.get_mut(at)
        {
            *target = to;
        }
    }

    fn constant(&mut self, value: Const) -> Reg {
        let dst = self.alloc();
        self.instrs.push(Instr::Const { dst, value });
        dst
    }

    fn expr(&mut self, expr: &Expr) -> Result<Reg, KuriError> {
        let reg = match expr {
            Expr::Number(n) => self.constant(Const::Num(*n)),
            Expr::Bool(b) => self.constant(Const::Bool(*b)),
            Expr::Na => self.constant(Const::Na),
            Expr::Str(s) => self.constant(Const::Str(s.clone())),
            Expr::Ident(name) => match name.as_str() {
                "strategy.long" => self.constant(Const::Str("long".to_string())),
                "strategy.short" => self.constant(Const::Str("short".to_string())),
                _ if self.known.contains(name) || MARKET_SERIES.contains(&name.as_str()) => {
                    let dst = self.alloc();
                    self.instrs.push(Instr::Load {
                        dst,
                        name: name.clone(),
                    });
                    dst
                }
                _ => return Err(KuriError::UndefinedVariable(name.clone())),
            },
            Expr::Unary { op, expr } => {
                let src = self.expr(expr)?;
                let dst = self.alloc();
                self.instrs.push(Instr::Unary { dst, op: *op, src });
                dst
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                let dst = self.alloc();
                self.instrs.push(Instr::Binary {
                    dst,
                    op: *op,
                    lhs,
                    rhs,
                });
                dst
            }
            Expr::Call { name, args } => {
                let func = Builtin::resolve(name)
                    .ok_or_else(|| KuriError::UnknownFunction(name.clone()))?;
                let (min, max) = func.arity();
                if args.len() < min || args.len() > max {
                    let expected = if min == max {
                        min.to_string()
                    } else {
                        format!("{}..{}", min, max)
                    };
                    return Err(KuriError::Arity {
                        function: func.name().to_string(),
                        expected,
                        got: args.len(),
                    });
                }
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                let dst = self.alloc();
                self.instrs.push(Instr::Call { dst, func, args });
                dst
            }
        };
        Ok(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn lower_src(source: &str) -> Result<Program, KuriError> {
        lower(&parse(&tokenize(source)?)?)
    }

    #[test]
    fn test_unknown_function_is_compile_error() {
        let err = lower_src("x = foo(close)").unwrap_err();
        assert_eq!(err, KuriError::UnknownFunction("foo".into()));
        assert!(err.is_compile_error());
    }

    #[test]
    fn test_undefined_variable_is_compile_error() {
        let err = lower_src("x = close + missing").unwrap_err();
        assert_eq!(err, KuriError::UndefinedVariable("missing".into()));
    }

    #[test]
    fn test_forward_reference_to_assigned_variable_is_allowed() {
        let program = lower_src("y = x\nx = 1").unwrap();
        assert_eq!(program.variables, vec!["y".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_arity_is_checked() {
        let err = lower_src("x = sma(close)").unwrap_err();
        assert!(matches!(err, KuriError::Arity { got: 1, .. }));
        assert!(lower_src("x = rsi(close)").is_ok());
        assert!(lower_src("strategy.entry(\"L\", strategy.long, true, 1, 2, 3)").is_err());
    }

    #[test]
    fn test_if_else_jump_targets() {
        let program = lower_src("if close > open { a = 1 } else { a = 2 }").unwrap();
        let jumps: Vec<&Instr> = program
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::Jump { .. } | Instr::JumpIfFalse { .. }))
            .collect();
        assert_eq!(jumps.len(), 2);
        let len = program.instrs.len();
        assert_eq!(jumps[1], &Instr::Jump { target: len });
        for instr in &program.instrs {
            if let Instr::JumpIfFalse { target, .. } = instr {
                assert!(matches!(program.instrs[*target], Instr::Const { .. }));
            }
        }
        assert!(!program.uses(Builtin::Sma));
    }
}
