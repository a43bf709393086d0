//! Elementwise RPN expression evaluation.
//!
//! Expressions are comma-separated postfix token streams over constants,
//! previously declared series and a small operator set. Arity and final
//! stack depth are checked once at parse time, so evaluation proper
//! cannot underflow.

use ruc::*;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RpnTok {
    Const(f64),
    /// Index into the processor's series table.
    Var(usize),
    Plus,
    Minus,
    Mul,
    Div,
    Rem,
    Pow,
    Sin,
    Cos,
    Log,
    Exp,
    Atan,
    Sqrt,
    Floor,
    Ceil,
    Min,
    Max,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    If,
    IsInf,
    Un,
    Prev,
    Inf,
    NegInf,
    Unkn,
    Now,
    Time,
    Ltime,
    Step,
    Dup,
    Pop,
    Exc,
}

/// (pops, pushes)
fn arity(t: &RpnTok) -> (usize, usize) {
    use RpnTok::*;
    match t {
        Const(_) | Var(_) | Prev | Inf | NegInf | Unkn | Now | Time | Ltime
        | Step => (0, 1),
        Sin | Cos | Log | Exp | Atan | Sqrt | Floor | Ceil | IsInf | Un => (1, 1),
        Plus | Minus | Mul | Div | Rem | Pow | Min | Max | Lt | Le | Gt | Ge
        | Eq | Ne => (2, 1),
        If => (3, 1),
        Dup => (1, 2),
        Pop => (1, 0),
        Exc => (2, 2),
    }
}

/// Per-element evaluation context.
pub(crate) struct RpnCtx {
    /// Timestamp of the current row.
    pub ts: i64,
    /// Resolved row interval, seconds.
    pub step: i64,
    /// Wall clock at evaluation start.
    pub now: i64,
    /// Local-time offset of the grid, seconds east of UTC.
    pub local_offset: i64,
    /// Previous element of the series being produced; NaN on the first.
    pub prev: f64,
}

pub(crate) struct RpnExpr {
    toks: Vec<RpnTok>,
}

impl RpnExpr {
    /// Compile `expr`, resolving series names through `resolve`.
    pub fn parse(
        expr: &str,
        resolve: impl Fn(&str) -> Option<usize>,
    ) -> Result<Self> {
        let mut toks = Vec::new();
        for raw in expr.split(',') {
            let raw = raw.trim();
            alt!(raw.is_empty(), return Err(eg!("empty rpn token")));
            toks.push(token(raw, &resolve).c(d!())?);
        }

        let mut depth: usize = 0;
        for t in toks.iter() {
            let (pops, pushes) = arity(t);
            alt!(
                depth < pops,
                return Err(eg!(format!("rpn stack underflow at `{t:?}`")))
            );
            depth = depth - pops + pushes;
        }
        alt!(
            1 != depth,
            return Err(eg!(format!(
                "rpn expression leaves {depth} values on the stack"
            )))
        );

        Ok(Self { toks })
    }

    /// Evaluate one element; `series` holds the columns declared so far
    /// and `i` is the current row.
    pub fn eval(&self, ctx: &RpnCtx, series: &[Vec<f64>], i: usize) -> f64 {
        use RpnTok::*;

        let mut stack: Vec<f64> = Vec::with_capacity(8);
        for t in self.toks.iter() {
            match t {
                Const(v) => stack.push(*v),
                Var(idx) => stack.push(series[*idx][i]),
                Prev => stack.push(ctx.prev),
                Inf => stack.push(f64::INFINITY),
                NegInf => stack.push(f64::NEG_INFINITY),
                Unkn => stack.push(f64::NAN),
                Now => stack.push(ctx.now as f64),
                Time => stack.push(ctx.ts as f64),
                Ltime => stack.push((ctx.ts + ctx.local_offset) as f64),
                Step => stack.push(ctx.step as f64),

                Dup => {
                    let a = pop(&mut stack);
                    stack.push(a);
                    stack.push(a);
                }
                Pop => {
                    pop(&mut stack);
                }
                Exc => {
                    let b = pop(&mut stack);
                    let a = pop(&mut stack);
                    stack.push(b);
                    stack.push(a);
                }

                Sin => unary(&mut stack, f64::sin),
                Cos => unary(&mut stack, f64::cos),
                Log => unary(&mut stack, f64::ln),
                Exp => unary(&mut stack, f64::exp),
                Atan => unary(&mut stack, f64::atan),
                Sqrt => unary(&mut stack, f64::sqrt),
                Floor => unary(&mut stack, f64::floor),
                Ceil => unary(&mut stack, f64::ceil),
                IsInf => unary(&mut stack, |a| b2f(a.is_infinite())),
                Un => unary(&mut stack, |a| b2f(a.is_nan())),

                Plus => binary(&mut stack, |a, b| a + b),
                Minus => binary(&mut stack, |a, b| a - b),
                Mul => binary(&mut stack, |a, b| a * b),
                Div => binary(&mut stack, |a, b| a / b),
                Rem => binary(&mut stack, |a, b| a % b),
                Pow => binary(&mut stack, f64::powf),
                Min => binary(&mut stack, |a, b| {
                    if a.is_nan() || b.is_nan() {
                        f64::NAN
                    } else {
                        a.min(b)
                    }
                }),
                Max => binary(&mut stack, |a, b| {
                    if a.is_nan() || b.is_nan() {
                        f64::NAN
                    } else {
                        a.max(b)
                    }
                }),
                Lt => compare(&mut stack, |a, b| a < b),
                Le => compare(&mut stack, |a, b| a <= b),
                Gt => compare(&mut stack, |a, b| a > b),
                Ge => compare(&mut stack, |a, b| a >= b),
                Eq => compare(&mut stack, |a, b| a == b),
                Ne => compare(&mut stack, |a, b| a != b),

                If => {
                    let c = pop(&mut stack);
                    let b = pop(&mut stack);
                    let a = pop(&mut stack);
                    // unknown conditions fall through to the else branch,
                    // so `x UN 0 x IF` patches unknowns
                    stack.push(if !a.is_nan() && 0.0 != a { b } else { c });
                }
            }
        }
        pop(&mut stack)
    }
}

fn b2f(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn pop(stack: &mut Vec<f64>) -> f64 {
    // depth was proven at parse time
    stack.pop().unwrap_or(f64::NAN)
}

fn unary(stack: &mut Vec<f64>, f: impl Fn(f64) -> f64) {
    let a = pop(stack);
    stack.push(f(a));
}

fn binary(stack: &mut Vec<f64>, f: impl Fn(f64, f64) -> f64) {
    let b = pop(stack);
    let a = pop(stack);
    stack.push(f(a, b));
}

fn compare(stack: &mut Vec<f64>, f: impl Fn(f64, f64) -> bool) {
    binary(stack, |a, b| {
        if a.is_nan() || b.is_nan() {
            f64::NAN
        } else {
            b2f(f(a, b))
        }
    });
}

fn token(raw: &str, resolve: &impl Fn(&str) -> Option<usize>) -> Result<RpnTok> {
    use RpnTok::*;
    Ok(match raw {
        "+" => Plus,
        "-" => Minus,
        "*" => Mul,
        "/" => Div,
        "%" => Rem,
        "POW" => Pow,
        "SIN" => Sin,
        "COS" => Cos,
        "LOG" => Log,
        "EXP" => Exp,
        "ATAN" => Atan,
        "SQRT" => Sqrt,
        "FLOOR" => Floor,
        "CEIL" => Ceil,
        "MIN" => Min,
        "MAX" => Max,
        "LT" => Lt,
        "LE" => Le,
        "GT" => Gt,
        "GE" => Ge,
        "EQ" => Eq,
        "NE" => Ne,
        "IF" => If,
        "ISINF" => IsInf,
        "UN" => Un,
        "PREV" => Prev,
        "INF" => Inf,
        "NEGINF" => NegInf,
        "UNKN" => Unkn,
        "NOW" => Now,
        "TIME" => Time,
        "LTIME" => Ltime,
        "STEP" => Step,
        "DUP" => Dup,
        "POP" => Pop,
        "EXC" => Exc,
        name => {
            if let Some(idx) = resolve(name) {
                Var(idx)
            } else if let Ok(v) = name.parse::<f64>() {
                Const(v)
            } else {
                return Err(eg!(format!("unknown rpn token `{name}`")));
            }
        }
    })
}
