use chumsky::{IterParser, error::Rich, extra, prelude::*};
use thiserror::Error;

use crate::symbols::SymbolTable;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(i64),
    Symbol(String),
    CurrentPc,
    Unary {
        op: UnOp,
        rhs: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Minus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    And,
    Xor,
    Or,
    LogicAnd,
    LogicOr,
}

/// Why an expression produced no value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A symbol has no value yet; a later pass may supply one.
    #[error("`{symbol}` is not resolved")]
    Unresolved { symbol: String },
    #[error("{0}")]
    Malformed(String),
    #[error("division by zero")]
    DivisionByZero,
}

type ExprError<'src> = Rich<'src, char>;
type ExprExtra<'src> = extra::Err<ExprError<'src>>;

pub fn parse_expr(input: &str) -> Result<Expr, EvalError> {
    if input.trim().is_empty() {
        return Err(EvalError::Malformed("missing expression".to_string()));
    }
    expr_parser()
        .padded()
        .then_ignore(end())
        .parse(input)
        .into_result()
        .map_err(|errs| EvalError::Malformed(format_parser_errors(errs, input)))
}

pub fn eval_expr(
    expr: &Expr,
    lookup: &dyn Fn(&str) -> Result<i64, EvalError>,
    current_pc: i64,
) -> Result<i64, EvalError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Symbol(name) => lookup(name),
        Expr::CurrentPc => Ok(current_pc),
        Expr::Unary { op, rhs } => {
            let value = eval_expr(rhs, lookup, current_pc)?;
            match op {
                UnOp::Plus => Ok(value),
                UnOp::Minus => Ok(value.wrapping_neg()),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = eval_expr(lhs, lookup, current_pc)?;
            let right = eval_expr(rhs, lookup, current_pc)?;
            match op {
                BinOp::Mul => Ok(left.wrapping_mul(right)),
                BinOp::Div if right == 0 => Err(EvalError::DivisionByZero),
                BinOp::Div => Ok(left.wrapping_div(right)),
                BinOp::Rem if right == 0 => Err(EvalError::DivisionByZero),
                BinOp::Rem => Ok(left.wrapping_rem(right)),
                BinOp::Add => Ok(left.wrapping_add(right)),
                BinOp::Sub => Ok(left.wrapping_sub(right)),
                BinOp::Shl => shift_amount(right).map(|amount| left.wrapping_shl(amount)),
                BinOp::Shr => shift_amount(right).map(|amount| left.wrapping_shr(amount)),
                BinOp::And => Ok(left & right),
                BinOp::Xor => Ok(left ^ right),
                BinOp::Or => Ok(left | right),
                BinOp::LogicAnd => Ok(i64::from(left != 0 && right != 0)),
                BinOp::LogicOr => Ok(i64::from(left != 0 || right != 0)),
            }
        }
    }
}

/// Parses and evaluates `text`, resolving symbols nearest to `anchor`.
pub fn evaluate(symbols: &SymbolTable, anchor: u32, text: &str) -> Result<i64, EvalError> {
    let expr = parse_expr(text)?;
    eval_expr(&expr, &|path| symbols.lookup(path, anchor), i64::from(anchor))
}

/// Evaluates an expression that may not reference any symbol.
pub fn eval_constant(text: &str) -> Result<i64, EvalError> {
    let expr = parse_expr(text)?;
    eval_expr(
        &expr,
        &|name| {
            Err(EvalError::Malformed(format!(
                "`{name}` cannot be used in a constant expression"
            )))
        },
        0,
    )
}

fn shift_amount(value: i64) -> Result<u32, EvalError> {
    u32::try_from(value)
        .ok()
        .filter(|amount| *amount < 64)
        .ok_or_else(|| EvalError::Malformed(format!("shift amount {value} out of range")))
}

fn is_symbol_start(c: &char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '#')
}

fn is_symbol_char(c: &char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '#')
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn expr_parser<'src>() -> impl Parser<'src, &'src str, Expr, ExprExtra<'src>> {
    recursive(|expr| {
        let hex_digits = any()
            .filter(|c: &char| c.is_ascii_hexdigit())
            .repeated()
            .at_least(1)
            .to_slice()
            .try_map(|raw: &str, span| {
                i64::from_str_radix(raw, 16)
                    .map(Expr::Number)
                    .map_err(|_| Rich::custom(span, "invalid hexadecimal literal"))
            });

        let number = choice((
            just("0x")
                .or(just("0X"))
                .ignore_then(hex_digits.clone()),
            just('$').ignore_then(hex_digits),
            text::int(10).try_map(|raw: &str, span| {
                raw.parse::<i64>()
                    .map(Expr::Number)
                    .map_err(|_| Rich::custom(span, "invalid decimal literal"))
            }),
        ))
        .padded();

        let symbol = any()
            .filter(is_symbol_start)
            .then(any().filter(is_symbol_char).repeated())
            .to_slice()
            .map(|name: &str| Expr::Symbol(name.to_string()))
            .padded();
        let current_pc = just('*').to(Expr::CurrentPc).padded();

        let atom = choice((
            number,
            symbol,
            current_pc,
            expr.delimited_by(just('(').padded(), just(')').padded()),
        ));

        let unary = choice((just('+').to(UnOp::Plus), just('-').to(UnOp::Minus)))
            .padded()
            .repeated()
            .collect::<Vec<_>>()
            .then(atom)
            .map(|(ops, mut rhs)| {
                for op in ops.into_iter().rev() {
                    rhs = Expr::Unary {
                        op,
                        rhs: Box::new(rhs),
                    };
                }
                rhs
            });

        let product = unary.clone().foldl(
            choice((
                just('*').to(BinOp::Mul),
                just('/').to(BinOp::Div),
                just('%').to(BinOp::Rem),
            ))
            .padded()
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let sum = product.clone().foldl(
            choice((just('+').to(BinOp::Add), just('-').to(BinOp::Sub)))
                .padded()
                .then(product)
                .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let shifts = sum.clone().foldl(
            choice((just("<<").to(BinOp::Shl), just(">>").to(BinOp::Shr)))
                .padded()
                .then(sum)
                .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let ands = shifts.clone().foldl(
            just('&')
                .then_ignore(just('&').not())
                .to(BinOp::And)
                .padded()
                .then(shifts)
                .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let xors = ands.clone().foldl(
            just('^').to(BinOp::Xor).padded().then(ands).repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let ors = xors.clone().foldl(
            just('|')
                .then_ignore(just('|').not())
                .to(BinOp::Or)
                .padded()
                .then(xors)
                .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let logic_ands = ors.clone().foldl(
            just("&&").to(BinOp::LogicAnd).padded().then(ors).repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        logic_ands.clone().foldl(
            just("||")
                .to(BinOp::LogicOr)
                .padded()
                .then(logic_ands)
                .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        )
    })
}

fn format_parser_errors(errs: Vec<ExprError<'_>>, input: &str) -> String {
    errs.into_iter()
        .map(|err| {
            let span = err.span();
            format!(
                "{} at {}..{} in `{input}`",
                err.reason(),
                span.start,
                span.end
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}
