//! Expression evaluation for the `eval` call kind.
//!
//! There is no general-purpose eval in a compiled language, so the call kind
//! is backed by a pluggable [`Evaluator`]. The default implementation
//! evaluates one arithmetic/comparison expression in an isolated scope, with
//! the call's arguments bound as `$0..$N`. It is deliberately small: enough
//! to materialize values and interrogate state across a connection, nothing
//! more.

use crate::error::RemoteException;
use crate::value::Value;

/// Evaluates one expression string with bound arguments.
pub trait Evaluator: Send + Sync {
    fn eval(&self, src: &str, args: &[Value]) -> Result<Value, RemoteException>;
}

/// The default evaluator: integers, floats, single- or double-quoted
/// strings, `true`/`false`/`null`, argument references `$N`, unary minus,
/// `+ - * / %`, comparisons, and parentheses. `+` concatenates strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEvaluator;

impl Evaluator for ExprEvaluator {
    fn eval(&self, src: &str, args: &[Value]) -> Result<Value, RemoteException> {
        let tokens = tokenize(src)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            args,
        };
        let value = parser.comparison()?;
        if parser.pos != parser.tokens.len() {
            return Err(RemoteException::syntax_error(format!(
                "unexpected trailing input in expression: {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Word(String),
    Arg(usize),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Tok>, RemoteException> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            '+' | '-' | '*' | '/' | '%' => {
                chars.next();
                tokens.push(Tok::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => "%",
                }));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let eq = chars.peek() == Some(&'=');
                if eq {
                    chars.next();
                }
                tokens.push(Tok::Op(match (c, eq) {
                    ('=', true) => "==",
                    ('!', true) => "!=",
                    ('<', true) => "<=",
                    ('>', true) => ">=",
                    ('<', false) => "<",
                    ('>', false) => ">",
                    _ => {
                        return Err(RemoteException::syntax_error(format!(
                            "stray '{}' in expression",
                            c
                        )))
                    }
                }));
            }
            '$' => {
                chars.next();
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                let index = digits.parse::<usize>().map_err(|_| {
                    RemoteException::syntax_error("'$' must be followed by an argument index")
                })?;
                tokens.push(Tok::Arg(index));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => {
                                return Err(RemoteException::syntax_error(
                                    "unterminated string literal",
                                ))
                            }
                        },
                        Some(ch) => text.push(ch),
                        None => {
                            return Err(RemoteException::syntax_error(
                                "unterminated string literal",
                            ))
                        }
                    }
                }
                tokens.push(Tok::Str(text));
            }
            d if d.is_ascii_digit() => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_digit() {
                        text.push(n);
                        chars.next();
                    } else if n == '.' && !is_float {
                        is_float = true;
                        text.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_float {
                    let f = text.parse::<f64>().map_err(|_| {
                        RemoteException::syntax_error(format!("bad number literal '{}'", text))
                    })?;
                    tokens.push(Tok::Float(f));
                } else {
                    let i = text.parse::<i64>().map_err(|_| {
                        RemoteException::syntax_error(format!("bad number literal '{}'", text))
                    })?;
                    tokens.push(Tok::Int(i));
                }
            }
            a if a.is_ascii_alphabetic() || a == '_' => {
                let mut word = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Word(word));
            }
            other => {
                return Err(RemoteException::syntax_error(format!(
                    "unexpected character '{}' in expression",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    args: &'a [Value],
}

impl Parser<'_> {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Tok::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn comparison(&mut self) -> Result<Value, RemoteException> {
        let left = self.additive()?;
        let Some(op) = self
            .peek_op()
            .filter(|op| matches!(*op, "==" | "!=" | "<" | "<=" | ">" | ">="))
        else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.additive()?;
        compare(op, &left, &right)
    }

    fn additive(&mut self) -> Result<Value, RemoteException> {
        let mut acc = self.multiplicative()?;
        while let Some(op) = self.peek_op().filter(|op| matches!(*op, "+" | "-")) {
            self.pos += 1;
            let rhs = self.multiplicative()?;
            acc = arith(op, &acc, &rhs)?;
        }
        Ok(acc)
    }

    fn multiplicative(&mut self) -> Result<Value, RemoteException> {
        let mut acc = self.unary()?;
        while let Some(op) = self.peek_op().filter(|op| matches!(*op, "*" | "/" | "%")) {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = arith(op, &acc, &rhs)?;
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<Value, RemoteException> {
        if self.peek_op() == Some("-") {
            self.pos += 1;
            return match self.unary()? {
                Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(int_overflow),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(RemoteException::type_error(format!(
                    "cannot negate a {}",
                    other.type_name()
                ))),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, RemoteException> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| RemoteException::syntax_error("unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Tok::Int(i) => Ok(Value::Int(i)),
            Tok::Float(f) => Ok(Value::Float(f)),
            Tok::Str(s) => Ok(Value::Str(s)),
            Tok::Word(w) => match w.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                other => Err(RemoteException::name_error(format!(
                    "unknown name '{}' in expression",
                    other
                ))),
            },
            Tok::Arg(index) => self.args.get(index).cloned().ok_or_else(|| {
                RemoteException::argument_error(format!(
                    "expression references ${} but only {} argument(s) were bound",
                    index,
                    self.args.len()
                ))
            }),
            Tok::LParen => {
                let value = self.comparison()?;
                match self.tokens.get(self.pos) {
                    Some(Tok::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(RemoteException::syntax_error("missing closing parenthesis")),
                }
            }
            Tok::RParen | Tok::Op(_) => Err(RemoteException::syntax_error(format!(
                "unexpected token {:?}",
                token
            ))),
        }
    }
}

fn int_overflow() -> RemoteException {
    RemoteException::new("RangeError", "integer overflow")
}

// Peer-supplied expressions must never panic the serving side, so every
// integer operation goes through its checked form.
fn arith(op: &str, left: &Value, right: &Value) -> Result<Value, RemoteException> {
    if op == "+" {
        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            return Ok(Value::Str(format!("{}{}", a, b)));
        }
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => match op {
            "+" => a.checked_add(*b).map(Value::Int).ok_or_else(int_overflow),
            "-" => a.checked_sub(*b).map(Value::Int).ok_or_else(int_overflow),
            "*" => a.checked_mul(*b).map(Value::Int).ok_or_else(int_overflow),
            "/" => {
                if *b == 0 {
                    return Err(RemoteException::new("ZeroDivisionError", "division by zero"));
                }
                a.checked_div(*b).map(Value::Int).ok_or_else(int_overflow)
            }
            _ => {
                if *b == 0 {
                    return Err(RemoteException::new("ZeroDivisionError", "modulo by zero"));
                }
                a.checked_rem(*b).map(Value::Int).ok_or_else(int_overflow)
            }
        },
        _ => {
            let (a, b) = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(RemoteException::type_error(format!(
                        "operator '{}' cannot combine {} and {}",
                        op,
                        left.type_name(),
                        right.type_name()
                    )))
                }
            };
            match op {
                "+" => Ok(Value::Float(a + b)),
                "-" => Ok(Value::Float(a - b)),
                "*" => Ok(Value::Float(a * b)),
                "/" => Ok(Value::Float(a / b)),
                _ => Err(RemoteException::type_error("'%' requires integers")),
            }
        }
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<Value, RemoteException> {
    if op == "==" {
        return Ok(Value::Bool(left == right));
    }
    if op == "!=" {
        return Ok(Value::Bool(left != right));
    }
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| RemoteException::type_error("cannot order NaN"))?,
            _ => {
                return Err(RemoteException::type_error(format!(
                    "operator '{}' cannot order {} and {}",
                    op,
                    left.type_name(),
                    right.type_name()
                )))
            }
        },
    };
    let result = match op {
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> Result<Value, RemoteException> {
        ExprEvaluator.eval(src, &[])
    }

    fn eval_with(src: &str, args: &[Value]) -> Result<Value, RemoteException> {
        ExprEvaluator.eval(src, args)
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("2+3").unwrap(), Value::Int(5));
        assert_eq!(eval("2 + 3 * 4").unwrap(), Value::Int(14));
        assert_eq!(eval("(2 + 3) * 4").unwrap(), Value::Int(20));
        assert_eq!(eval("7 / 2").unwrap(), Value::Int(3));
        assert_eq!(eval("7 % 2").unwrap(), Value::Int(1));
        assert_eq!(eval("-4 + 1").unwrap(), Value::Int(-3));
        assert_eq!(eval("1.5 * 2").unwrap(), Value::Float(3.0));
    }

    #[test]
    fn strings_and_literals() {
        assert_eq!(eval("'ab' + 'cd'").unwrap(), Value::Str("abcd".into()));
        assert_eq!(eval("\"x\"").unwrap(), Value::Str("x".into()));
        assert_eq!(eval("true").unwrap(), Value::Bool(true));
        assert_eq!(eval("null").unwrap(), Value::Null);
    }

    #[test]
    fn argument_binding() {
        let args = [Value::Int(10), Value::Int(4)];
        assert_eq!(eval_with("$0 - $1", &args).unwrap(), Value::Int(6));
        assert_eq!(eval_with("$0 > $1", &args).unwrap(), Value::Bool(true));

        let err = eval_with("$2", &args).unwrap_err();
        assert_eq!(err.kind, "ArgumentError");
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("2 == 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("2 != 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' < 'b'").unwrap(), Value::Bool(true));
        assert_eq!(eval("1.5 >= 2").unwrap(), Value::Bool(false));
    }

    #[test]
    fn failures_carry_kinds() {
        assert_eq!(eval("1 / 0").unwrap_err().kind, "ZeroDivisionError");
        assert_eq!(eval("1 % 0").unwrap_err().kind, "ZeroDivisionError");
        assert_eq!(eval("'a' * 2").unwrap_err().kind, "TypeError");
        assert_eq!(eval("2 +").unwrap_err().kind, "SyntaxError");
        assert_eq!(eval("frobnicate").unwrap_err().kind, "NameError");
        assert_eq!(eval("2 @ 2").unwrap_err().kind, "SyntaxError");
    }

    #[test]
    fn integer_overflow_is_contained() {
        assert_eq!(
            eval("9223372036854775807 + 1").unwrap_err().kind,
            "RangeError"
        );
        assert_eq!(
            eval("0 - 9223372036854775807 - 2").unwrap_err().kind,
            "RangeError"
        );
        assert_eq!(
            eval("9223372036854775807 * 2").unwrap_err().kind,
            "RangeError"
        );
        // i64::MIN has no positive counterpart
        let min = "(0 - 9223372036854775807 - 1)";
        assert_eq!(eval(&format!("{} / -1", min)).unwrap_err().kind, "RangeError");
        assert_eq!(eval(&format!("{} % -1", min)).unwrap_err().kind, "RangeError");
        assert_eq!(eval(&format!("-{}", min)).unwrap_err().kind, "RangeError");
    }
}
