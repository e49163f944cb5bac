//! Tokenizer and recursive-descent parser for the rule expression language.
//!
//! Grammar (loosest binding first):
//!
//! ```text
//! program := stmt (';' stmt)*
//! stmt    := ref '=' expr | expr
//! ref     := 'tables' '[' string ']' ('[' string ']')?
//! expr    := and ('||' and)*
//! and     := cmp ('&&' cmp)*
//! cmp     := sum (('==' | '!=' | '<' | '<=' | '>' | '>=') sum)?
//! sum     := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '!') unary | primary
//! primary := number | string | 'true' | 'false' | 'null' | ref
//!          | ident '(' args ')' | ident | '(' expr ')'
//! ```

use anyhow::{Result, anyhow, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Produced-variable lookup.
    Ident(String),
    /// `tables["name"]`
    Table(String),
    /// `tables["name"]["column"]`
    ColumnRef { table: String, column: String },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub table: String,
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign { target: AssignTarget, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Symbol(&'static str),
}

const TWO_CHAR_SYMBOLS: [&str; 6] = ["==", "!=", "<=", ">=", "&&", "||"];
const ONE_CHAR_SYMBOLS: [&str; 13] = [
    "+", "-", "*", "/", "%", "(", ")", "[", "]", ",", "=", "<", ">",
];

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < chars.len() {
        let ch = chars[pos];
        if ch.is_whitespace() {
            pos += 1;
            continue;
        }
        if ch == '\'' || ch == '"' {
            let quote = ch;
            pos += 1;
            let mut literal = String::new();
            loop {
                let Some(&next) = chars.get(pos) else {
                    bail!("unterminated string literal");
                };
                pos += 1;
                if next == '\\'
                    && let Some(&escaped) = chars.get(pos)
                {
                    literal.push(escaped);
                    pos += 1;
                    continue;
                }
                if next == quote {
                    break;
                }
                literal.push(next);
            }
            tokens.push(Token::Str(literal));
            continue;
        }
        if ch.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let text: String = chars[start..pos].iter().collect();
            let number = text
                .parse::<f64>()
                .map_err(|_| anyhow!("malformed number '{text}'"))?;
            tokens.push(Token::Number(number));
            continue;
        }
        if ch.is_ascii_alphabetic() || ch == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }
        if pos + 1 < chars.len() {
            let pair: String = chars[pos..pos + 2].iter().collect();
            if let Some(symbol) = TWO_CHAR_SYMBOLS.iter().find(|s| **s == pair) {
                tokens.push(Token::Symbol(symbol));
                pos += 2;
                continue;
            }
        }
        let single = ch.to_string();
        if let Some(symbol) = ONE_CHAR_SYMBOLS.iter().find(|s| **s == single) {
            tokens.push(Token::Symbol(symbol));
            pos += 1;
            continue;
        }
        if ch == '!' {
            tokens.push(Token::Symbol("!"));
            pos += 1;
            continue;
        }
        bail!("unexpected character '{ch}'");
    }
    Ok(tokens)
}

/// Splits an authored expression on `;`, trims each component, and parses the
/// non-empty components as statements. An all-empty program is an error so
/// blank `expr1`/`if_error` fields follow the fallback chain.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>> {
    let mut statements = Vec::new();
    for component in src.split(';') {
        let component = component.trim();
        if component.is_empty() {
            continue;
        }
        let tokens = tokenize(component)?;
        let mut parser = Parser { tokens, pos: 0 };
        statements.push(parser.parse_stmt()?);
    }
    if statements.is_empty() {
        bail!("empty expression");
    }
    Ok(statements)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            bail!("expected '{symbol}'")
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(s),
            other => bail!("expected string literal, found {other:?}"),
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let expr = self.parse_expr()?;
        if self.eat_symbol("=") {
            let target = match &expr {
                Expr::Table(table) => AssignTarget {
                    table: table.clone(),
                    column: None,
                },
                Expr::ColumnRef { table, column } => AssignTarget {
                    table: table.clone(),
                    column: Some(column.clone()),
                },
                other => bail!("cannot assign to {other:?}"),
            };
            let value = self.parse_expr()?;
            self.expect_end()?;
            return Ok(Stmt::Assign { target, value });
        }
        self.expect_end()?;
        Ok(Stmt::Expr(expr))
    }

    fn expect_end(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => bail!("trailing input at {token:?}"),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_symbol("||") {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_cmp()?;
        while self.eat_symbol("&&") {
            let right = self.parse_cmp()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let left = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Symbol("==")) => BinaryOp::Eq,
            Some(Token::Symbol("!=")) => BinaryOp::Ne,
            Some(Token::Symbol("<=")) => BinaryOp::Le,
            Some(Token::Symbol(">=")) => BinaryOp::Ge,
            Some(Token::Symbol("<")) => BinaryOp::Lt,
            Some(Token::Symbol(">")) => BinaryOp::Gt,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_sum()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.eat_symbol("+") {
                BinaryOp::Add
            } else if self.eat_symbol("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_symbol("*") {
                BinaryOp::Mul
            } else if self.eat_symbol("/") {
                BinaryOp::Div
            } else if self.eat_symbol("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_symbol("-") {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        if self.eat_symbol("!") {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Symbol("(")) => {
                let expr = self.parse_expr()?;
                self.expect_symbol(")")?;
                Ok(expr)
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "tables" => {
                    self.expect_symbol("[")?;
                    let table = self.expect_string()?;
                    self.expect_symbol("]")?;
                    if self.eat_symbol("[") {
                        let column = self.expect_string()?;
                        self.expect_symbol("]")?;
                        return Ok(Expr::ColumnRef { table, column });
                    }
                    Ok(Expr::Table(table))
                }
                _ => {
                    if self.eat_symbol("(") {
                        let mut args = Vec::new();
                        if !self.eat_symbol(")") {
                            loop {
                                args.push(self.parse_expr()?);
                                if self.eat_symbol(")") {
                                    break;
                                }
                                self.expect_symbol(",")?;
                            }
                        }
                        return Ok(Expr::Call { name: ident, args });
                    }
                    Ok(Expr::Ident(ident))
                }
            },
            other => bail!("unexpected token {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_column_assignment() {
        let program = parse_program(r#"tables["T"]["C"] = tables["T"]["A"] * 2"#).unwrap();
        assert_eq!(program.len(), 1);
        match &program[0] {
            Stmt::Assign { target, value } => {
                assert_eq!(target.table, "T");
                assert_eq!(target.column.as_deref(), Some("C"));
                assert!(matches!(
                    value,
                    Expr::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected stmt {other:?}"),
        }
    }

    #[test]
    fn splits_semicolon_components() {
        let program = parse_program("  1 + 1 ;\n  sum(tables['T']['A']) ; ").unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn empty_program_is_an_error() {
        assert!(parse_program("").is_err());
        assert!(parse_program(" ; ; ").is_err());
    }

    #[test]
    fn precedence_binds_mul_over_add() {
        let program = parse_program("1 + 2 * 3").unwrap();
        let Stmt::Expr(Expr::Binary { op, right, .. }) = &program[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            **right,
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn assignment_target_must_be_a_reference() {
        assert!(parse_program("1 = 2").is_err());
    }
}
