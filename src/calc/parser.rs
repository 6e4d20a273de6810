// src/calc/parser.rs
//
// Tokenizer and parser for the calc language.
// Supports:
// - integers: 1, 42
// - strings: "hi"
// - variables: name, x1
// - binary ops: +, -, *, /
// - zero-arg calls: answer()
// - statements: `let x = expr;`, `let x: int = expr;`, `return expr;`,
//   bare `expr;`
// - regular units: `fn main() { ... }`
//
// Every token carries its line and column (both 1-based) so diagnostics
// can point at the offending location. Lines starting with '#' (after
// trimming) are comments.

use crate::backend::Diagnostic;

use super::ast::{BinOp, Expr, ExprKind, Program, Stmt, StmtKind, Ty};

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Int(i64),
    Str(String),
    Ident(String),
    KwLet,
    KwReturn,
    KwFn,
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    Semi,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Eof,
}

impl TokKind {
    fn describe(&self) -> String {
        match self {
            TokKind::Int(n) => format!("integer '{n}'"),
            TokKind::Str(_) => "string literal".to_string(),
            TokKind::Ident(name) => format!("identifier '{name}'"),
            TokKind::KwLet => "'let'".to_string(),
            TokKind::KwReturn => "'return'".to_string(),
            TokKind::KwFn => "'fn'".to_string(),
            TokKind::Plus => "'+'".to_string(),
            TokKind::Minus => "'-'".to_string(),
            TokKind::Star => "'*'".to_string(),
            TokKind::Slash => "'/'".to_string(),
            TokKind::Assign => "'='".to_string(),
            TokKind::Semi => "';'".to_string(),
            TokKind::Colon => "':'".to_string(),
            TokKind::LParen => "'('".to_string(),
            TokKind::RParen => "')'".to_string(),
            TokKind::LBrace => "'{'".to_string(),
            TokKind::RBrace => "'}'".to_string(),
            TokKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokKind,
    line: u32,
    column: u32,
}

const SYNTAX_ERROR: &str = "CALC0001";

fn syntax_error(line: u32, column: u32, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(line, column, SYNTAX_ERROR, message)
}

fn tokenize(source: &str) -> Result<Vec<Token>, Diagnostic> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line: u32 = 1;
    let mut column: u32 = 1;

    while i < chars.len() {
        let c = chars[i];
        let (tok_line, tok_col) = (line, column);

        let advance = |i: &mut usize, line: &mut u32, column: &mut u32| {
            if chars[*i] == '\n' {
                *line += 1;
                *column = 1;
            } else {
                *column += 1;
            }
            *i += 1;
        };

        if c.is_whitespace() {
            advance(&mut i, &mut line, &mut column);
            continue;
        }

        // '#' comments run to end of line.
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                advance(&mut i, &mut line, &mut column);
            }
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                advance(&mut i, &mut line, &mut column);
            }
            let text: String = chars[start..i].iter().collect();
            let value: i64 = text.parse().map_err(|_| {
                syntax_error(tok_line, tok_col, format!("invalid integer literal '{text}'"))
            })?;
            tokens.push(Token {
                kind: TokKind::Int(value),
                line: tok_line,
                column: tok_col,
            });
            continue;
        }

        if c == '"' {
            advance(&mut i, &mut line, &mut column);
            let mut text = String::new();
            loop {
                if i >= chars.len() || chars[i] == '\n' {
                    return Err(syntax_error(tok_line, tok_col, "unterminated string literal"));
                }
                if chars[i] == '"' {
                    advance(&mut i, &mut line, &mut column);
                    break;
                }
                text.push(chars[i]);
                advance(&mut i, &mut line, &mut column);
            }
            tokens.push(Token {
                kind: TokKind::Str(text),
                line: tok_line,
                column: tok_col,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                advance(&mut i, &mut line, &mut column);
            }
            let text: String = chars[start..i].iter().collect();
            let kind = match text.as_str() {
                "let" => TokKind::KwLet,
                "return" => TokKind::KwReturn,
                "fn" => TokKind::KwFn,
                _ => TokKind::Ident(text),
            };
            tokens.push(Token {
                kind,
                line: tok_line,
                column: tok_col,
            });
            continue;
        }

        let kind = match c {
            '+' => TokKind::Plus,
            '-' => TokKind::Minus,
            '*' => TokKind::Star,
            '/' => TokKind::Slash,
            '=' => TokKind::Assign,
            ';' => TokKind::Semi,
            ':' => TokKind::Colon,
            '(' => TokKind::LParen,
            ')' => TokKind::RParen,
            '{' => TokKind::LBrace,
            '}' => TokKind::RBrace,
            other => {
                return Err(syntax_error(
                    tok_line,
                    tok_col,
                    format!("unexpected character '{other}'"),
                ));
            }
        };
        advance(&mut i, &mut line, &mut column);
        tokens.push(Token {
            kind,
            line: tok_line,
            column: tok_col,
        });
    }

    tokens.push(Token {
        kind: TokKind::Eof,
        line,
        column,
    });
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokKind, what: &str) -> Result<Token, Diagnostic> {
        let tok = self.next();
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(syntax_error(
                tok.line,
                tok.column,
                format!("expected {what}, found {}", tok.kind.describe()),
            ))
        }
    }

    fn parse_statements(&mut self, terminator: &TokKind) -> Result<Vec<Stmt>, Diagnostic> {
        let mut stmts = Vec::new();
        while &self.peek().kind != terminator {
            if self.peek().kind == TokKind::Eof {
                let tok = self.peek();
                return Err(syntax_error(
                    tok.line,
                    tok.column,
                    format!("expected {}, found end of input", terminator.describe()),
                ));
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let tok = self.peek().clone();
        match tok.kind {
            TokKind::KwLet => {
                self.next();
                let name_tok = self.next();
                let name = match name_tok.kind {
                    TokKind::Ident(name) => name,
                    other => {
                        return Err(syntax_error(
                            name_tok.line,
                            name_tok.column,
                            format!("expected a variable name after 'let', found {}", other.describe()),
                        ));
                    }
                };
                let ty = if self.peek().kind == TokKind::Colon {
                    self.next();
                    Some(self.parse_type()?)
                } else {
                    None
                };
                self.expect(TokKind::Assign, "'='")?;
                let value = self.parse_expr()?;
                self.expect(TokKind::Semi, "';'")?;
                Ok(Stmt {
                    line: tok.line,
                    column: tok.column,
                    kind: StmtKind::Let { name, ty, value },
                })
            }
            TokKind::KwReturn => {
                self.next();
                let value = self.parse_expr()?;
                self.expect(TokKind::Semi, "';'")?;
                Ok(Stmt {
                    line: tok.line,
                    column: tok.column,
                    kind: StmtKind::Return(value),
                })
            }
            _ => {
                let value = self.parse_expr()?;
                self.expect(TokKind::Semi, "';'")?;
                Ok(Stmt {
                    line: tok.line,
                    column: tok.column,
                    kind: StmtKind::Expr(value),
                })
            }
        }
    }

    fn parse_type(&mut self) -> Result<Ty, Diagnostic> {
        let tok = self.next();
        match tok.kind {
            TokKind::Ident(name) => match name.as_str() {
                "int" => Ok(Ty::Int),
                "string" | "str" => Ok(Ty::Str),
                other => Err(syntax_error(
                    tok.line,
                    tok.column,
                    format!("unknown type '{other}' (expected 'int' or 'string')"),
                )),
            },
            other => Err(syntax_error(
                tok.line,
                tok.column,
                format!("expected a type name, found {}", other.describe()),
            )),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Plus => BinOp::Add,
                TokKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Star => BinOp::Mul,
                TokKind::Slash => BinOp::Div,
                _ => break,
            };
            self.next();
            let rhs = self.parse_factor()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let tok = self.next();
        match tok.kind {
            TokKind::Int(value) => Ok(Expr {
                line: tok.line,
                column: tok.column,
                kind: ExprKind::Int(value),
            }),
            TokKind::Str(value) => Ok(Expr {
                line: tok.line,
                column: tok.column,
                kind: ExprKind::Str(value),
            }),
            TokKind::Ident(name) => {
                if self.peek().kind == TokKind::LParen {
                    self.next();
                    self.expect(TokKind::RParen, "')' (calls take no arguments)")?;
                    Ok(Expr {
                        line: tok.line,
                        column: tok.column,
                        kind: ExprKind::Call(name),
                    })
                } else {
                    Ok(Expr {
                        line: tok.line,
                        column: tok.column,
                        kind: ExprKind::Var(name),
                    })
                }
            }
            TokKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokKind::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(syntax_error(
                tok.line,
                tok.column,
                format!("expected an expression, found {}", other.describe()),
            )),
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        line: lhs.line,
        column: lhs.column,
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

/// Parse script-kind source: a bare sequence of top-level statements.
pub fn parse_script(source: &str) -> Result<Program, Diagnostic> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmts = parser.parse_statements(&TokKind::Eof)?;
    Ok(Program { stmts })
}

/// Parse regular-kind source: a complete unit of the form
/// `fn main() { ... }`.
pub fn parse_regular(source: &str) -> Result<Program, Diagnostic> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };

    parser.expect(TokKind::KwFn, "a complete unit starting with 'fn main()'")?;
    let name_tok = parser.next();
    match &name_tok.kind {
        TokKind::Ident(name) if name == "main" => {}
        other => {
            return Err(syntax_error(
                name_tok.line,
                name_tok.column,
                format!("expected 'main', found {}", other.describe()),
            ));
        }
    }
    parser.expect(TokKind::LParen, "'('")?;
    parser.expect(TokKind::RParen, "')'")?;
    parser.expect(TokKind::LBrace, "'{'")?;
    let stmts = parser.parse_statements(&TokKind::RBrace)?;
    parser.expect(TokKind::RBrace, "'}'")?;
    parser.expect(TokKind::Eof, "end of input")?;

    Ok(Program { stmts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_let_and_return() {
        let program = parse_script("let x = 1 + 2;\nreturn x * 3;").unwrap();
        assert_eq!(program.stmts.len(), 2);
    }

    #[test]
    fn syntax_error_points_at_offending_location() {
        let err = parse_script("let x = 1;\nlet = 2;").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
        assert_eq!(err.code, "CALC0001");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = parse_script("let s = \"oops;").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn precedence_binds_mul_tighter_than_add() {
        let program = parse_script("return 1 + 2 * 3;").unwrap();
        let StmtKind::Return(expr) = &program.stmts[0].kind else {
            panic!("expected return");
        };
        let ExprKind::Binary { op, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
    }

    #[test]
    fn regular_kind_requires_fn_main() {
        assert!(parse_regular("fn main() { return 1; }").is_ok());
        let err = parse_regular("return 1;").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 1);
    }

    #[test]
    fn comments_are_ignored() {
        let program = parse_script("# setup\nreturn 4; # done\n").unwrap();
        assert_eq!(program.stmts.len(), 1);
    }

    #[test]
    fn zero_arg_call_parses() {
        let program = parse_script("return answer();").unwrap();
        let StmtKind::Return(expr) = &program.stmts[0].kind else {
            panic!("expected return");
        };
        assert_eq!(expr.kind, ExprKind::Call("answer".to_string()));
    }
}
