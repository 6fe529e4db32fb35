//! Recursive-descent parser for Callme
//!
//! The parser pulls tokens from the tokenizer on demand through a
//! single-slot pushback buffer. Every read site uses skip-whitespace
//! semantics: a `Whitespace` token is consumed and the following token
//! returned instead. Errors are chained strings naming what was expected
//! and what was actually seen; all productions propagate failure upward.
//!
//! One token carries two meanings: `<` opens a function literal only when
//! it is the first token of an expression ([`Parser::parse_exp`] decides);
//! inside a calculation the same token is the less-than operator.

use crate::ast::{Arg, AssignTarget, BinOp, Exp, FunctionLit, Stmt, ValueKind};
use crate::tokenizer::{Token, TokenKind, Tokenizer, char_literal_value};

pub struct Parser {
    tokenizer: Tokenizer,
    /// Most recently read token; returned again after `unread`.
    buffer: Option<Token>,
    pushed_back: bool,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokenizer: Tokenizer::new(source),
            buffer: None,
            pushed_back: false,
        }
    }

    /// Parse a whole program: a statement sequence followed by `EOF`.
    pub fn parse(&mut self) -> Result<Stmt, String> {
        let stmt = self.parse_seq()?;
        let next = self.read_skip_whitespace();
        if next.kind != TokenKind::Eof {
            return Err(format!(
                "failed to parse the entire program: {}",
                next.text
            ));
        }
        Ok(stmt)
    }

    fn read(&mut self) -> Token {
        if self.pushed_back {
            self.pushed_back = false;
            if let Some(token) = &self.buffer {
                return token.clone();
            }
        }
        let token = self.tokenizer.next_token();
        self.buffer = Some(token.clone());
        token
    }

    fn unread(&mut self) {
        self.pushed_back = true;
    }

    fn read_skip_whitespace(&mut self) -> Token {
        let token = self.read();
        if token.kind == TokenKind::Whitespace {
            return self.read();
        }
        token
    }

    fn parse_seq(&mut self) -> Result<Stmt, String> {
        let mut statements = Vec::new();
        loop {
            let next = self.read_skip_whitespace();
            match next.kind {
                TokenKind::Identifier | TokenKind::Placeholder => {
                    self.unread();
                    let statement = self
                        .parse_assign()
                        .map_err(|e| format!("failed to parse assign statement: {}", e))?;
                    statements.push(statement);
                }
                TokenKind::PrintLn => {
                    self.unread();
                    let statement = self
                        .parse_println()
                        .map_err(|e| format!("failed to parse println statement: {}", e))?;
                    statements.push(statement);
                }
                TokenKind::Return => {
                    let expression = self
                        .parse_exp()
                        .map_err(|e| format!("failed to parse expression after return: {}", e))?;
                    statements.push(Stmt::Return(expression));
                }
                TokenKind::If => {
                    self.unread();
                    let statement = self
                        .parse_if()
                        .map_err(|e| format!("failed to parse if statement: {}", e))?;
                    statements.push(statement);
                }
                TokenKind::Append => {
                    self.unread();
                    let statement = self.parse_append()?;
                    statements.push(statement);
                }
                _ => {
                    self.unread();
                    break;
                }
            }
        }
        Ok(Stmt::Seq(statements))
    }

    fn parse_assign(&mut self) -> Result<Stmt, String> {
        let token = self.read_skip_whitespace();
        let target = match token.kind {
            TokenKind::Identifier => AssignTarget::Name(token.text),
            TokenKind::Placeholder => AssignTarget::Discard,
            _ => {
                return Err(format!(
                    "expected identifier at start of assign statement but got: {}",
                    token.text
                ));
            }
        };

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Assign {
            return Err(format!(
                "expected assign operator in assign statement but got: {}",
                token.text
            ));
        }

        let value = self
            .parse_exp()
            .map_err(|e| format!("failed to parse expression in assign statement: {}", e))?;
        Ok(Stmt::Assign { target, value })
    }

    fn parse_println(&mut self) -> Result<Stmt, String> {
        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::PrintLn {
            return Err("expected println keyword at start of println statement".to_string());
        }
        let expression = self
            .parse_exp()
            .map_err(|e| format!("failed to parse expression in println statement: {}", e))?;
        Ok(Stmt::Println(expression))
    }

    fn parse_if(&mut self) -> Result<Stmt, String> {
        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::If {
            return Err("expected if keyword at start of if statement".to_string());
        }

        let condition = self
            .parse_exp()
            .map_err(|e| format!("failed to parse condition expression in if statement: {}", e))?;

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::LBrace {
            return Err(format!(
                "expected {{ when parsing if statement, but got: {}",
                token.text
            ));
        }

        let body = self
            .parse_seq()
            .map_err(|e| format!("failed to parse sequence in if statement: {}", e))?;

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::RBrace {
            return Err(format!(
                "expected }} when parsing if statement, but got: {}",
                token.text
            ));
        }

        Ok(Stmt::If {
            condition,
            body: Box::new(body),
        })
    }

    fn parse_append(&mut self) -> Result<Stmt, String> {
        Err("append statements are not implemented".to_string())
    }

    /// Expression entry point. Dispatches on the first token: `call`,
    /// a function literal (`<` in leading position only) or a list
    /// literal; everything else is a calculation.
    pub fn parse_exp(&mut self) -> Result<Exp, String> {
        let next = self.read_skip_whitespace();
        self.unread();

        match next.kind {
            TokenKind::Call => self.parse_call(),
            TokenKind::Less => self.parse_function(),
            TokenKind::LBracket => self.parse_list(),
            _ => self.parse_calculation(),
        }
    }

    /// A left-associative fold over `+ - * / %` and the relations
    /// `< > ==`, all at a single precedence level.
    fn parse_calculation(&mut self) -> Result<Exp, String> {
        let mut left = self
            .parse_val()
            .map_err(|e| format!("failed to parse first value in expression: {}", e))?;
        loop {
            let next = self.read_skip_whitespace();
            let op = match next.kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                TokenKind::Less => BinOp::Less,
                TokenKind::Greater => BinOp::Greater,
                TokenKind::Equals => BinOp::Equals,
                _ => {
                    self.unread();
                    break;
                }
            };
            let right = self.parse_val().map_err(|e| {
                format!(
                    "failed to parse right side of '{}' expression: {}",
                    op.symbol(),
                    e
                )
            })?;
            left = Exp::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_val(&mut self) -> Result<Exp, String> {
        let token = self.read_skip_whitespace();
        match token.kind {
            TokenKind::Number => {
                let value = token
                    .text
                    .parse::<i64>()
                    .map_err(|_| format!("failed to parse number literal '{}'", token.text))?;
                Ok(Exp::Num(value))
            }
            TokenKind::True => Ok(Exp::Bool(true)),
            TokenKind::False => Ok(Exp::Bool(false)),
            TokenKind::LParen => {
                let inside = self
                    .parse_exp()
                    .map_err(|e| format!("failed to parse expression in parentheses: {}", e))?;
                let token = self.read_skip_whitespace();
                if token.kind != TokenKind::RParen {
                    return Err("missing closing parenthesis".to_string());
                }
                Ok(Exp::Parenthesized(Box::new(inside)))
            }
            TokenKind::Identifier => Ok(Exp::Identifier(token.text)),
            TokenKind::Minus => {
                let inside = self
                    .parse_exp()
                    .map_err(|e| format!("failed to parse negated expression: {}", e))?;
                Ok(Exp::Negative(Box::new(inside)))
            }
            TokenKind::Character => {
                let value = char_literal_value(&token.text)
                    .ok_or_else(|| format!("invalid character literal {}", token.text))?;
                Ok(Exp::Char(value))
            }
            TokenKind::Get => {
                self.unread();
                self.parse_get_from_list()
            }
            TokenKind::Call => {
                self.unread();
                self.parse_call()
            }
            _ => Err(format!(
                "unexpected token while parsing value: {}",
                token.text
            )),
        }
    }

    /// `call <name> [with <expr> (, <expr>)*]`. The argument list after
    /// `with` may be empty: a nullary call written `call f with` is
    /// accepted.
    fn parse_call(&mut self) -> Result<Exp, String> {
        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Call {
            return Err("expected call keyword at start of function call".to_string());
        }

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Identifier {
            return Err("expected identifier after call keyword in function call".to_string());
        }
        let name = token.text;

        let mut args = Vec::new();
        let token = self.read_skip_whitespace();
        if token.kind == TokenKind::With {
            let next = self.read_skip_whitespace();
            self.unread();
            if starts_expression(next.kind) {
                loop {
                    let arg = self
                        .parse_exp()
                        .map_err(|e| format!("failed to parse argument in function call: {}", e))?;
                    args.push(arg);
                    let token = self.read_skip_whitespace();
                    if token.kind != TokenKind::Comma {
                        self.unread();
                        break;
                    }
                }
            }
        } else {
            self.unread();
        }

        Ok(Exp::Call { name, args })
    }

    /// `<[me,] arg1: T1, …> -> [T] { body }`
    fn parse_function(&mut self) -> Result<Exp, String> {
        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Less {
            return Err("expected < at start of function expression".to_string());
        }

        let mut recurse = None;
        let mut args = Vec::new();
        let mut first = true;
        loop {
            let token = self.read_skip_whitespace();
            if token.kind == TokenKind::Greater {
                break;
            }
            if token.kind != TokenKind::Identifier {
                return Err(format!(
                    "expected identifier when parsing argument list, but got {}",
                    token.text
                ));
            }
            let name = token.text;

            let token = self.read_skip_whitespace();
            if first && name == "me" && token.kind == TokenKind::Greater {
                // Only a recursion name, no arguments.
                recurse = Some(name);
                break;
            }
            if token.kind == TokenKind::Comma && first {
                if name != "me" {
                    return Err("the recursion name of a function has to be 'me'".to_string());
                }
                recurse = Some(name);
                continue;
            }
            first = false;

            if token.kind != TokenKind::Colon {
                return Err(format!(
                    "expected ':' after argument name '{}', but got {}",
                    name, token.text
                ));
            }

            let token = self.read_skip_whitespace();
            let kind = kind_from_type(token.kind);
            if kind == ValueKind::Invalid || kind == ValueKind::Empty {
                return Err(format!(
                    "expected a valid type for argument '{}', but got {}",
                    name, token.text
                ));
            }
            args.push(Arg { name, kind });

            let token = self.read_skip_whitespace();
            if token.kind == TokenKind::Greater {
                break;
            }
            if token.kind == TokenKind::Comma {
                continue;
            }
            return Err("expected comma or end of argument list".to_string());
        }

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Arrow {
            return Err("expected arrow after argument list when parsing function".to_string());
        }

        let token = self.read_skip_whitespace();
        let return_kind;
        if token.kind == TokenKind::LBrace {
            return_kind = ValueKind::Empty;
        } else {
            return_kind = kind_from_type(token.kind);
            if return_kind == ValueKind::Invalid {
                return Err("invalid return type while parsing function definition".to_string());
            }
            let token = self.read_skip_whitespace();
            if token.kind != TokenKind::LBrace {
                return Err("expected opening curly bracket when parsing function".to_string());
            }
        }

        let body = self
            .parse_seq()
            .map_err(|e| format!("failed to parse statements in function: {}", e))?;

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::RBrace {
            return Err("expected closing curly bracket when parsing function".to_string());
        }

        Ok(Exp::Function(FunctionLit {
            recurse,
            args,
            return_kind,
            body: Box::new(body),
        }))
    }

    /// `[ e1, e2, … ] : T : N`
    fn parse_list(&mut self) -> Result<Exp, String> {
        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::LBracket {
            return Err("expected [ at start of list literal".to_string());
        }

        let mut elements = Vec::new();
        let mut first = true;
        loop {
            let token = self.read_skip_whitespace();
            if first && token.kind == TokenKind::RBracket {
                break;
            }
            first = false;
            self.unread();
            let element = self
                .parse_exp()
                .map_err(|e| format!("failed to parse expression in list literal: {}", e))?;
            elements.push(element);
            let token = self.read_skip_whitespace();
            if token.kind == TokenKind::Comma {
                continue;
            }
            if token.kind == TokenKind::RBracket {
                break;
            }
            return Err(format!(
                "unexpected token when parsing list literal: {}",
                token.text
            ));
        }

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Colon {
            return Err("expected ':' after elements of list literal".to_string());
        }

        let token = self.read_skip_whitespace();
        let elem = kind_from_type(token.kind);
        if elem == ValueKind::Invalid || elem == ValueKind::Empty {
            return Err("invalid list element type".to_string());
        }

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Colon {
            return Err("expected ':' before capacity of list literal".to_string());
        }

        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Number {
            return Err("expected number as list capacity".to_string());
        }
        let size = token
            .text
            .parse::<usize>()
            .map_err(|_| format!("failed to parse list capacity '{}'", token.text))?;

        Ok(Exp::List {
            elements,
            elem,
            size,
        })
    }

    /// `get <index> from <list>`
    fn parse_get_from_list(&mut self) -> Result<Exp, String> {
        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::Get {
            return Err("expected get keyword when parsing get from list".to_string());
        }
        let index = self
            .parse_exp()
            .map_err(|e| format!("failed to parse index expression in get from list: {}", e))?;
        let token = self.read_skip_whitespace();
        if token.kind != TokenKind::From {
            return Err("expected from keyword when parsing get from list".to_string());
        }
        let list = self
            .parse_exp()
            .map_err(|e| format!("failed to parse list expression in get from list: {}", e))?;
        Ok(Exp::GetFromList {
            index: Box::new(index),
            list: Box::new(list),
        })
    }
}

/// Map a type-name token to the kind it denotes. Only `int`, `char` and
/// `bool` name usable binding types; everything else is `Invalid`.
fn kind_from_type(kind: TokenKind) -> ValueKind {
    match kind {
        TokenKind::TypeInt => ValueKind::Number,
        TokenKind::TypeChar => ValueKind::Character,
        TokenKind::TypeBool => ValueKind::Boolean,
        _ => ValueKind::Invalid,
    }
}

/// Whether a token can begin an expression. Used to allow a nullary
/// `call f with` to terminate its (empty) argument list.
fn starts_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number
            | TokenKind::True
            | TokenKind::False
            | TokenKind::LParen
            | TokenKind::Identifier
            | TokenKind::Minus
            | TokenKind::Character
            | TokenKind::Get
            | TokenKind::Call
            | TokenKind::Less
            | TokenKind::LBracket
    )
}
