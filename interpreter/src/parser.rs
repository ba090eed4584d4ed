use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::error::Error;
use crate::limits::{MAX_ARGS, MAX_PARAMS};
use crate::stack::ensure_sufficient_stack;
use reflox_core::{Literal, Token, Type};
use std::fmt;
use std::rc::Rc;

pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    // Problems that don't prevent building the tree, and errors of statements that were skipped
    // by synchronization.
    errors: Vec<Error>,
}

// A wrapper over vector of statements to not leak Stmt to public
#[derive(Debug, PartialEq)]
pub struct StmtStream(pub(crate) Vec<Stmt>);

// Helper alias for shorter return types
type ParserResult = Result<StmtStream, Vec<Error>>;
type BlockResult = Result<Vec<Stmt>, Error>;
type StmtResult = Result<Stmt, Error>;
type ExprResult = Result<Expr, Error>;
type FunctionResult = Result<FunctionDecl, Error>;

// Function kind to differentiate between functions, class methods and function literals during
// parsing
#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionKind {
    Function,
    Method,
    Lambda,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Function | FunctionKind::Lambda => write!(f, "function"),
            FunctionKind::Method => write!(f, "method"),
        }
    }
}

impl<'a> Parser<'a> {
    /// `tokens` must end with the end-of-file token, as produced by the scanner.
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> ParserResult {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        if self.errors.is_empty() {
            Ok(StmtStream(statements))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    // Returns `None` when the declaration had a fatal error, the error is recorded and the parser
    // is moved to the next statement boundary.
    fn declaration(&mut self) -> Option<Stmt> {
        let res = if self.match_one(Type::Class) {
            self.class_declaration()
        } else if self.check(Type::Fun) && self.check_next(Type::Identifier) {
            self.advance();
            self.function_declaration()
        } else if self.match_one(Type::Var) {
            self.var_declaration()
        } else {
            self.statement()
        };

        match res {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                self.errors.push(err);
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> StmtResult {
        let name = self
            .consume(Type::Identifier, "Expect class name.")?
            .clone();

        let mut superclass = None;
        if self.match_one(Type::Less) {
            self.consume(Type::Identifier, "Expect superclass name.")?;
            superclass = Some(Expr::variable(self.previous().clone()));
        }

        self.consume(Type::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        let mut class_methods = Vec::new();
        while !self.check(Type::RightBrace) && !self.is_at_end() {
            let is_class_method = self.match_one(Type::Class);
            let name = self
                .consume(Type::Identifier, "Expect method name.")?
                .clone();
            let method = Rc::new(self.function(Some(name), FunctionKind::Method)?);

            if is_class_method {
                class_methods.push(method);
            } else {
                methods.push(method);
            }
        }
        self.consume(Type::RightBrace, "Expect '}' after class body.")?;
        Ok(Stmt::class(name, superclass, methods, class_methods))
    }

    // `fun name() {}` is a variable holding a named function literal.
    fn function_declaration(&mut self) -> StmtResult {
        let name = self
            .consume(Type::Identifier, "Expect function name.")?
            .clone();
        let function = self.function(Some(name.clone()), FunctionKind::Function)?;
        Ok(Stmt::var(name, Some(Expr::function(function))))
    }

    // Parses what follows the name: the parameter list and the body. Methods without a parameter
    // list are getters.
    fn function(&mut self, name: Option<Token>, kind: FunctionKind) -> FunctionResult {
        let params = if kind == FunctionKind::Method && !self.check(Type::LeftParen) {
            None
        } else {
            let msg = match kind {
                FunctionKind::Lambda => String::from("Expect '(' after 'fun'."),
                _ => format!("Expect '(' after {} name.", kind),
            };
            self.consume(Type::LeftParen, &msg)?;

            let mut params = Vec::new();
            if !self.check(Type::RightParen) {
                loop {
                    if params.len() >= MAX_PARAMS {
                        let token = self.peek().clone();
                        self.error(
                            &token,
                            &format!("Can't have more than {} parameters.", MAX_PARAMS),
                        );
                    }

                    params.push(
                        self.consume(Type::Identifier, "Expect parameter name.")?
                            .clone(),
                    );
                    if !self.match_one(Type::Comma) {
                        break;
                    }
                }
            }

            self.consume(Type::RightParen, "Expect ')' after parameters.")?;
            Some(params)
        };

        self.consume(
            Type::LeftBrace,
            &format!("Expect '{{' before {} body.", kind),
        )?;

        let body = self.block()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn var_declaration(&mut self) -> StmtResult {
        let name = self
            .consume(Type::Identifier, "Expect variable name.")?
            .clone();
        let mut init = None;
        if self.match_one(Type::Equal) {
            init = Some(self.expression()?);
        }

        self.terminator("Expect ';' after variable declaration.")?;
        Ok(Stmt::var(name, init))
    }

    fn statement(&mut self) -> StmtResult {
        ensure_sufficient_stack(|| {
            if self.match_one(Type::If) {
                self.if_statement()
            } else if self.match_one(Type::Return) {
                self.return_statement()
            } else if self.match_one(Type::While) {
                self.while_statement()
            } else if self.match_one(Type::For) {
                self.for_statement()
            } else if self.match_one(Type::Import) {
                self.import_statement()
            } else if self.match_one(Type::LeftBrace) {
                Ok(Stmt::block(self.block()?))
            } else {
                self.expression_statement()
            }
        })
    }

    fn block(&mut self) -> BlockResult {
        let mut stmts = Vec::new();
        while !self.check(Type::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }
        self.consume(Type::RightBrace, "Expect '}' after block.")?;
        Ok(stmts)
    }

    // Statements end with `;` or the separator the scanner puts at line ends. The separator is
    // optional where the statement can't go on anyway: before `}`, `else` or the end of input,
    // and after a statement that ended in a block.
    fn terminator(&mut self, msg: &str) -> Result<(), Error> {
        if self.match_one(Type::SemiColon)
            || self.check(Type::RightBrace)
            || self.check(Type::Else)
            || self.is_at_end()
            || self.previous().ty == Type::RightBrace
        {
            Ok(())
        } else {
            Err(Error::parser_error(self.peek(), msg))
        }
    }

    fn expression_statement(&mut self) -> StmtResult {
        let expr = self.expression()?;
        self.terminator("Expect ';' after expression.")?;
        Ok(Stmt::expression(expr))
    }

    fn if_statement(&mut self) -> StmtResult {
        let token = self.previous().clone();
        self.consume(Type::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(Type::RightParen, "Expect ')' after if condition.")?;

        let then_branch = self.statement()?;
        let mut else_branch = None;
        if self.match_one(Type::Else) {
            else_branch = Some(self.statement()?);
        }

        Ok(Stmt::if_(condition, token, then_branch, else_branch))
    }

    fn while_statement(&mut self) -> StmtResult {
        let token = self.previous().clone();
        self.consume(Type::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(Type::RightParen, "Expect ')' after while condition.")?;
        let body = self.statement()?;
        Ok(Stmt::while_(condition, body, token))
    }

    fn for_statement(&mut self) -> StmtResult {
        let token = self.previous().clone();
        self.consume(Type::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_one(Type::SemiColon) {
            None
        } else if self.match_one(Type::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(Type::SemiColon) {
            self.expression()?
        } else {
            Expr::literal(true)
        };
        self.consume(Type::SemiColon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(Type::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(Type::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;
        if let Some(increment) = increment {
            body = Stmt::block(vec![body, Stmt::expression(increment)]);
        }

        let while_loop = Stmt::while_(condition, body, token);
        match initializer {
            Some(initializer) => Ok(Stmt::block(vec![initializer, while_loop])),
            None => Ok(while_loop),
        }
    }

    fn return_statement(&mut self) -> StmtResult {
        let keyword = self.previous().clone();
        let mut value = None;
        if !self.check(Type::SemiColon) && !self.check(Type::RightBrace) && !self.is_at_end() {
            value = Some(self.expression()?);
        }

        self.terminator("Expect ';' after return value.")?;
        Ok(Stmt::return_(keyword, value))
    }

    fn import_statement(&mut self) -> StmtResult {
        let keyword = self.previous().clone();
        let module = self.expression()?;
        self.terminator("Expect ';' after module name.")?;
        Ok(Stmt::import(keyword, module))
    }

    fn expression(&mut self) -> ExprResult {
        self.comma()
    }

    fn comma(&mut self) -> ExprResult {
        let mut expr = self.assignment()?;
        while self.match_one(Type::Comma) {
            let operator = self.previous().clone();
            let right = self.assignment()?;
            expr = Expr::binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn assignment(&mut self) -> ExprResult {
        ensure_sufficient_stack(|| {
            let expr = self.ternary()?;
            if !self.match_one(Type::Equal) {
                return Ok(expr);
            }

            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            match expr {
                Expr::Variable { name } => Ok(Expr::Assign { name, value }),
                Expr::Get { name, object } => Ok(Expr::Set {
                    object,
                    name,
                    value,
                }),
                Expr::Subscript {
                    object,
                    bracket,
                    index,
                } => Ok(Expr::SetElement {
                    object,
                    bracket,
                    index,
                    value,
                }),
                // Reported, but parsing goes on with the target alone.
                expr => {
                    self.error(&equals, "Invalid assignment target.");
                    Ok(expr)
                }
            }
        })
    }

    fn ternary(&mut self) -> ExprResult {
        let condition = self.or_expression()?;
        if !self.match_one(Type::Question) {
            return Ok(condition);
        }

        let question = self.previous().clone();
        let then_branch = self.or_expression()?;
        self.consume(
            Type::Colon,
            "Expected ':' after ternary operator '?'.",
        )?;
        let else_branch = self.ternary()?;
        Ok(Expr::ternary(condition, question, then_branch, else_branch))
    }

    fn or_expression(&mut self) -> ExprResult {
        let mut expr = self.and_expression()?;
        while self.match_one(Type::Or) {
            let operator = self.previous().clone();
            let right = self.and_expression()?;
            expr = Expr::logical(expr, operator, right);
        }
        Ok(expr)
    }

    fn and_expression(&mut self) -> ExprResult {
        let mut expr = self.equality()?;
        while self.match_one(Type::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::logical(expr, operator, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ExprResult {
        let mut expr = self.comparison()?;
        while self.match_either(&[Type::BangEqual, Type::EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ExprResult {
        let mut expr = self.term()?;
        while self.match_either(&[
            Type::Greater,
            Type::GreaterEqual,
            Type::Less,
            Type::LessEqual,
        ]) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> ExprResult {
        let mut expr = self.factor()?;
        while self.match_either(&[Type::Plus, Type::Minus]) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ExprResult {
        let mut expr = self.unary()?;
        while self.match_either(&[Type::Slash, Type::Star, Type::Percent]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ExprResult {
        ensure_sufficient_stack(|| {
            if self.match_either(&[Type::Bang, Type::Minus]) {
                let operator = self.previous().clone();
                let right = self.unary()?;
                Ok(Expr::unary(operator, right))
            } else if self.match_one(Type::Ampersand) {
                let operator = self.previous().clone();
                let target = self.unary()?;
                if matches!(
                    target,
                    Expr::Variable { .. } | Expr::Get { .. } | Expr::Subscript { .. }
                ) {
                    Ok(Expr::reference(operator, target))
                } else {
                    self.error(&operator, "Invalid reference target.");
                    Ok(target)
                }
            } else {
                self.call()
            }
        })
    }

    fn call(&mut self) -> ExprResult {
        let mut expr = self.primary()?;
        loop {
            if self.match_one(Type::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_one(Type::Dot) {
                let name = self
                    .consume(Type::Identifier, "Expect property name after '.'.")?
                    .clone();
                expr = Expr::get(expr, name);
            } else if self.match_one(Type::LeftBracket) {
                let index = self.assignment()?;
                let bracket = self
                    .consume(Type::RightBracket, "Expect ']' after index.")?
                    .clone();
                expr = Expr::subscript(expr, bracket, index);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ExprResult {
        let mut args: Vec<Expr> = Vec::new();
        if !self.check(Type::RightParen) {
            loop {
                if args.len() >= MAX_ARGS {
                    let token = self.peek().clone();
                    self.error(
                        &token,
                        &format!("Can't have more than {} arguments.", MAX_ARGS),
                    );
                }

                // Commas separate arguments here, so each one stops below the comma operator.
                args.push(self.assignment()?);
                if !self.match_one(Type::Comma) {
                    break;
                }
            }
        }

        let paren = self.consume(Type::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::call(callee, paren.clone(), args))
    }

    fn array(&mut self) -> ExprResult {
        let bracket = self.previous().clone();
        let mut elements = Vec::new();

        while !self.match_one(Type::RightBracket) {
            if self.is_at_end() {
                return Err(Error::parser_error(
                    self.peek(),
                    "Expect ']' after array elements.",
                ));
            }

            elements.push(self.assignment()?);
            if !self.check(Type::RightBracket) {
                self.consume(Type::Comma, "Expect ',' between array elements.")?;
            }
        }

        Ok(Expr::array(bracket, elements))
    }

    fn primary(&mut self) -> ExprResult {
        if self.match_one(Type::True) {
            Ok(Expr::literal(true))
        } else if self.match_one(Type::False) {
            Ok(Expr::literal(false))
        } else if self.match_one(Type::Nil) {
            Ok(Expr::literal(Literal::Nil))
        } else if self.match_either(&[Type::Number, Type::String]) {
            Ok(Expr::literal(self.previous().value.clone()))
        } else if self.match_one(Type::Fun) {
            Ok(Expr::function(self.function(None, FunctionKind::Lambda)?))
        } else if self.match_one(Type::LeftBracket) {
            self.array()
        } else if self.match_one(Type::LeftParen) {
            let expr = self.expression()?;
            self.consume(Type::RightParen, "Expect ')' after expression.")?;
            Ok(Expr::grouping(expr))
        } else if self.match_one(Type::Identifier) {
            Ok(Expr::variable(self.previous().clone()))
        } else if self.match_one(Type::This) {
            Ok(Expr::this(self.previous().clone()))
        } else if self.match_one(Type::Super) {
            let token = self.previous().clone();
            self.consume(Type::Dot, "Expect '.' after 'super'.")?;
            let method = self
                .consume(Type::Identifier, "Expect superclass method name.")?
                .clone();
            Ok(Expr::super_(token, method))
        } else {
            Err(Error::parser_error(self.peek(), "Expect expression."))
        }
    }

    // Records an error that doesn't need recovery.
    fn error(&mut self, token: &Token, msg: &str) {
        self.errors.push(Error::parser_error(token, msg));
    }

    // Discards tokens until the start of the next statement.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().ty == Type::SemiColon {
                return;
            }

            match self.peek().ty {
                Type::Class
                | Type::Fun
                | Type::Var
                | Type::For
                | Type::If
                | Type::While
                | Type::Return
                | Type::Import => return,
                _ => {}
            }

            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().ty == Type::Eof
    }

    fn check(&self, ty: Type) -> bool {
        if self.is_at_end() {
            false
        } else {
            self.peek().ty == ty
        }
    }

    fn check_next(&self, ty: Type) -> bool {
        match self.tokens.get(self.current + 1) {
            Some(token) => token.ty == ty,
            None => false,
        }
    }

    fn consume(&mut self, ty: Type, msg: &str) -> Result<&Token, Error> {
        if self.check(ty) {
            Ok(self.advance())
        } else {
            Err(Error::parser_error(self.peek(), msg))
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn match_either(&mut self, types: &[Type]) -> bool {
        for ty in types {
            if self.match_one(*ty) {
                // Already skipped in the `match_one`, just return result
                return true;
            }
        }

        false
    }

    fn match_one(&mut self, ty: Type) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }
}
