use std::rc::Rc;

use reflox_core::{Literal, Token};

use crate::error::Error;

// Tokens are cloned into every node. Besides carrying the line for error reports, the token index
// of a name is what the resolver uses as the identity of the node that refers to it.

/// A function literal, shared by every closure created from it.
///
/// `params` is `None` for getters, which are methods declared without a parameter list.
#[derive(Debug, PartialEq)]
pub(crate) struct FunctionDecl {
    pub(crate) name: Option<Token>,
    pub(crate) params: Option<Vec<Token>>,
    pub(crate) body: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Expr {
    Array {
        bracket: Token,
        elements: Vec<Expr>,
    },
    Assign {
        name: Token,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    Function(Rc<FunctionDecl>),
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    Subscript {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
    },
    SetElement {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    Reference {
        operator: Token,
        target: Rc<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        question: Token,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    This {
        keyword: Token,
    },
    Grouping {
        expression: Box<Expr>,
    },
    Literal {
        value: Literal,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Variable {
        name: Token,
    },
    Super {
        keyword: Token,
        method: Token,
    },
}

pub(crate) trait ExprVisitor {
    type Item;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Item, Error> {
        match expr {
            Expr::Array { bracket, elements } => self.visit_array(bracket, elements),
            Expr::Assign { name, value } => self.visit_assign(name, value),
            Expr::Binary {
                left,
                operator,
                right,
            } => self.visit_binary(left, operator, right),
            Expr::Call {
                callee,
                paren,
                args,
            } => self.visit_call(callee, paren, args),
            Expr::Function(declaration) => self.visit_function(declaration),
            Expr::Get { object, name } => self.visit_get(object, name),
            Expr::Set {
                object,
                name,
                value,
            } => self.visit_set(object, name, value),
            Expr::Subscript {
                object,
                bracket,
                index,
            } => self.visit_subscript(object, bracket, index),
            Expr::SetElement {
                object,
                bracket,
                index,
                value,
            } => self.visit_set_element(object, bracket, index, value),
            Expr::Reference { operator, target } => self.visit_reference(operator, target),
            Expr::Ternary {
                condition,
                question,
                then_branch,
                else_branch,
            } => self.visit_ternary(condition, question, then_branch, else_branch),
            Expr::Grouping { expression } => self.visit_grouping(expression),
            Expr::Literal { value } => self.visit_literal(value),
            Expr::Logical {
                left,
                operator,
                right,
            } => self.visit_logical(left, operator, right),
            Expr::Unary { operator, right } => self.visit_unary(operator, right),
            Expr::Variable { name } => self.visit_variable(name),
            Expr::This { keyword } => self.visit_this(keyword),
            Expr::Super { keyword, method } => self.visit_super(keyword, method),
        }
    }
    fn visit_array(&mut self, bracket: &Token, elements: &[Expr]) -> Result<Self::Item, Error>;
    fn visit_assign(&mut self, name: &Token, value: &Expr) -> Result<Self::Item, Error>;
    fn visit_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Self::Item, Error>;
    fn visit_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        args: &[Expr],
    ) -> Result<Self::Item, Error>;
    fn visit_function(&mut self, declaration: &Rc<FunctionDecl>) -> Result<Self::Item, Error>;
    fn visit_get(&mut self, object: &Expr, name: &Token) -> Result<Self::Item, Error>;
    fn visit_set(
        &mut self,
        object: &Expr,
        name: &Token,
        value: &Expr,
    ) -> Result<Self::Item, Error>;
    fn visit_subscript(
        &mut self,
        object: &Expr,
        bracket: &Token,
        index: &Expr,
    ) -> Result<Self::Item, Error>;
    fn visit_set_element(
        &mut self,
        object: &Expr,
        bracket: &Token,
        index: &Expr,
        value: &Expr,
    ) -> Result<Self::Item, Error>;
    fn visit_reference(&mut self, operator: &Token, target: &Rc<Expr>)
        -> Result<Self::Item, Error>;
    fn visit_ternary(
        &mut self,
        condition: &Expr,
        question: &Token,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<Self::Item, Error>;
    fn visit_this(&mut self, keyword: &Token) -> Result<Self::Item, Error>;
    fn visit_super(&mut self, keyword: &Token, method: &Token) -> Result<Self::Item, Error>;
    fn visit_grouping(&mut self, expression: &Expr) -> Result<Self::Item, Error>;
    fn visit_literal(&mut self, value: &Literal) -> Result<Self::Item, Error>;
    fn visit_logical(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Self::Item, Error>;
    fn visit_unary(&mut self, operator: &Token, right: &Expr) -> Result<Self::Item, Error>;
    fn visit_variable(&mut self, name: &Token) -> Result<Self::Item, Error>;
}

impl Expr {
    // Creator methods, these could most likely be written as a proc-macro, but I will need
    // a separate crate. So here they go.
    pub(crate) fn array(bracket: Token, elements: Vec<Expr>) -> Self {
        Expr::Array { bracket, elements }
    }

    pub(crate) fn assign(name: Token, value: Expr) -> Self {
        Expr::Assign {
            name,
            value: Box::new(value),
        }
    }

    pub(crate) fn binary(left: Expr, operator: Token, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn call(callee: Expr, paren: Token, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        }
    }

    pub(crate) fn function(declaration: FunctionDecl) -> Self {
        Expr::Function(Rc::new(declaration))
    }

    pub(crate) fn get(object: Expr, name: Token) -> Self {
        Expr::Get {
            object: Box::new(object),
            name,
        }
    }

    pub(crate) fn subscript(object: Expr, bracket: Token, index: Expr) -> Self {
        Expr::Subscript {
            object: Box::new(object),
            bracket,
            index: Box::new(index),
        }
    }

    pub(crate) fn reference(operator: Token, target: Expr) -> Self {
        Expr::Reference {
            operator,
            target: Rc::new(target),
        }
    }

    pub(crate) fn ternary(
        condition: Expr,
        question: Token,
        then_branch: Expr,
        else_branch: Expr,
    ) -> Self {
        Expr::Ternary {
            condition: Box::new(condition),
            question,
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub(crate) fn grouping(expression: Expr) -> Self {
        Expr::Grouping {
            expression: Box::new(expression),
        }
    }

    pub(crate) fn literal<T>(value: T) -> Self
    where
        Literal: From<T>,
    {
        Expr::Literal {
            value: Literal::from(value),
        }
    }

    pub(crate) fn logical(left: Expr, operator: Token, right: Expr) -> Self {
        Expr::Logical {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn unary(operator: Token, right: Expr) -> Self {
        Expr::Unary {
            operator,
            right: Box::new(right),
        }
    }

    pub(crate) fn variable(name: Token) -> Self {
        Expr::Variable { name }
    }

    pub(crate) fn this(keyword: Token) -> Self {
        Expr::This { keyword }
    }

    pub(crate) fn super_(keyword: Token, method: Token) -> Self {
        Expr::Super { keyword, method }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum Stmt {
    Block {
        statements: Vec<Stmt>,
    },
    Expression {
        expression: Expr,
    },
    Class {
        name: Token,
        superclass: Option<Expr>,
        methods: Vec<Rc<FunctionDecl>>,
        class_methods: Vec<Rc<FunctionDecl>>,
    },
    If {
        condition: Expr,
        token: Token,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        token: Token,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Var {
        name: Token,
        init: Option<Expr>,
    },
    Import {
        keyword: Token,
        module: Expr,
    },
}

pub(crate) trait StmtVisitor {
    type Item;

    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<Self::Item, Error> {
        match stmt {
            Stmt::Expression { expression } => self.visit_expression(expression),
            Stmt::Block { statements } => self.visit_block(statements),
            Stmt::Class {
                name,
                superclass,
                methods,
                class_methods,
            } => self.visit_class(name, superclass.as_ref(), methods, class_methods),
            Stmt::If {
                condition,
                token,
                then_branch,
                else_branch,
            } => self.visit_if(condition, token, then_branch, else_branch.as_deref()),
            Stmt::While {
                condition,
                body,
                token,
            } => self.visit_while(condition, body, token),
            Stmt::Return { keyword, value } => self.visit_return(keyword, value.as_ref()),
            Stmt::Var { name, init } => self.visit_var(name, init.as_ref()),
            Stmt::Import { keyword, module } => self.visit_import(keyword, module),
        }
    }

    fn visit_block(&mut self, statements: &[Stmt]) -> Result<Self::Item, Error>;
    fn visit_expression(&mut self, expression: &Expr) -> Result<Self::Item, Error>;
    fn visit_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        class_methods: &[Rc<FunctionDecl>],
    ) -> Result<Self::Item, Error>;
    fn visit_if(
        &mut self,
        condition: &Expr,
        token: &Token,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<Self::Item, Error>;
    fn visit_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        token: &Token,
    ) -> Result<Self::Item, Error>;
    fn visit_return(&mut self, keyword: &Token, value: Option<&Expr>)
        -> Result<Self::Item, Error>;
    fn visit_var(&mut self, name: &Token, init: Option<&Expr>) -> Result<Self::Item, Error>;
    fn visit_import(&mut self, keyword: &Token, module: &Expr) -> Result<Self::Item, Error>;
}

impl Stmt {
    pub(crate) fn block(statements: Vec<Stmt>) -> Self {
        Stmt::Block { statements }
    }

    pub(crate) fn expression(expression: Expr) -> Self {
        Stmt::Expression { expression }
    }

    pub(crate) fn class(
        name: Token,
        superclass: Option<Expr>,
        methods: Vec<Rc<FunctionDecl>>,
        class_methods: Vec<Rc<FunctionDecl>>,
    ) -> Self {
        Stmt::Class {
            name,
            superclass,
            methods,
            class_methods,
        }
    }

    pub(crate) fn if_(
        condition: Expr,
        token: Token,
        then_branch: Stmt,
        else_branch: Option<Stmt>,
    ) -> Self {
        Stmt::If {
            condition,
            token,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }
    }

    pub(crate) fn while_(condition: Expr, body: Stmt, token: Token) -> Self {
        Stmt::While {
            condition,
            body: Box::new(body),
            token,
        }
    }

    pub(crate) fn return_(keyword: Token, value: Option<Expr>) -> Self {
        Stmt::Return { keyword, value }
    }

    pub(crate) fn var(name: Token, init: Option<Expr>) -> Self {
        Stmt::Var { name, init }
    }

    pub(crate) fn import(keyword: Token, module: Expr) -> Self {
        Stmt::Import { keyword, module }
    }
}
