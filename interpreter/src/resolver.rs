use crate::ast::{Expr, ExprVisitor, FunctionDecl, Stmt, StmtVisitor};
use crate::error::Error;
use crate::parser::StmtStream;
use crate::stack::ensure_sufficient_stack;
use ahash::{AHashMap, AHashSet};
use reflox_core::{Literal, Token, TokenIndex};
use std::rc::Rc;

#[derive(Copy, Clone)]
enum FunctionType {
    None,
    Function,
}

#[derive(Copy, Clone)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Static pass that works out, for every name used inside a local scope, how many scopes up from
/// the use its declaration lives. Names that are not found are globals and get no entry.
pub struct Resolver {
    scopes: Vec<AHashSet<String>>,
    locals: AHashMap<TokenIndex, usize>,
    current_fun: FunctionType,
    current_cls: ClassType,
    // Every diagnostic found so far, resolution carries on past them
    errors: Vec<Error>,
}

/// Statements ready to execute, with the scope distance of every local name keyed by the index of
/// the token that names it.
pub struct ResolvedStmts {
    pub(crate) stmts: Vec<Stmt>,
    pub(crate) locals: AHashMap<TokenIndex, usize>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            scopes: Vec::new(),
            locals: AHashMap::new(),
            current_fun: FunctionType::None,
            current_cls: ClassType::None,
            errors: Vec::new(),
        }
    }

    /// Resolves the whole program, reporting every static error it contains in source order.
    pub fn resolve(mut self, stmts: StmtStream) -> Result<ResolvedStmts, Vec<Error>> {
        if let Err(err) = self.resolve_stmts(&stmts.0) {
            self.errors.push(err);
        }

        if self.errors.is_empty() {
            Ok(ResolvedStmts {
                stmts: stmts.0,
                locals: self.locals,
            })
        } else {
            Err(self.errors)
        }
    }

    fn resolve_stmts(&mut self, stmts: &[Stmt]) -> Result<(), Error> {
        for stmt in stmts {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        ensure_sufficient_stack(|| self.visit_stmt(stmt))
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), Error> {
        ensure_sufficient_stack(|| self.visit_expr(expr))
    }

    fn begin_scope(&mut self) {
        self.scopes.push(AHashSet::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn error(&mut self, token: &Token, msg: &str) {
        self.errors.push(Error::resolver_error(token, msg));
    }

    // Names declared outside of any scope are globals, they may be redeclared freely.
    fn declare(&mut self, token: &Token) {
        let redeclared = match self.scopes.last_mut() {
            Some(scope) => !scope.insert(token.lexeme.clone()),
            None => false,
        };
        if redeclared {
            self.error(token, "Already a variable with this name in this scope.");
        }
    }

    fn define_implicit(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(String::from(name));
        }
    }

    fn resolve_local(&mut self, token: &Token) {
        for (dist, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains(&token.lexeme) {
                self.locals.insert(token.idx, dist);
                return;
            }
        }
    }

    // Parameters and the body share one scope, matching the environment a call creates.
    fn resolve_function(&mut self, declaration: &FunctionDecl, ty: FunctionType) -> Result<(), Error> {
        let enclosing = self.current_fun;
        self.current_fun = ty;

        self.begin_scope();
        let res = self.resolve_function_body(declaration);
        self.end_scope();

        self.current_fun = enclosing;
        res
    }

    fn resolve_function_body(&mut self, declaration: &FunctionDecl) -> Result<(), Error> {
        if let Some(params) = &declaration.params {
            for param in params {
                self.declare(param);
            }
        }
        self.resolve_stmts(&declaration.body)
    }

    fn resolve_class_body(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        class_methods: &[Rc<FunctionDecl>],
    ) -> Result<(), Error> {
        if let Some(superclass) = superclass {
            if let Expr::Variable { name: super_name } = superclass {
                if name.lexeme == super_name.lexeme {
                    self.error(super_name, "A class can't inherit from itself.");
                }
            }
            self.current_cls = ClassType::Subclass;
            self.resolve_expr(superclass)?;
            self.begin_scope();
            self.define_implicit("super");
        }

        self.begin_scope();
        self.define_implicit("this");
        // Class methods see `this` too, it is the class they were called on.
        for method in methods.iter().chain(class_methods) {
            self.resolve_function(method, FunctionType::Function)?;
        }
        Ok(())
    }
}

impl StmtVisitor for Resolver {
    type Item = ();

    fn visit_block(&mut self, statements: &[Stmt]) -> Result<Self::Item, Error> {
        self.begin_scope();
        let res = self.resolve_stmts(statements);
        self.end_scope();
        res
    }

    fn visit_expression(&mut self, expression: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(expression)
    }

    fn visit_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        class_methods: &[Rc<FunctionDecl>],
    ) -> Result<Self::Item, Error> {
        self.declare(name);

        let current = self.current_cls;
        let depth = self.scopes.len();
        self.current_cls = ClassType::Class;

        let res = self.resolve_class_body(name, superclass, methods, class_methods);

        self.scopes.truncate(depth);
        self.current_cls = current;
        res
    }

    fn visit_if(
        &mut self,
        condition: &Expr,
        _: &Token,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<Self::Item, Error> {
        self.resolve_expr(condition)?;
        self.resolve_stmt(then_branch)?;
        if let Some(else_branch) = else_branch {
            self.resolve_stmt(else_branch)?;
        }
        Ok(())
    }

    fn visit_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        _: &Token,
    ) -> Result<Self::Item, Error> {
        self.resolve_expr(condition)?;
        self.resolve_stmt(body)
    }

    fn visit_return(&mut self, keyword: &Token, value: Option<&Expr>) -> Result<Self::Item, Error> {
        if let FunctionType::None = self.current_fun {
            self.error(keyword, "Can't return from top-level code.");
        }

        match value {
            Some(value) => self.resolve_expr(value),
            None => Ok(()),
        }
    }

    // The name is declared before the initializer is resolved, so a function can refer to itself.
    // Reading a variable in its own initializer is left to fail at runtime.
    fn visit_var(&mut self, name: &Token, init: Option<&Expr>) -> Result<Self::Item, Error> {
        self.declare(name);
        match init {
            Some(init) => self.resolve_expr(init),
            None => Ok(()),
        }
    }

    fn visit_import(&mut self, _: &Token, module: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(module)
    }
}

impl ExprVisitor for Resolver {
    type Item = ();

    fn visit_array(&mut self, _: &Token, elements: &[Expr]) -> Result<Self::Item, Error> {
        for element in elements {
            self.resolve_expr(element)?;
        }
        Ok(())
    }

    fn visit_assign(&mut self, name: &Token, value: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(value)?;
        self.resolve_local(name);
        Ok(())
    }

    fn visit_binary(&mut self, left: &Expr, _: &Token, right: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(left)?;
        self.resolve_expr(right)
    }

    fn visit_call(&mut self, callee: &Expr, _: &Token, args: &[Expr]) -> Result<Self::Item, Error> {
        self.resolve_expr(callee)?;
        for arg in args {
            self.resolve_expr(arg)?;
        }
        Ok(())
    }

    fn visit_function(&mut self, declaration: &Rc<FunctionDecl>) -> Result<Self::Item, Error> {
        self.resolve_function(declaration, FunctionType::Function)
    }

    fn visit_get(&mut self, object: &Expr, _: &Token) -> Result<Self::Item, Error> {
        self.resolve_expr(object)
    }

    fn visit_set(&mut self, object: &Expr, _: &Token, value: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(value)?;
        self.resolve_expr(object)
    }

    fn visit_subscript(&mut self, object: &Expr, _: &Token, index: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(object)?;
        self.resolve_expr(index)
    }

    fn visit_set_element(
        &mut self,
        object: &Expr,
        _: &Token,
        index: &Expr,
        value: &Expr,
    ) -> Result<Self::Item, Error> {
        self.resolve_expr(object)?;
        self.resolve_expr(index)?;
        self.resolve_expr(value)
    }

    fn visit_reference(&mut self, _: &Token, target: &Rc<Expr>) -> Result<Self::Item, Error> {
        self.resolve_expr(target)
    }

    fn visit_ternary(
        &mut self,
        condition: &Expr,
        _: &Token,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<Self::Item, Error> {
        self.resolve_expr(condition)?;
        self.resolve_expr(then_branch)?;
        self.resolve_expr(else_branch)
    }

    fn visit_this(&mut self, keyword: &Token) -> Result<Self::Item, Error> {
        match self.current_cls {
            ClassType::None => self.error(keyword, "Can't use 'this' outside of a class."),
            _ => self.resolve_local(keyword),
        }
        Ok(())
    }

    fn visit_super(&mut self, keyword: &Token, _: &Token) -> Result<Self::Item, Error> {
        match self.current_cls {
            ClassType::None => self.error(keyword, "Can't use 'super' outside of a class."),
            ClassType::Class => {
                self.error(keyword, "Can't use 'super' in a class with no superclass.")
            }
            ClassType::Subclass => self.resolve_local(keyword),
        }
        Ok(())
    }

    fn visit_grouping(&mut self, expression: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(expression)
    }

    fn visit_literal(&mut self, _: &Literal) -> Result<Self::Item, Error> {
        Ok(())
    }

    fn visit_logical(&mut self, left: &Expr, _: &Token, right: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(left)?;
        self.resolve_expr(right)
    }

    fn visit_unary(&mut self, _: &Token, right: &Expr) -> Result<Self::Item, Error> {
        self.resolve_expr(right)
    }

    fn visit_variable(&mut self, name: &Token) -> Result<Self::Item, Error> {
        self.resolve_local(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use reflox_core::{Scanner, Token};

    // Resolves `src` and lists every resolved name with its distance, in source order.
    fn distances(src: &str) -> Result<Vec<(String, usize)>, String> {
        let mut scanner = Scanner::new();
        let tokens: Vec<Token> = scanner.scan_tokens(src).collect();
        let parsed = Parser::new(&tokens).parse().unwrap();
        let resolved = Resolver::new().resolve(parsed).map_err(|errors| {
            errors
                .iter()
                .map(|err| err.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        })?;

        let mut locals: Vec<_> = resolved.locals.into_iter().collect();
        locals.sort();
        Ok(locals
            .into_iter()
            .map(|(idx, dist)| (tokens[idx.0].lexeme.clone(), dist))
            .collect())
    }

    fn pairs(expected: &[(&str, usize)]) -> Vec<(String, usize)> {
        expected
            .iter()
            .map(|(name, dist)| (String::from(*name), *dist))
            .collect()
    }

    #[test]
    fn test_globals_are_not_resolved() {
        assert_eq!(Ok(vec![]), distances("var a = 1\na = a + 1\nprint(a)"));
    }

    #[test]
    fn test_block_distances() {
        let src = "{\n  var a = 1\n  {\n    var b = a\n    b = a + b\n  }\n}";
        assert_eq!(
            Ok(pairs(&[("a", 1), ("b", 0), ("a", 1), ("b", 0)])),
            distances(src)
        );
    }

    #[test]
    fn test_function_distances() {
        let src = "\
fun outer(x) {
  var y = x
  fun inner() {
    return x + y
  }
  return inner
}";
        // inner's body and parameters share one scope, one hop reaches outer's scope
        assert_eq!(
            Ok(pairs(&[("x", 0), ("x", 1), ("y", 1), ("inner", 0)])),
            distances(src)
        );
    }

    #[test]
    fn test_own_initializer_resolves_to_declaring_scope() {
        assert_eq!(Ok(pairs(&[("a", 0)])), distances("{\n  var a = a\n}"));
    }

    #[test]
    fn test_class_distances() {
        let src = "\
class A {
  get() { return this }
}
class B < A {
  get() { return super.get() }
}";
        assert_eq!(Ok(pairs(&[("this", 1), ("super", 2)])), distances(src));
    }

    #[test]
    fn test_reference_target_is_resolved() {
        assert_eq!(
            Ok(pairs(&[("a", 0), ("a", 0)])),
            distances("{\n  var a = 1\n  var b = &a\n  a\n}")
        );
    }

    #[test]
    fn test_errors() {
        let tests = [
            (
                "{\n  var a = 1\n  var a = 2\n}",
                "[line 3] Error at 'a': Already a variable with this name in this scope.",
            ),
            (
                "fun f(a, a) {}",
                "[line 1] Error at 'a': Already a variable with this name in this scope.",
            ),
            (
                "class A < A {}",
                "[line 1] Error at 'A': A class can't inherit from itself.",
            ),
            (
                "print(this)",
                "[line 1] Error at 'this': Can't use 'this' outside of a class.",
            ),
            (
                "fun f() { return super.x }",
                "[line 1] Error at 'super': Can't use 'super' outside of a class.",
            ),
            (
                "class A {\n  f() { super.f() }\n}",
                "[line 2] Error at 'super': Can't use 'super' in a class with no superclass.",
            ),
            (
                "return 1",
                "[line 1] Error at 'return': Can't return from top-level code.",
            ),
        ];

        for (src, expected) in tests {
            assert_eq!(Err(String::from(expected)), distances(src), "source: {}", src);
        }
    }

    #[test]
    fn test_every_error_is_reported() {
        let src = "\
return 1
print(this)
fun f(a, a) {
  return super.x
}
class A < A {}
{
  var b = 1
  var b = 2
}";
        let expected = "\
[line 1] Error at 'return': Can't return from top-level code.
[line 2] Error at 'this': Can't use 'this' outside of a class.
[line 3] Error at 'a': Already a variable with this name in this scope.
[line 4] Error at 'super': Can't use 'super' outside of a class.
[line 6] Error at 'A': A class can't inherit from itself.
[line 9] Error at 'b': Already a variable with this name in this scope.";
        assert_eq!(Err(String::from(expected)), distances(src));
    }

    #[test]
    fn test_globals_may_be_redeclared() {
        assert!(distances("var a = 1\nvar a = 2").is_ok());
    }
}
