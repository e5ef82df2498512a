//! Scope and type validation of a program tree
//!
//! The analyzer walks the tree once, populating the symbol table and
//! collecting every violation it finds. Errors never stop the walk: an
//! expression that fails to check evaluates to `None` so that callers do not
//! report the same problem again.

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    frontend::ast::{
        BinaryOperator, BinaryOperatorClass, CompoundOperator, Declaration, Expression,
        ForInitializer, Literal, Program, Statement, StepDirection, UnaryOperator,
    },
    middle::{
        scope::{SymbolId, SymbolTable},
        types::{Constant, Type, evaluate_binary, evaluate_unary},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("variable `{name}` is already declared in this scope")]
    Redeclaration { name: String },
    #[error("variable `{name}` has not been declared")]
    UndeclaredVariable { name: String },
    #[error("variable `{name}` is used outside of its scope")]
    UseOutOfScope { name: String },
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: Type,
        found: Type,
    },
    #[error("operator `{operator}` cannot be applied to {operands}")]
    IncompatibleOperand { operator: String, operands: String },
}

impl SemanticError {
    fn incompatible(operator: impl ToString, operands: &[Type]) -> Self {
        Self::IncompatibleOperand {
            operator: operator.to_string(),
            operands: operands.iter().join(" and "),
        }
    }
}

/// The checked type of an expression and its value if known at compile time
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub ty: Type,
    pub constant: Option<Constant>,
}

impl Evaluated {
    fn new(ty: Type, constant: Option<Constant>) -> Self {
        Self { ty, constant }
    }
}

#[derive(Debug)]
pub struct SemanticAnalyzer<'table> {
    symbols: &'table mut SymbolTable,
    errors: Vec<SemanticError>,
}

impl<'table> SemanticAnalyzer<'table> {
    /// Validates a whole program, returning every error in discovery order
    pub fn analyze(program: &Program, symbols: &'table mut SymbolTable) -> Vec<SemanticError> {
        let mut analyzer = Self {
            symbols,
            errors: Vec::new(),
        };

        for statement in &program.statements {
            analyzer.analyze_statement(statement);
        }

        debug!(
            symbols = analyzer.symbols.entries().len(),
            errors = analyzer.errors.len(),
            "semantic analysis finished"
        );

        for error in &analyzer.errors {
            warn!("{error}");
        }

        analyzer.errors
    }

    fn report(&mut self, error: SemanticError) {
        self.errors.push(error);
    }

    fn resolve(&mut self, name: &str) -> Option<SymbolId> {
        self.symbols
            .resolve(name)
            .map_err(|error| self.errors.push(error))
            .ok()
    }

    fn analyze_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Declaration(declaration) => self.analyze_declaration(declaration),
            Statement::Expression(expression) => {
                self.evaluate(expression);
            }
            Statement::If {
                condition,
                positive,
                negative,
            } => {
                self.check_condition(condition, "if condition");
                self.analyze_statement(positive);

                if let Some(negative) = negative {
                    self.analyze_statement(negative);
                }
            }
            Statement::While { condition, body } => {
                self.check_condition(condition, "while condition");
                self.analyze_statement(body);
            }
            Statement::For {
                initializer,
                condition,
                update,
                body,
            } => {
                let opens_scope = matches!(initializer, Some(ForInitializer::Declaration(_)));

                if opens_scope {
                    self.symbols.push_scope();
                }

                match initializer {
                    Some(ForInitializer::Declaration(declaration)) => {
                        self.analyze_declaration(declaration)
                    }
                    Some(ForInitializer::Expression(expression)) => {
                        self.evaluate(expression);
                    }
                    None => {}
                }

                if let Some(condition) = condition {
                    self.check_condition(condition, "for condition");
                }

                self.analyze_statement(body);

                if let Some(update) = update {
                    self.evaluate(update);
                }

                if opens_scope {
                    self.symbols.pop_scope();
                }
            }
            Statement::Block(statements) => {
                self.symbols.push_scope();

                for statement in statements {
                    self.analyze_statement(statement);
                }

                self.symbols.pop_scope();
            }
            Statement::Print(expression) => {
                self.evaluate(expression);
            }
            Statement::Empty => {}
        }
    }

    /// The variable is bound before its initializer is checked, so a failing
    /// initializer does not cause later uses to be reported as undeclared
    fn analyze_declaration(&mut self, declaration: &Declaration) {
        let id = match self.symbols.declare(&declaration.name, declaration.ty) {
            Ok(id) => Some(id),
            Err(error) => {
                self.report(error);
                None
            }
        };

        let Some(initializer) = &declaration.initializer else {
            return;
        };

        let Some(value) = self.evaluate(initializer) else {
            return;
        };

        if value.ty != declaration.ty {
            self.report(SemanticError::TypeMismatch {
                context: format!("initialization of `{}`", declaration.name),
                expected: declaration.ty,
                found: value.ty,
            });
            return;
        }

        if let Some(id) = id {
            self.symbols.get_mut(id).constant = value.constant;
        }
    }

    fn check_condition(&mut self, condition: &Expression, context: &str) -> Option<Evaluated> {
        let evaluated = self.evaluate(condition)?;

        if evaluated.ty != Type::Bool {
            self.report(SemanticError::TypeMismatch {
                context: context.to_owned(),
                expected: Type::Bool,
                found: evaluated.ty,
            });
        }

        Some(evaluated)
    }

    /// Checks an expression, returning `None` if an error was reported for it
    pub fn evaluate(&mut self, expression: &Expression) -> Option<Evaluated> {
        match expression {
            Expression::Literal(literal) => Some(match literal {
                Literal::Int(value) => Evaluated::new(Type::Int, Some(Constant::Int(*value))),
                Literal::Float(value) => Evaluated::new(Type::Float, Some(Constant::Float(*value))),
                Literal::Bool(value) => Evaluated::new(Type::Bool, Some(Constant::Bool(*value))),
                Literal::Str(value) => {
                    Evaluated::new(Type::String, Some(Constant::Str(value.clone())))
                }
            }),
            // Recorded constants are not propagated through variable reads
            Expression::Identifier(name) => {
                let id = self.resolve(name)?;
                Some(Evaluated::new(self.symbols.get(id).ty, None))
            }
            Expression::Binary { operator, lhs, rhs } => {
                let lhs = self.evaluate(lhs);
                let rhs = self.evaluate(rhs);

                self.evaluate_binary(*operator, lhs?, rhs?)
            }
            Expression::Unary { operator, operand } => {
                let operand = self.evaluate(operand)?;

                match operator {
                    UnaryOperator::LogicalNot if operand.ty == Type::Bool => Some(Evaluated::new(
                        Type::Bool,
                        operand
                            .constant
                            .and_then(|constant| evaluate_unary(*operator, &constant)),
                    )),
                    UnaryOperator::LogicalNot => {
                        self.report(SemanticError::incompatible(operator, &[operand.ty]));
                        None
                    }
                }
            }
            Expression::Ternary {
                condition,
                positive,
                negative,
            } => {
                let condition = self.check_condition(condition, "ternary condition");
                let positive = self.evaluate(positive);
                let negative = self.evaluate(negative);
                let (positive, negative) = (positive?, negative?);

                let ty = if positive.ty == negative.ty {
                    positive.ty
                } else if positive.ty.is_numeric() && negative.ty.is_numeric() {
                    Type::Float
                } else {
                    self.report(SemanticError::TypeMismatch {
                        context: "ternary branches".to_owned(),
                        expected: positive.ty,
                        found: negative.ty,
                    });
                    return None;
                };

                let constant = match condition.and_then(|condition| condition.constant) {
                    Some(Constant::Bool(true)) => positive.constant,
                    Some(Constant::Bool(false)) => negative.constant,
                    _ => None,
                };

                Some(Evaluated::new(ty, constant.map(|c| c.promoted_to(ty))))
            }
            Expression::Assignment { name, value } => {
                let value = self.evaluate(value);
                let id = self.resolve(name)?;

                let Some(value) = value else {
                    self.symbols.get_mut(id).constant = None;
                    return None;
                };

                let declared = self.symbols.get(id).ty;

                if value.ty != declared {
                    self.report(SemanticError::TypeMismatch {
                        context: format!("assignment to `{name}`"),
                        expected: declared,
                        found: value.ty,
                    });
                    self.symbols.get_mut(id).constant = None;
                    return Some(Evaluated::new(declared, None));
                }

                self.symbols.get_mut(id).constant = value.constant.clone();
                Some(value)
            }
            Expression::CompoundAssignment {
                operator,
                name,
                value,
            } => self.evaluate_compound_assignment(*operator, name, value),
            Expression::Increment { name, direction } => self.evaluate_increment(name, *direction),
            Expression::List(elements) => {
                let mut valid = true;

                for element in elements {
                    valid &= self.evaluate(element).is_some();
                }

                valid.then(|| Evaluated::new(Type::List, None))
            }
        }
    }

    fn evaluate_binary(
        &mut self,
        operator: BinaryOperator,
        lhs: Evaluated,
        rhs: Evaluated,
    ) -> Option<Evaluated> {
        let ty = match operator.class() {
            BinaryOperatorClass::Arithmetic if lhs.ty.is_numeric() && rhs.ty.is_numeric() => {
                lhs.ty.promote(rhs.ty)
            }
            BinaryOperatorClass::Logical if lhs.ty == Type::Bool && rhs.ty == Type::Bool => {
                Type::Bool
            }
            BinaryOperatorClass::Equality if lhs.ty.is_comparable_with(rhs.ty) => Type::Bool,
            BinaryOperatorClass::Relational if lhs.ty.is_numeric() && rhs.ty.is_numeric() => {
                Type::Bool
            }
            _ => {
                self.report(SemanticError::incompatible(operator, &[lhs.ty, rhs.ty]));
                return None;
            }
        };

        let constant = match (&lhs.constant, &rhs.constant) {
            (Some(lhs), Some(rhs)) => evaluate_binary(operator, lhs, rhs),
            _ => None,
        };

        Some(Evaluated::new(ty, constant))
    }

    /// `x += e` checks like `x = x + e`, except that the recorded value of `x`
    /// takes part in constant tracking
    fn evaluate_compound_assignment(
        &mut self,
        operator: CompoundOperator,
        name: &str,
        value: &Expression,
    ) -> Option<Evaluated> {
        let value = self.evaluate(value);
        let id = self.resolve(name)?;
        let symbol = self.symbols.get(id);
        let (declared, current) = (symbol.ty, symbol.constant.clone());

        let Some(value) = value else {
            self.symbols.get_mut(id).constant = None;
            return None;
        };

        if !declared.is_numeric() || !value.ty.is_numeric() {
            self.report(SemanticError::incompatible(operator, &[declared, value.ty]));
            self.symbols.get_mut(id).constant = None;
            return None;
        }

        let result = declared.promote(value.ty);

        if result != declared {
            self.report(SemanticError::TypeMismatch {
                context: format!("compound assignment to `{name}`"),
                expected: declared,
                found: result,
            });
            self.symbols.get_mut(id).constant = None;
            return Some(Evaluated::new(declared, None));
        }

        let constant = match (current, value.constant) {
            (Some(current), Some(value)) => {
                evaluate_binary(operator.binary_operator(), &current, &value)
            }
            _ => None,
        };

        self.symbols.get_mut(id).constant = constant.clone();
        Some(Evaluated::new(declared, constant))
    }

    /// Both prefix and postfix forms evaluate to the value before the update
    fn evaluate_increment(&mut self, name: &str, direction: StepDirection) -> Option<Evaluated> {
        let id = self.resolve(name)?;
        let symbol = self.symbols.get(id);
        let (ty, before) = (symbol.ty, symbol.constant.clone());

        if !ty.is_numeric() {
            self.report(SemanticError::incompatible(direction.symbol(), &[ty]));
            return None;
        }

        let after = before.as_ref().and_then(|before| {
            evaluate_binary(direction.binary_operator(), before, &Constant::Int(1))
        });

        self.symbols.get_mut(id).constant = after;
        Some(Evaluated::new(ty, before))
    }
}
