//! Program tree consumed by the middle end. Every statement and expression
//! kind is its own variant so passes can match exhaustively.

use crate::middle::types::Type;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Declaration(Declaration),
    /// Expression evaluated for its side effects, result discarded
    Expression(Expression),
    If {
        condition: Expression,
        positive: Box<Statement>,
        negative: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    For {
        initializer: Option<ForInitializer>,
        condition: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
    },
    Block(Vec<Statement>),
    Print(Expression),
    /// Empty statement (just a semicolon)
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub ty: Type,
    pub name: String,
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInitializer {
    /// `for (int i = 0; ...)` opens a scope holding `i` for the whole loop
    Declaration(Declaration),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    Binary {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Ternary {
        condition: Box<Expression>,
        positive: Box<Expression>,
        negative: Box<Expression>,
    },
    Assignment {
        name: String,
        value: Box<Expression>,
    },
    /// `name += value` or `name -= value`
    CompoundAssignment {
        operator: CompoundOperator,
        name: String,
        value: Box<Expression>,
    },
    /// `++name`, `name++`, `--name` or `name--`. Prefix and postfix forms
    /// both evaluate to the value before the update.
    Increment {
        name: String,
        direction: StepDirection,
    },
    List(Vec<Expression>),
}

impl Expression {
    pub fn binary(operator: BinaryOperator, lhs: Expression, rhs: Expression) -> Self {
        Self::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Contents without the surrounding quotes
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Logical,
    Equality,
    Relational,
}

impl BinaryOperator {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide => {
                BinaryOperatorClass::Arithmetic
            }
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Relational,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UnaryOperator {
    #[strum(serialize = "!")]
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CompoundOperator {
    #[strum(serialize = "+=")]
    Add,
    #[strum(serialize = "-=")]
    Subtract,
}

impl CompoundOperator {
    /// The arithmetic operator the compound form desugars to
    pub fn binary_operator(self) -> BinaryOperator {
        match self {
            Self::Add => BinaryOperator::Add,
            Self::Subtract => BinaryOperator::Subtract,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Increment,
    Decrement,
}

impl StepDirection {
    pub fn binary_operator(self) -> BinaryOperator {
        match self {
            Self::Increment => BinaryOperator::Add,
            Self::Decrement => BinaryOperator::Subtract,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}
