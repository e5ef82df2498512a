use strum::{EnumIter, EnumString};

use crate::frontend::ast::{BinaryOperator, BinaryOperatorClass, UnaryOperator};

/// The declared type of a variable or the type of an evaluated expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    Int,
    Float,
    String,
    Bool,
    List,
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::Float => write!(f, "FLOAT"),
            Type::String => write!(f, "STRING"),
            Type::Bool => write!(f, "BOOL"),
            Type::List => write!(f, "LIST"),
        }
    }
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Result type of an arithmetic operation between two numeric types
    pub fn promote(self, other: Type) -> Type {
        if self == Type::Float || other == Type::Float {
            Type::Float
        } else {
            Type::Int
        }
    }

    /// Whether values of the two types can be compared with `==` and `!=`
    pub fn is_comparable_with(self, other: Type) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

/// A value known at compile time
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Contents without the surrounding quotes
    Str(String),
}

impl core::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{value}"),
            // Keep a fractional part so the value still reads as a float
            Constant::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            Constant::Float(value) => write!(f, "{value}"),
            Constant::Bool(value) => write!(f, "{value}"),
            Constant::Str(value) => write!(f, "\"{value}\""),
        }
    }
}

impl Constant {
    fn as_float(&self) -> Option<f64> {
        match self {
            Constant::Int(value) => Some(*value as f64),
            Constant::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Converts an integer constant into the equivalent float
    pub fn promoted_to(self, ty: Type) -> Constant {
        match (self, ty) {
            (Constant::Int(value), Type::Float) => Constant::Float(value as f64),
            (constant, _) => constant,
        }
    }
}

/// Evaluates a binary operator over two known values
///
/// Returns `None` when the operands do not support the operator or when the
/// result is undefined (division by zero). Integer arithmetic wraps and integer
/// division truncates toward zero.
pub fn evaluate_binary(operator: BinaryOperator, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    match operator.class() {
        BinaryOperatorClass::Arithmetic => evaluate_arithmetic(operator, lhs, rhs),
        BinaryOperatorClass::Logical => match (lhs, rhs) {
            (Constant::Bool(lhs), Constant::Bool(rhs)) => Some(Constant::Bool(
                if operator == BinaryOperator::LogicalAnd {
                    *lhs && *rhs
                } else {
                    *lhs || *rhs
                },
            )),
            _ => None,
        },
        BinaryOperatorClass::Equality => {
            let equal = match (lhs, rhs) {
                (Constant::Int(lhs), Constant::Int(rhs)) => lhs == rhs,
                (Constant::Bool(lhs), Constant::Bool(rhs)) => lhs == rhs,
                (Constant::Str(lhs), Constant::Str(rhs)) => lhs == rhs,
                _ => lhs.as_float()? == rhs.as_float()?,
            };

            Some(Constant::Bool(if operator == BinaryOperator::Equals {
                equal
            } else {
                !equal
            }))
        }
        BinaryOperatorClass::Relational => {
            let ordering = match (lhs, rhs) {
                (Constant::Int(lhs), Constant::Int(rhs)) => lhs.partial_cmp(rhs),
                _ => lhs.as_float()?.partial_cmp(&rhs.as_float()?),
            }?;

            Some(Constant::Bool(match operator {
                BinaryOperator::LessThan => ordering.is_lt(),
                BinaryOperator::LessThanOrEqualTo => ordering.is_le(),
                BinaryOperator::GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
    }
}

fn evaluate_arithmetic(operator: BinaryOperator, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    if let (Constant::Int(lhs), Constant::Int(rhs)) = (lhs, rhs) {
        return match operator {
            BinaryOperator::Add => Some(Constant::Int(lhs.wrapping_add(*rhs))),
            BinaryOperator::Subtract => Some(Constant::Int(lhs.wrapping_sub(*rhs))),
            BinaryOperator::Multiply => Some(Constant::Int(lhs.wrapping_mul(*rhs))),
            _ if *rhs == 0 => None,
            _ => Some(Constant::Int(lhs.wrapping_div(*rhs))),
        };
    }

    let (lhs, rhs) = (lhs.as_float()?, rhs.as_float()?);

    match operator {
        BinaryOperator::Add => Some(Constant::Float(lhs + rhs)),
        BinaryOperator::Subtract => Some(Constant::Float(lhs - rhs)),
        BinaryOperator::Multiply => Some(Constant::Float(lhs * rhs)),
        _ if rhs == 0.0 => None,
        _ => Some(Constant::Float(lhs / rhs)),
    }
}

pub fn evaluate_unary(operator: UnaryOperator, operand: &Constant) -> Option<Constant> {
    match (operator, operand) {
        (UnaryOperator::LogicalNot, Constant::Bool(value)) => Some(Constant::Bool(!value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn types_render_uppercase_and_parse_lowercase() {
        for ty in Type::iter() {
            let rendered = ty.to_string();
            assert_eq!(rendered.to_lowercase().parse::<Type>(), Ok(ty));
            assert_eq!(rendered, rendered.to_uppercase());
        }
    }

    #[test]
    fn integer_arithmetic_truncates_and_wraps() {
        let evaluate = |operator, lhs, rhs| {
            evaluate_binary(operator, &Constant::Int(lhs), &Constant::Int(rhs))
        };

        assert_eq!(evaluate(BinaryOperator::Divide, 7, 2), Some(Constant::Int(3)));
        assert_eq!(evaluate(BinaryOperator::Divide, -7, 2), Some(Constant::Int(-3)));
        assert_eq!(evaluate(BinaryOperator::Divide, 1, 0), None);
        assert_eq!(
            evaluate(BinaryOperator::Add, i64::MAX, 1),
            Some(Constant::Int(i64::MIN))
        );
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(
            evaluate_binary(BinaryOperator::Multiply, &Constant::Int(2), &Constant::Float(1.5)),
            Some(Constant::Float(3.0))
        );
        assert_eq!(Type::Int.promote(Type::Float), Type::Float);
        assert_eq!(Type::Int.promote(Type::Int), Type::Int);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(
            evaluate_binary(BinaryOperator::LessThan, &Constant::Int(2), &Constant::Float(2.5)),
            Some(Constant::Bool(true))
        );
        assert_eq!(
            evaluate_binary(
                BinaryOperator::NotEquals,
                &Constant::Str("a".into()),
                &Constant::Str("a".into())
            ),
            Some(Constant::Bool(false))
        );
        assert_eq!(
            evaluate_binary(BinaryOperator::LogicalOr, &Constant::Bool(false), &Constant::Bool(true)),
            Some(Constant::Bool(true))
        );
        assert_eq!(
            evaluate_binary(BinaryOperator::LogicalAnd, &Constant::Int(1), &Constant::Bool(true)),
            None
        );
        assert_eq!(
            evaluate_unary(UnaryOperator::LogicalNot, &Constant::Bool(true)),
            Some(Constant::Bool(false))
        );
    }

    #[test]
    fn floats_keep_a_fractional_part() {
        assert_eq!(Constant::Float(5.0).to_string(), "5.0");
        assert_eq!(Constant::Float(2.25).to_string(), "2.25");
        assert_eq!(Constant::Str("hi".into()).to_string(), "\"hi\"");
    }
}
