use hashbrown::HashSet;
use tracing::debug;

use crate::middle::{
    ir::{self, Instruction, Operand},
    types::{Constant, evaluate_binary, evaluate_unary},
};

/// Returns an optimized copy of the instruction stream
pub fn optimize(program: &ir::Program) -> ir::Program {
    let mut optimized = program.clone();
    perform_peephole_optimizations(&mut optimized);
    optimized
}

/// Local rewrites over the instruction stream. Constant folding runs once,
/// then jump elision and label pruning repeat until neither changes anything
/// since removing a label can put a jump right in front of its target.
///
/// Folded values are not propagated into later instructions and code after an
/// always-taken jump is kept.
pub fn perform_peephole_optimizations(program: &mut ir::Program) {
    let before = program.len();

    fold_constants(program);

    let mut rounds = 0;
    loop {
        rounds += 1;

        let elided = elide_trivial_jumps(program);
        let pruned = prune_dead_labels(program);

        if !elided && !pruned {
            break;
        }
    }

    debug!(
        before,
        after = program.len(),
        rounds,
        "peephole optimization finished"
    );
}

/// Only numeric and boolean literals are folded
fn foldable(operand: &Operand) -> Option<&Constant> {
    match operand.as_constant()? {
        constant @ (Constant::Int(_) | Constant::Float(_) | Constant::Bool(_)) => Some(constant),
        Constant::Str(_) => None,
    }
}

/// The truth value of a literal branch condition
fn known_truth(operand: &Operand) -> Option<bool> {
    match operand.as_constant()? {
        Constant::Bool(value) => Some(*value),
        Constant::Int(value) => Some(*value != 0),
        _ => None,
    }
}

/// Drops self assignments, folds operations over literals, and resolves
/// branches on literal conditions
fn fold_constants(program: &mut ir::Program) {
    let instructions = std::mem::take(&mut program.instructions);

    for instruction in instructions {
        let rewritten = match instruction {
            Instruction::Copy {
                destination,
                source,
            } if Operand::from(destination.clone()) == source => None,
            Instruction::Binary {
                operator,
                destination,
                lhs,
                rhs,
            } => {
                let folded = foldable(&lhs)
                    .zip(foldable(&rhs))
                    .and_then(|(lhs, rhs)| evaluate_binary(operator, lhs, rhs));

                Some(match folded {
                    Some(value) => Instruction::Copy {
                        destination,
                        source: Operand::Constant(value),
                    },
                    None => Instruction::Binary {
                        operator,
                        destination,
                        lhs,
                        rhs,
                    },
                })
            }
            Instruction::Unary {
                operator,
                destination,
                operand,
            } => Some(
                match foldable(&operand).and_then(|value| evaluate_unary(operator, value)) {
                    Some(value) => Instruction::Copy {
                        destination,
                        source: Operand::Constant(value),
                    },
                    None => Instruction::Unary {
                        operator,
                        destination,
                        operand,
                    },
                },
            ),
            Instruction::IfFalse { condition, target } => match known_truth(&condition) {
                Some(true) => None,
                Some(false) => Some(Instruction::Goto(target)),
                None => Some(Instruction::IfFalse { condition, target }),
            },
            instruction => Some(instruction),
        };

        program.instructions.extend(rewritten);
    }
}

/// Removes every `goto L` immediately followed by `L:`
fn elide_trivial_jumps(program: &mut ir::Program) -> bool {
    let before = program.len();
    let instructions = std::mem::take(&mut program.instructions);
    let mut instructions = instructions.into_iter().peekable();

    while let Some(instruction) = instructions.next() {
        let jumps_to_next = match (&instruction, instructions.peek()) {
            (Instruction::Goto(target), Some(Instruction::Label(next))) => target == next,
            _ => false,
        };

        if jumps_to_next {
            continue;
        }

        program.instructions.push(instruction);
    }

    program.len() != before
}

/// Removes label definitions no remaining jump refers to
fn prune_dead_labels(program: &mut ir::Program) -> bool {
    let before = program.len();
    let referenced = program
        .instructions
        .iter()
        .filter_map(Instruction::jump_target)
        .collect::<HashSet<_>>();

    program.instructions.retain(|instruction| match instruction {
        Instruction::Label(label) => referenced.contains(label),
        _ => true,
    });

    program.len() != before
}
