//! Renames three-address code into static single assignment form
//!
//! This is a single forward pass without phi nodes. Every assignment to a
//! user variable creates a new version and later reads refer to the most
//! recent one in program order, regardless of control flow. The output is
//! meant for inspection only.

use hashbrown::HashMap;
use tracing::debug;

use crate::middle::ir::{self, Destination, Instruction, Operand, Variable};

#[derive(Debug, Default)]
struct SsaRenamer {
    counters: HashMap<String, u32>,
    current: HashMap<String, Variable>,
}

pub fn to_ssa(program: &ir::Program) -> ir::Program {
    let mut renamer = SsaRenamer::default();
    let mut renamed = program.clone();

    for instruction in &mut renamed.instructions {
        renamer.rename(instruction);
    }

    debug!(
        variables = renamer.counters.len(),
        versions = renamer.counters.values().sum::<u32>(),
        "renamed into ssa form"
    );

    renamed
}

impl SsaRenamer {
    fn rename(&mut self, instruction: &mut Instruction) {
        if let Instruction::Declare { name, .. } = instruction {
            self.counters.insert(name.clone(), 0);
            self.current.insert(name.clone(), Variable::new(name.as_str()));
            return;
        }

        for operand in instruction.operands_mut() {
            self.substitute(operand);
        }

        // Temporaries are already unique
        if let Some(Destination::Variable(variable)) = instruction.destination_mut() {
            let counter = self.counters.entry(variable.name.clone()).or_insert(0);
            *counter += 1;

            variable.version = Some(*counter);
            self.current
                .insert(variable.name.clone(), variable.clone());
        }
    }

    fn substitute(&self, operand: &mut Operand) {
        match operand {
            Operand::Variable(variable) => {
                if let Some(current) = self.current.get(&variable.name) {
                    *variable = current.clone();
                }
            }
            Operand::List(elements) => {
                for element in elements {
                    self.substitute(element);
                }
            }
            Operand::Temporary(_) | Operand::Constant(_) => {}
        }
    }
}
