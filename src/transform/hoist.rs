//! Predecessor hoisting.
//!
//! Given a target block and a set of its predecessors, a fresh block
//! is inserted whose arguments mirror the target's and whose only
//! instruction is an unconditional branch forwarding them. Each given
//! predecessor's terminator is then retargeted at the new block. The
//! new block and its arguments take fresh names from the function's
//! allocator.

use crate::ir::function::{Argument, BasicBlock};
use crate::ir::instruction::{Instruction, InstructionKind};
use crate::ir::module::Module;
use crate::ir::types::Type;
use crate::ir::{ArgId, BlockId, Definition, FuncId, Use};

/// Fresh names for a batch: the function's allocator cannot see names
/// chosen earlier in the same batch, so they are tracked on the side.
fn fresh_batch_name(
    module: &Module,
    function: FuncId,
    taken: &mut Vec<String>,
    base: &str,
) -> String {
    let function = module.function(function);
    let mut candidate = function.fresh_name(base);
    let mut counter = 0usize;
    while taken.contains(&candidate) {
        candidate = function.fresh_name(&format!("{}_{}", base, counter));
        counter += 1;
    }
    taken.push(candidate.clone());
    candidate
}

/// Inserts a forwarding block before `target` at block position `at`
/// and retargets every listed predecessor's terminator at it. Returns
/// the new block.
pub fn hoist_predecessors(
    module: &mut Module,
    function: FuncId,
    target: BlockId,
    predecessors: &[BlockId],
    at: usize,
) -> BlockId {
    let mut taken = Vec::new();
    let block_name = {
        let base = match &module.function(function).block(target).name {
            Some(name) => format!("{}_head", name),
            None => "head".to_string(),
        };
        fresh_batch_name(module, function, &mut taken, &base)
    };
    let target_arguments = module.function(function).block(target).arguments().to_vec();
    let arguments: Vec<Argument> = target_arguments
        .into_iter()
        .map(|argument| {
            let name = argument
                .name
                .as_deref()
                .map(|base| fresh_batch_name(module, function, &mut taken, base));
            Argument::new(name, argument.ty)
        })
        .collect();

    let new_block = module
        .function_mut(function)
        .insert_block(BasicBlock::new(Some(block_name), arguments), at);

    let forwarded: Vec<Use> = module
        .function(function)
        .block(new_block)
        .arguments()
        .iter()
        .enumerate()
        .map(|(index, _)| {
            Use::Definition(Definition::Argument(ArgId {
                block: new_block,
                index,
            }))
        })
        .collect();
    module.function_mut(function).append_instruction(
        new_block,
        Instruction::new(None, InstructionKind::Branch(target, forwarded), Type::Void),
    );

    for predecessor in predecessors {
        let terminator = module
            .function(function)
            .block(*predecessor)
            .instructions()
            .last()
            .copied();
        if let Some(terminator) = terminator {
            let retargeted = module
                .function(function)
                .instruction(terminator)
                .kind
                .substituting_branches(target, new_block);
            module
                .function_mut(function)
                .instruction_mut(terminator)
                .kind = retargeted;
        }
    }
    new_block
}
