use std::env;
use std::fs;
use std::rc::Rc;

use tela::transform::{Transform, TransformPipeline};
use tela::{parse_module, print_module, verify_module, IntrinsicRegistry};

fn usage() -> ! {
    eprintln!("Usage: tela <input.tela> [--pass name[,name...]] [--output <path>] [--print]");
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut input = None;
    let mut passes: Vec<String> = Vec::new();
    let mut output = None;
    let mut print = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pass" => {
                let list = args.next().unwrap_or_else(|| usage());
                passes.extend(list.split(',').map(str::to_string));
            }
            "--output" => output = Some(args.next().unwrap_or_else(|| usage())),
            "--print" => print = true,
            _ if input.is_none() => input = Some(arg),
            _ => usage(),
        }
    }
    let input = input.unwrap_or_else(|| usage());

    let source = fs::read_to_string(&input)?;
    let mut module = parse_module(&source, Rc::new(IntrinsicRegistry::default()))?;
    verify_module(&module)?;
    log::info!("parsed and verified module \"{}\"", module.name);

    for pass in &passes {
        let transform = match TransformPipeline::by_name(pass) {
            Some(transform) => transform,
            None => {
                eprintln!("Unknown pass: {}", pass);
                std::process::exit(1);
            }
        };
        let functions: Vec<_> = module.functions().map(|(id, _)| id).collect();
        let mut changed = false;
        for function in functions {
            if module.function(function).is_declaration() {
                continue;
            }
            changed |= transform.apply(&mut module, function);
        }
        log::info!("pass {}: changed = {}", pass, changed);
        // A transform must leave the module verifiable.
        verify_module(&module)?;
    }

    match output {
        Some(path) => fs::write(path, print_module(&module))?,
        None if print || passes.is_empty() => print!("{}", print_module(&module)),
        None => {}
    }
    Ok(())
}
