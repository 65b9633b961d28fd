use anyhow::Context;
use std::io::Read;
use toycc::codegen::RegAllocStrategy;
use toycc::{compile, Options};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut options = Options::default();
    let mut suppress_warnings = false;
    let mut path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-opt" => options.optimize = true,
            "-inline" => options.inline = true,
            "-dump-ir" => options.dump_ir = true,
            "-w" => suppress_warnings = true,
            "-regalloc" => {
                i += 1;
                let strategy = match args.get(i).map(String::as_str) {
                    Some("naive") => RegAllocStrategy::Naive,
                    Some("linear") => RegAllocStrategy::LinearScan,
                    Some("color") => RegAllocStrategy::GraphColor,
                    other => {
                        eprintln!(
                            "Invalid register allocation strategy {:?}",
                            other.unwrap_or("<missing>")
                        );
                        print_usage(&args[0]);
                        std::process::exit(1);
                    }
                };
                options.codegen.strategy = strategy;
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown option '{}'", arg);
                print_usage(&args[0]);
                std::process::exit(1);
            }
            _ => path = Some(arg.clone()),
        }
        i += 1;
    }

    let source = match read_source(path.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    };

    match compile(&source, &options) {
        Ok(out) => {
            eprint!("{}", out.warnings.render(&source, suppress_warnings));
            if let Some(ir) = out.ir_dump {
                eprint!("{}", ir);
            }
            print!("{}", out.assembly);
        }
        Err(diags) => {
            eprint!("{}", diags.render(&source, suppress_warnings));
            std::process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("Usage: {} [-opt] [<path>]", prog);
    eprintln!("Options:");
    eprintln!("  -opt                          Enable the IR optimizer");
    eprintln!("  -inline                       Also inline small functions (with -opt)");
    eprintln!("  -regalloc naive|linear|color  Register allocation strategy");
    eprintln!("  -dump-ir                      Print the IR to stderr");
    eprintln!("  -w                            Suppress warnings");
    eprintln!("Reads from stdin when no path is given; assembly goes to stdout.");
}

fn read_source(path: Option<&str>) -> anyhow::Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Cannot open file {}", path))
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            Ok(buffer)
        }
    }
}
