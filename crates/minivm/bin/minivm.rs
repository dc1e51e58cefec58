//! MiniVM command-line driver.
//!
//! Usage:
//!   minivm [OPTIONS] <input-file>

use std::{
    fs,
    io::{self, Write},
    process::ExitCode,
};

use minivm::{build_vm, parse_source, Debugger, IrMode};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "\
Usage: minivm [OPTIONS] FILE

Arguments:
  FILE  input IR file

Options:
  -h, --help            show this message
  -v, --version         show version info
  -t, --tigger          run in Tigger mode
  -d, --debug           enable debugger
  -o, --output PATH     output file, default to stdout
  -dg, --dump-gopher    dump disassembly to output
  -db, --dump-bytecode  dump bytecode to output
  -c, --compile         compile input file to C code";

#[derive(Default)]
struct Options {
    input: Option<String>,
    tigger: bool,
    debug: bool,
    output: Option<String>,
    dump_gopher: bool,
    dump_bytecode: bool,
    compile: bool,
}

enum Action {
    Run(Options),
    Help,
    Version,
}

fn print_version() {
    println!("minivm version {VERSION}");
    println!();
    println!("MiniVM is a virtual machine for interpreting Eeyore/Tigger IR,");
    println!("which is designed for compiler courses.");
}

fn parse_args() -> Result<Action, String> {
    let mut opts = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Action::Help),
            "-v" | "--version" => return Ok(Action::Version),
            "-t" | "--tigger" => opts.tigger = true,
            "-d" | "--debug" => opts.debug = true,
            "-o" | "--output" => {
                let path = args.next().ok_or("'-o' expects a path")?;
                opts.output = Some(path);
            }
            "-dg" | "--dump-gopher" => opts.dump_gopher = true,
            "-db" | "--dump-bytecode" => opts.dump_bytecode = true,
            "-c" | "--compile" => opts.compile = true,
            other if other.starts_with('-') => {
                return Err(format!("unknown option '{other}'"));
            }
            _ if opts.input.is_none() => opts.input = Some(arg),
            _ => return Err("more than one input file".into()),
        }
    }
    if opts.input.is_none() {
        return Err("missing input file".into());
    }
    Ok(Action::Run(opts))
}

fn open_output(opts: &Options) -> io::Result<Box<dyn Write>> {
    match &opts.output {
        Some(path) => Ok(Box::new(fs::File::create(path)?)),
        None => Ok(Box::new(io::stdout())),
    }
}

fn run(opts: Options) -> ExitCode {
    let Some(input) = opts.input.as_deref() else {
        return ExitCode::FAILURE;
    };
    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {input}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mode = if opts.tigger {
        IrMode::Tigger
    } else {
        IrMode::Eeyore
    };

    let mut cont = parse_source(&source, input, mode);
    if let Err(errors) = cont.seal() {
        for error in &errors {
            eprintln!("{error}");
        }
        return ExitCode::from(255);
    }

    if opts.dump_gopher || opts.dump_bytecode {
        let result = open_output(&opts).and_then(|mut out| {
            if opts.dump_gopher {
                cont.dump_all(&mut out)
            } else {
                cont.dump_raw(&mut out)
            }
        });
        return match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error writing output: {err}");
                ExitCode::FAILURE
            }
        };
    }
    if opts.compile {
        eprintln!("the C backend is not built into this binary");
        return ExitCode::FAILURE;
    }

    let mut vm = build_vm(cont, mode);
    let result = if opts.debug {
        let debugger = Debugger::attach(&mut vm);
        print_version();
        let result = vm.run();
        match result {
            Some(value) => println!("VM instance exited with code {value}"),
            None => println!("VM instance ended with error code {}", vm.error_code()),
        }
        drop(debugger);
        result
    } else {
        vm.run()
    };

    match result {
        Some(value) => ExitCode::from(value as u8),
        None => ExitCode::from(vm.error_code() as u8),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    match parse_args() {
        Ok(Action::Help) => {
            println!("{USAGE}");
            ExitCode::SUCCESS
        }
        Ok(Action::Version) => {
            print_version();
            ExitCode::SUCCESS
        }
        Ok(Action::Run(opts)) => run(opts),
        Err(err) => {
            eprintln!("{err}");
            eprintln!("run 'minivm -h' for help");
            ExitCode::FAILURE
        }
    }
}
