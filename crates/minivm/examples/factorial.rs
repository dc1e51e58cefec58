//! Build and run a recursive factorial through the whole pipeline.
//!
//! Run with: cargo run --example factorial

use minivm::{build_vm, parse_source, IrMode};

const PROGRAM: &str = "\
f_fact [1]
  var t0
  if p0 > 1 goto l0
  return 1
l0:
  t0 = p0 - 1
  param t0
  t0 = call f_fact
  t0 = t0 * p0
  return t0
end f_fact

f_main [0]
  var r
  param 10
  r = call f_fact
  return r
end f_main
";

fn main() {
    let mut cont = parse_source(PROGRAM, "factorial.eeyore", IrMode::Eeyore);
    if let Err(errors) = cont.seal() {
        for error in errors {
            eprintln!("{error}");
        }
        return;
    }
    let mut vm = build_vm(cont, IrMode::Eeyore);
    match vm.run() {
        Some(value) => println!("10! = {value}"),
        None => eprintln!("run failed with code {}", vm.error_code()),
    }
}
