//! Front-end for the register-and-frame IR.
//!
//! Accepted statement forms, one per line (`//` comments allowed):
//!
//! ```text
//! VAR = NUM            VAR = malloc NUM
//! f_name [P] [S]       end f_name
//! REG = REG OP REG     REG = REG OP NUM        REG = UNOP REG
//! REG = REG            REG = NUM               REG = VAR-or-REG [NUM]
//! REG [NUM] = REG
//! if REG OP REG goto LABEL                     goto LABEL
//! LABEL:               call f_name             return
//! store REG NUM        load NUM REG            load VAR REG
//! loadaddr NUM REG     loadaddr VAR REG
//! ```
//!
//! Global scalars are materialized as one-word allocations so that
//! `loadaddr` has an address to produce; `malloc` takes a byte count.

use minivm_core::{reg_index, Opcode, RegId};
use minivm_ir::{EmitErrorKind, InstContainer};

use crate::lexer::{binop_opcode, tokenize, Tok};

/// Parse a whole source file, emitting into `cont`.
pub fn parse_tigger(src: &str, cont: &mut InstContainer) {
    for (idx, line) in src.lines().enumerate() {
        let line_num = (idx + 1) as u32;
        let toks = match tokenize(line) {
            Ok(toks) => toks,
            Err(msg) => {
                cont.log_line(line_num);
                cont.log_error(EmitErrorKind::Parse(msg));
                continue;
            }
        };
        if toks.is_empty() {
            continue;
        }
        cont.log_line(line_num);
        if let Err(msg) = parse_stmt(cont, &toks) {
            cont.log_error(EmitErrorKind::Parse(msg));
        }
    }
}

fn as_reg(tok: &Tok<'_>) -> Option<RegId> {
    match tok {
        Tok::Ident(name) => reg_index(name),
        _ => None,
    }
}

fn parse_stmt(cont: &mut InstContainer, toks: &[Tok<'_>]) -> Result<(), String> {
    use Tok::*;

    if let Some(eq) = toks.iter().position(|t| *t == Op("=")) {
        return parse_assign(cont, toks, eq);
    }
    match toks {
        [Ident(name), Punct('['), Num(params), Punct(']'), Punct('['), Num(slots), Punct(']')] => {
            cont.push_label(name);
            cont.enter_function_with_frame(*params as u32, *slots as u32);
        }
        [Ident("end"), Ident(_)] => cont.exit_function(),
        [Ident(name), Punct(':')] => cont.push_label(name),
        [Ident("if"), lhs, Op(op), rhs, Ident("goto"), Ident(label)] => {
            let lhs = as_reg(lhs).ok_or("expected register")?;
            let rhs = as_reg(rhs).ok_or("expected register")?;
            let opcode = binop_opcode(op).ok_or_else(|| format!("invalid operator '{op}'"))?;
            cont.push_load_reg(lhs);
            cont.push_load_reg(rhs);
            cont.push_op(opcode);
            cont.push_bnz(label);
        }
        [Ident("goto"), Ident(label)] => cont.push_jump(label),
        [Ident("call"), Ident(func)] => cont.push_call(func),
        [Ident("return")] => cont.push_op(Opcode::Ret),
        [Ident("store"), reg, Num(slot)] => {
            let reg = as_reg(reg).ok_or("expected register")?;
            cont.push_load_reg(reg);
            cont.push_store_frame(*slot);
        }
        [Ident("load"), Num(slot), reg] => {
            let reg = as_reg(reg).ok_or("expected register")?;
            cont.push_load_frame(*slot);
            cont.push_store_reg(reg);
        }
        [Ident("load"), Ident(var), reg] => {
            let reg = as_reg(reg).ok_or("expected register")?;
            cont.push_load_var(var);
            cont.push_load();
            cont.push_store_reg(reg);
        }
        [Ident("loadaddr"), Num(slot), reg] => {
            let reg = as_reg(reg).ok_or("expected register")?;
            cont.push_load_frame_addr(*slot);
            cont.push_store_reg(reg);
        }
        [Ident("loadaddr"), Ident(var), reg] => {
            let reg = as_reg(reg).ok_or("expected register")?;
            cont.push_load_var(var);
            cont.push_store_reg(reg);
        }
        _ => return Err("unrecognized statement".into()),
    }
    Ok(())
}

fn parse_assign(cont: &mut InstContainer, toks: &[Tok<'_>], eq: usize) -> Result<(), String> {
    use Tok::*;

    if eq == 1 {
        if let Some(dest) = as_reg(&toks[0]) {
            return parse_reg_assign(cont, dest, &toks[2..]);
        }
        // global declaration
        let Ident(name) = toks[0] else {
            return Err("expected register or global on the left of '='".into());
        };
        match &toks[2..] {
            [Ident("malloc"), Num(size)] => {
                cont.push_load_imm(*size);
                cont.push_arr(name);
            }
            [Num(init)] => {
                cont.push_load_imm(4);
                cont.push_arr(name);
                if *init != 0 {
                    cont.push_load_imm(*init);
                    cont.push_load_var(name);
                    cont.push_store();
                }
            }
            _ => return Err("malformed global declaration".into()),
        }
        return Ok(());
    }

    // REG [NUM] = REG
    let [lhs, Punct('['), Num(offset), Punct(']')] = &toks[..eq] else {
        return Err("malformed indexed store".into());
    };
    let base = as_reg(lhs).ok_or("expected register")?;
    let [src] = &toks[eq + 1..] else {
        return Err("malformed indexed store".into());
    };
    let src = as_reg(src).ok_or("expected register")?;
    cont.push_load_reg(src);
    cont.push_load_imm(*offset);
    cont.push_load_reg(base);
    cont.push_op(Opcode::Add);
    cont.push_store();
    Ok(())
}

fn parse_reg_assign(cont: &mut InstContainer, dest: RegId, rhs: &[Tok<'_>]) -> Result<(), String> {
    use Tok::*;
    match rhs {
        [Num(n)] => cont.push_load_imm(*n),
        [Op("-"), Num(n)] => cont.push_load_imm(n.wrapping_neg()),
        [single] if as_reg(single).is_some() => {
            cont.push_load_reg(as_reg(single).ok_or("expected register")?);
        }
        [Op(op), src] => {
            let src = as_reg(src).ok_or("expected register")?;
            cont.push_load_reg(src);
            match *op {
                "-" => cont.push_op(Opcode::Neg),
                "!" => cont.push_op(Opcode::LNot),
                other => return Err(format!("invalid unary operator '{other}'")),
            }
        }
        [base, Punct('['), Num(offset), Punct(']')] => {
            // REG = REG [NUM]
            let base = as_reg(base).ok_or("expected register")?;
            cont.push_load_imm(*offset);
            cont.push_load_reg(base);
            cont.push_op(Opcode::Add);
            cont.push_load();
        }
        [lhs, Op(op), rhs_tok] => {
            let lhs = as_reg(lhs).ok_or("expected register")?;
            let opcode = binop_opcode(op).ok_or_else(|| format!("invalid operator '{op}'"))?;
            cont.push_load_reg(lhs);
            match rhs_tok {
                Num(n) => cont.push_load_imm(*n),
                other => cont.push_load_reg(as_reg(other).ok_or("expected register")?),
            }
            cont.push_op(opcode);
        }
        _ => return Err("malformed register assignment".into()),
    }
    cont.push_store_reg(dest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seal(src: &str) -> InstContainer {
        let mut cont = InstContainer::new("test.tigger");
        parse_tigger(src, &mut cont);
        cont.seal().expect("program should seal");
        cont
    }

    #[test]
    fn parses_a_minimal_main() {
        let cont = seal(
            "f_main [0] [2]\n\
               a0 = 42\n\
               return\n\
             end f_main\n",
        );
        assert!(cont.find_pc_by_label("f_main").is_some());
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Arr\t$frame"));
        assert!(text.contains("StReg\t20"));
    }

    #[test]
    fn parses_register_arithmetic() {
        let cont = seal(
            "f_main [0] [0]\n\
               t0 = 10\n\
               t1 = t0 * t0\n\
               a0 = t1 + 1\n\
               return\n\
             end f_main\n",
        );
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Mul"));
        assert!(text.contains("Add"));
    }

    #[test]
    fn parses_globals_and_loadaddr() {
        let cont = seal(
            "v0 = 10\n\
             v1 = malloc 40\n\
             f_main [0] [0]\n\
               load v0 t0\n\
               loadaddr v1 t1\n\
               t1 [4] = t0\n\
               a0 = t1 [4]\n\
               return\n\
             end f_main\n",
        );
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Arr\tv0"));
        assert!(text.contains("Arr\tv1"));
    }

    #[test]
    fn parses_frame_slots() {
        let cont = seal(
            "f_main [0] [4]\n\
               t0 = 9\n\
               store t0 2\n\
               load 2 t1\n\
               loadaddr 2 t2\n\
               return\n\
             end f_main\n",
        );
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("LdVar\t$frame"));
    }

    #[test]
    fn parses_branches_and_calls() {
        let cont = seal(
            "f_loop [0] [0]\n\
               return\n\
             end f_loop\n\
             f_main [0] [0]\n\
               t0 = 3\n\
             l0:\n\
               t0 = t0 - 1\n\
               if t0 > 0 goto l0\n\
               call f_loop\n\
               a0 = t0\n\
               return\n\
             end f_main\n",
        );
        assert!(cont.find_pc_by_label("l0").is_some());
        assert!(cont.find_pc_by_label("f_loop").is_some());
    }

    #[test]
    fn bad_statement_is_collected() {
        let mut cont = InstContainer::new("test.tigger");
        parse_tigger("f_main [0] [0]\n  t0 = t1 +\nend f_main\n", &mut cont);
        assert!(cont.seal().is_err());
    }
}
