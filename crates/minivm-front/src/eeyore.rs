//! Front-end for the high-level three-address IR.
//!
//! Accepted statement forms, one per line (`//` comments allowed):
//!
//! ```text
//! var SYM              var SIZE SYM
//! f_name [N]           end f_name
//! SYM = RVAL           SYM = RVAL OP RVAL      SYM = UNOP RVAL
//! SYM [RVAL] = RVAL    SYM = SYM [RVAL]
//! if RVAL OP RVAL goto LABEL                   goto LABEL
//! LABEL:               param RVAL
//! call f_name          SYM = call f_name
//! return               return RVAL
//! ```
//!
//! `RVAL` is an integer literal (optionally negated) or a symbol.

use minivm_core::Opcode;
use minivm_ir::{EmitErrorKind, InstContainer};

use crate::lexer::{binop_opcode, tokenize, Tok};

/// Parse a whole source file, emitting into `cont`.
///
/// Errors are reported through the container's error channel and make
/// it unsealable; parsing continues to collect more of them.
pub fn parse_eeyore(src: &str, cont: &mut InstContainer) {
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

fn parse_stmt(cont: &mut InstContainer, toks: &[Tok<'_>]) -> Result<(), String> {
    use Tok::*;

    // assignment family first: dispatch on the position of `=`
    if let Some(eq) = toks.iter().position(|t| *t == Op("=")) {
        return parse_assign(cont, toks, eq);
    }
    match toks {
        [Ident("var"), Num(size), Ident(name)] => {
            cont.push_load_imm(*size);
            cont.push_arr(name);
        }
        [Ident("var"), Ident(name)] => cont.push_var(name),
        [Ident(name), Punct('['), Num(params), Punct(']')] => {
            cont.push_label(name);
            cont.enter_function(*params as u32);
        }
        [Ident("end"), Ident(_)] => cont.exit_function(),
        [Ident(name), Punct(':')] => cont.push_label(name),
        [Ident("if"), rest @ .., Ident("goto"), Ident(label)] => {
            let mut cur = rest;
            push_rval(cont, &mut cur)?;
            let op = eat_binop(&mut cur)?;
            push_rval(cont, &mut cur)?;
            expect_end(cur)?;
            cont.push_op(op);
            cont.push_bnz(label);
        }
        [Ident("goto"), Ident(label)] => cont.push_jump(label),
        [Ident("param"), rest @ ..] => {
            let mut cur = rest;
            push_rval(cont, &mut cur)?;
            expect_end(cur)?;
        }
        [Ident("call"), Ident(func)] => {
            cont.push_call(func);
            // discard any return value before the next statement
            cont.push_op(Opcode::Clear);
        }
        [Ident("return")] => cont.push_op(Opcode::Ret),
        [Ident("return"), rest @ ..] => {
            let mut cur = rest;
            push_rval(cont, &mut cur)?;
            expect_end(cur)?;
            cont.push_op(Opcode::Ret);
        }
        _ => return Err("unrecognized statement".into()),
    }
    Ok(())
}

fn parse_assign(cont: &mut InstContainer, toks: &[Tok<'_>], eq: usize) -> Result<(), String> {
    use Tok::*;

    if eq == 1 {
        // SYM = ...
        let Ident(dest) = toks[0] else {
            return Err("expected symbol on the left of '='".into());
        };
        match &toks[2..] {
            [Ident("call"), Ident(func)] => {
                cont.push_call(func);
                cont.push_store_var(dest);
            }
            [Ident(base), Punct('['), rest @ ..] => {
                // SYM = SYM [RVAL]
                let mut cur = rest;
                push_rval(cont, &mut cur)?;
                match cur {
                    [Punct(']')] => {}
                    _ => return Err("expected ']'".into()),
                }
                cont.push_load_var(base);
                cont.push_op(Opcode::Add);
                cont.push_load();
                cont.push_store_var(dest);
            }
            rest => {
                // SYM = RVAL [OP RVAL]
                let mut cur = rest;
                push_unary_rval(cont, &mut cur)?;
                if !cur.is_empty() {
                    let op = eat_binop(&mut cur)?;
                    push_unary_rval(cont, &mut cur)?;
                    expect_end(cur)?;
                    cont.push_op(op);
                }
                cont.push_store_var(dest);
            }
        }
        return Ok(());
    }

    // SYM [RVAL] = RVAL
    let [Ident(base), Punct('['), index @ .., Punct(']')] = &toks[..eq] else {
        return Err("malformed indexed store".into());
    };
    let mut value = &toks[eq + 1..];
    push_rval(cont, &mut value)?;
    expect_end(value)?;
    let mut index = index;
    push_rval(cont, &mut index)?;
    expect_end(index)?;
    cont.push_load_var(base);
    cont.push_op(Opcode::Add);
    cont.push_store();
    Ok(())
}

/// Emit a load of the next rval: an integer literal (with optional
/// leading minus) or a symbol.
fn push_rval<'a>(cont: &mut InstContainer, cur: &mut &[Tok<'a>]) -> Result<(), String> {
    use Tok::*;
    match *cur {
        [Num(n), rest @ ..] => {
            cont.push_load_imm(*n);
            *cur = rest;
        }
        [Op("-"), Num(n), rest @ ..] => {
            cont.push_load_imm(n.wrapping_neg());
            *cur = rest;
        }
        [Ident(name), rest @ ..] => {
            cont.push_load_var(name);
            *cur = rest;
        }
        _ => return Err("expected value".into()),
    }
    Ok(())
}

/// Like [`push_rval`], also accepting `-`/`!` applied to a symbol.
fn push_unary_rval<'a>(cont: &mut InstContainer, cur: &mut &[Tok<'a>]) -> Result<(), String> {
    use Tok::*;
    match *cur {
        [Op("-"), Ident(name), rest @ ..] => {
            cont.push_load_var(name);
            cont.push_op(Opcode::Neg);
            *cur = rest;
            Ok(())
        }
        [Op("!"), rest @ ..] => {
            *cur = rest;
            push_rval(cont, cur)?;
            cont.push_op(Opcode::LNot);
            Ok(())
        }
        _ => push_rval(cont, cur),
    }
}

fn eat_binop<'a>(cur: &mut &[Tok<'a>]) -> Result<Opcode, String> {
    match *cur {
        [Tok::Op(op), rest @ ..] => {
            let opcode = binop_opcode(op).ok_or_else(|| format!("invalid operator '{op}'"))?;
            *cur = rest;
            Ok(opcode)
        }
        _ => Err("expected operator".into()),
    }
}

fn expect_end(cur: &[Tok<'_>]) -> Result<(), String> {
    if cur.is_empty() {
        Ok(())
    } else {
        Err("trailing tokens".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seal(src: &str) -> InstContainer {
        let mut cont = InstContainer::new("test.eeyore");
        parse_eeyore(src, &mut cont);
        cont.seal().expect("program should seal");
        cont
    }

    #[test]
    fn parses_a_minimal_main() {
        let cont = seal("f_main [0]\n  return 42\nend f_main\n");
        assert!(cont.find_pc_by_label("f_main").is_some());
    }

    #[test]
    fn parses_declarations_and_arrays() {
        let cont = seal(
            "var g\n\
             var 40 A\n\
             f_main [0]\n\
               A[0] = 7\n\
               g = A[0]\n\
               return g\n\
             end f_main\n",
        );
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Arr\tA"));
        assert!(text.contains("Var\tg"));
    }

    #[test]
    fn parses_control_flow() {
        let cont = seal(
            "f_main [0]\n\
               var t0\n\
               t0 = 3\n\
             l0:\n\
               t0 = t0 - 1\n\
               if t0 > 0 goto l0\n\
               return t0\n\
             end f_main\n",
        );
        assert!(cont.find_pc_by_label("l0").is_some());
    }

    #[test]
    fn parses_calls_and_params() {
        let cont = seal(
            "f_id [1]\n\
               return p0\n\
             end f_id\n\
             f_main [0]\n\
               var x\n\
               param 5\n\
               x = call f_id\n\
               call f_putint\n\
               return 0\n\
             end f_main\n",
        );
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("CallExt\tf_putint"));
        assert!(text.contains("Clear"));
    }

    #[test]
    fn negative_literals_fold() {
        let cont = seal(
            "f_main [0]\n\
               var x\n\
               x = -3\n\
               return x\n\
             end f_main\n",
        );
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("Imm\t-3"));
    }

    #[test]
    fn bad_statement_is_collected() {
        let mut cont = InstContainer::new("test.eeyore");
        parse_eeyore("f_main [0]\n  wibble wobble ???\nend f_main\n", &mut cont);
        assert!(cont.seal().is_err());
    }
}
