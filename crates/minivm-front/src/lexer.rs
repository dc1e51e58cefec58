use minivm_core::{Opcode, VmOpr};

/// One token of an IR source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tok<'a> {
    Ident(&'a str),
    Num(VmOpr),
    /// An operator: arithmetic, comparison, logic, or `=`.
    Op(&'a str),
    /// `[`, `]` or `:`.
    Punct(char),
}

const OP_CHARS: &str = "+-*/%<>=!&|";
const OPS: &[&str] = &[
    "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "&&", "||", "!", "=",
];

/// Split one source line into tokens. `//` starts a comment.
pub fn tokenize(line: &str) -> Result<Vec<Tok<'_>>, String> {
    let bytes = line.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            break;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            toks.push(Tok::Ident(&line[start..i]));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }
            let value: i64 = line[start..i]
                .parse()
                .map_err(|_| format!("invalid number '{}'", &line[start..i]))?;
            toks.push(Tok::Num(value as VmOpr));
        } else if OP_CHARS.contains(c) {
            let start = i;
            while i < bytes.len() && OP_CHARS.contains(bytes[i] as char) {
                i += 1;
            }
            let op = &line[start..i];
            if !OPS.contains(&op) {
                return Err(format!("invalid operator '{op}'"));
            }
            toks.push(Tok::Op(op));
        } else if c == '[' || c == ']' || c == ':' {
            toks.push(Tok::Punct(c));
            i += 1;
        } else {
            return Err(format!("unexpected character '{c}'"));
        }
    }
    Ok(toks)
}

/// Map a binary operator token to its opcode.
pub fn binop_opcode(op: &str) -> Option<Opcode> {
    Some(match op {
        "+" => Opcode::Add,
        "-" => Opcode::Sub,
        "*" => Opcode::Mul,
        "/" => Opcode::Div,
        "%" => Opcode::Mod,
        "==" => Opcode::Eq,
        "!=" => Opcode::Ne,
        "<" => Opcode::Lt,
        ">" => Opcode::Gt,
        "<=" => Opcode::Le,
        ">=" => Opcode::Ge,
        "&&" => Opcode::LAnd,
        "||" => Opcode::LOr,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_statement() {
        let toks = tokenize("t0 = t1 + 12").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::Ident("t0"),
                Tok::Op("="),
                Tok::Ident("t1"),
                Tok::Op("+"),
                Tok::Num(12),
            ]
        );
    }

    #[test]
    fn tokenizes_brackets_and_labels() {
        let toks = tokenize("T0 [ 4 ] = p0").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::Ident("T0"),
                Tok::Punct('['),
                Tok::Num(4),
                Tok::Punct(']'),
                Tok::Op("="),
                Tok::Ident("p0"),
            ]
        );
        assert_eq!(tokenize("l3:").unwrap(), vec![Tok::Ident("l3"), Tok::Punct(':')]);
    }

    #[test]
    fn comments_end_the_line() {
        assert_eq!(tokenize("  // nothing here").unwrap(), vec![]);
        assert_eq!(
            tokenize("return 0 // done").unwrap(),
            vec![Tok::Ident("return"), Tok::Num(0)]
        );
    }

    #[test]
    fn compound_operators_munch_maximally() {
        let toks = tokenize("if t0 <= t1 goto l0").unwrap();
        assert!(toks.contains(&Tok::Op("<=")));
        let toks = tokenize("t0 = t1 != t2").unwrap();
        assert!(toks.contains(&Tok::Op("!=")));
    }

    #[test]
    fn rejects_garbage() {
        assert!(tokenize("t0 = @").is_err());
        assert!(tokenize("t0 =<> t1").is_err());
    }

    #[test]
    fn binop_table_is_complete() {
        for op in ["+", "-", "*", "/", "%", "==", "!=", "<", ">", "<=", ">=", "&&", "||"] {
            assert!(binop_opcode(op).is_some(), "{op}");
        }
        assert!(binop_opcode("=").is_none());
        assert!(binop_opcode("!").is_none());
    }
}
