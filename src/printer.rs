use crate::types::Value;

/// Renders a value back to text. With `print_readably` set, strings are
/// quoted and escaped so the output reads back as the same value; without
/// it, strings render as their raw content (for `str`/`println`).
/// Printing is total: every variant has a rendering and nothing can fail.
pub fn pr_str(value: &Value, print_readably: bool) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Symbol(s) => s.clone(),
        Value::Keyword(k) => format!(":{}", k),
        Value::Str(s) => {
            if print_readably {
                escape_string(s)
            } else {
                s.clone()
            }
        }
        Value::List(items) => format!("({})", join(items, print_readably)),
        Value::Vector(items) => format!("[{}]", join(items, print_readably)),
        // Maps print as flat alternating elements, keys are not tagged
        Value::Map(items) => format!("{{{}}}", join(items, print_readably)),
        Value::Closure(_) => "#<function>".to_string(),
        Value::Native(native) => format!("#<native:{}>", native.name),
        Value::Atom(cell) => format!("(atom {})", pr_str(&cell.borrow(), print_readably)),
    }
}

fn join(items: &[Value], print_readably: bool) -> String {
    items
        .iter()
        .map(|item| pr_str(item, print_readably))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_string(s: &str) -> String {
    let escaped = s.chars().fold(String::with_capacity(s.len()), |mut acc, c| {
        match c {
            '\\' => acc.push_str("\\\\"),
            '"' => acc.push_str("\\\""),
            '\n' => acc.push_str("\\n"),
            '\r' => acc.push_str("\\r"),
            '\t' => acc.push_str("\\t"),
            c => acc.push(c),
        }
        acc
    });
    format!("\"{}\"", escaped)
}
