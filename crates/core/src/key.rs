//! Storage key evaluation.
//!
//! A compiled raw key such as `friends(filter: $filter, first: 10)` embeds
//! `$name` tokens. Evaluating it substitutes each token with the GraphQL
//! literal of the matching variable, so `{filter: "foo"}` resolves the key
//! above to `friends(filter: "foo", first: 10)`. Tokens inside string literals
//! are left alone and unknown variables print as `undefined`.

use serde_json::Value;

use crate::Variables;

fn is_variable_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn evaluate_key(raw: &str, variables: &Variables) -> String {
    if !raw.contains('$') {
        return raw.to_string();
    }

    let mut evaluated = String::with_capacity(raw.len());
    let mut variable: Option<String> = None;
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars() {
        if let Some(name) = variable.as_mut() {
            if is_variable_char(c) {
                name.push(c);
                continue;
            }
            push_variable(&mut evaluated, name, variables);
            variable = None;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            evaluated.push(c);
            continue;
        }

        match c {
            '$' => variable = Some(String::new()),
            '"' => {
                in_string = true;
                evaluated.push(c);
            }
            _ => evaluated.push(c),
        }
    }

    if let Some(name) = variable {
        push_variable(&mut evaluated, &name, variables);
    }

    evaluated
}

fn push_variable(out: &mut String, name: &str, variables: &Variables) {
    match variables.get(name) {
        Some(value) => write_literal(out, value),
        None => out.push_str("undefined"),
    }
}

/// Print a JSON value as a GraphQL input literal.
fn write_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        // JSON string escaping is a valid GraphQL string literal
        Value::String(_) => out.push_str(&value.to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(out, item);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            out.push('{');
            for (i, (key, item)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                write_literal(out, item);
            }
            out.push('}');
        }
    }
}
