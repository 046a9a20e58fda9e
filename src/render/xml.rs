//! Minimal JSON value → XML encoding.
//!
//! Objects become nested elements named after their keys, arrays repeat the
//! enclosing element once per item, `null` becomes an empty element.

use serde_json::Value;

/// Encode `value` as an element called `root`.
pub fn to_string(root: &str, value: &Value) -> String {
    let mut out = String::new();
    write_element(&mut out, root, value);
    out
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    let name = element_name(name);
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(out, &name, item);
            }
        }
        Value::Null => {
            out.push('<');
            out.push_str(&name);
            out.push_str("/>");
        }
        Value::Object(fields) => {
            open(out, &name);
            for (key, field) in fields {
                write_element(out, key, field);
            }
            close(out, &name);
        }
        Value::String(text) => {
            open(out, &name);
            escape_into(out, text);
            close(out, &name);
        }
        Value::Bool(_) | Value::Number(_) => {
            open(out, &name);
            out.push_str(&value.to_string());
            close(out, &name);
        }
    }
}

fn open(out: &mut String, name: &str) {
    out.push('<');
    out.push_str(name);
    out.push('>');
}

fn close(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Replace characters that may not appear in an element name.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
}
