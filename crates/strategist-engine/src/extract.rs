//! JSONPath subset used by fetch nodes.
//!
//! Supported: `$`, `.key`, `['key']`, `[n]` (negative counts from the end),
//! `[*]` / `.*`, and `..key` (recursive descent). A leading `$` is optional.

use serde_json::Value;

use strategist_core::error::{Result, StrategistError};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(i64),
    Wildcard,
    Descend(String),
}

fn invalid(path: &str, reason: &str) -> StrategistError {
    StrategistError::Template(format!("Invalid extraction path '{}': {}", path, reason))
}

fn read_key(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && chars[*i] != '.' && chars[*i] != '[' {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let trimmed = path.trim();
    let rooted = trimmed.starts_with('$');
    let rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let chars: Vec<char> = rest.chars().collect();

    let mut segments = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' if chars.get(i + 1) == Some(&'.') => {
                i += 2;
                let key = read_key(&chars, &mut i);
                if key.is_empty() {
                    return Err(invalid(path, "'..' must be followed by a key"));
                }
                segments.push(Segment::Descend(key));
            }
            '.' => {
                i += 1;
                if chars.get(i) == Some(&'*') {
                    i += 1;
                    segments.push(Segment::Wildcard);
                    continue;
                }
                let key = read_key(&chars, &mut i);
                if key.is_empty() {
                    return Err(invalid(path, "empty key"));
                }
                segments.push(Segment::Key(key));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|offset| i + offset)
                    .ok_or_else(|| invalid(path, "unclosed '['"))?;
                let inner: String = chars[i + 1..close].iter().collect();
                let inner = inner.trim();
                i = close + 1;

                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else if let Some(key) = strip_quotes(inner) {
                    segments.push(Segment::Key(key.to_string()));
                } else {
                    let index = inner
                        .parse::<i64>()
                        .map_err(|_| invalid(path, "bracket must hold an index, '*' or a quoted key"))?;
                    segments.push(Segment::Index(index));
                }
            }
            _ if i == 0 && !rooted => {
                // Bare leading key: "data.price"
                let key = read_key(&chars, &mut i);
                segments.push(Segment::Key(key));
            }
            c => return Err(invalid(path, &format!("unexpected '{}'", c))),
        }
    }

    Ok(segments)
}

fn strip_quotes(s: &str) -> Option<&str> {
    s.strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| s.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
}

fn descend<'a>(value: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                out.push(found);
            }
            for child in map.values() {
                descend(child, key, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                descend(child, key, out);
            }
        }
        _ => {}
    }
}

/// All matches of `path` in document order.
pub fn query<'a>(value: &'a Value, path: &str) -> Result<Vec<&'a Value>> {
    let segments = parse_path(path)?;
    let mut current = vec![value];

    for segment in &segments {
        let mut next = Vec::new();
        for v in current {
            match segment {
                Segment::Key(key) => {
                    if let Some(found) = v.get(key.as_str()) {
                        next.push(found);
                    }
                }
                Segment::Index(index) => {
                    if let Value::Array(items) = v {
                        let resolved = if *index < 0 {
                            items.len() as i64 + index
                        } else {
                            *index
                        };
                        if resolved >= 0 {
                            if let Some(found) = items.get(resolved as usize) {
                                next.push(found);
                            }
                        }
                    }
                }
                Segment::Wildcard => match v {
                    Value::Array(items) => next.extend(items.iter()),
                    Value::Object(map) => next.extend(map.values()),
                    _ => {}
                },
                Segment::Descend(key) => descend(v, key, &mut next),
            }
        }
        current = next;
    }

    Ok(current)
}

/// First match of `path`, or null when nothing matches.
pub fn extract_first(value: &Value, path: &str) -> Result<Value> {
    Ok(query(value, path)?
        .into_iter()
        .next()
        .cloned()
        .unwrap_or(Value::Null))
}
