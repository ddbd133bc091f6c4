//! Property paths: `.` descends into objects, `[n]` indexes arrays.
//!
//! `a.b[2].c` addresses member `c` of the third element of `a.b`.

use crate::error::{ConfluxError, Result};

use super::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathItem {
    Key(String),
    Index(usize),
}

fn bad_path(path: &str, why: &str) -> ConfluxError {
    ConfluxError::InvalidArgument(format!("bad property path `{path}`: {why}"))
}

pub fn parse(path: &str) -> Result<Vec<PathItem>> {
    if path.is_empty() {
        return Err(bad_path(path, "empty"));
    }

    let mut items = Vec::new();
    let mut key = String::new();
    let mut chars = path.chars().peekable();
    // set right after `]`: the next char must start a new segment
    let mut after_index = false;

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() && !after_index {
                    return Err(bad_path(path, "empty segment"));
                }
                if !key.is_empty() {
                    items.push(PathItem::Key(std::mem::take(&mut key)));
                }
                after_index = false;
                if chars.peek().is_none() {
                    return Err(bad_path(path, "trailing `.`"));
                }
            }
            '[' => {
                if !key.is_empty() {
                    items.push(PathItem::Key(std::mem::take(&mut key)));
                }
                let mut digits = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == ']' {
                        closed = true;
                        break;
                    }
                    digits.push(d);
                }
                if !closed {
                    return Err(bad_path(path, "unterminated `[`"));
                }
                let idx = digits
                    .parse::<usize>()
                    .map_err(|_| bad_path(path, "array index must be a non-negative integer"))?;
                items.push(PathItem::Index(idx));
                after_index = true;
            }
            ']' => return Err(bad_path(path, "unexpected `]`")),
            c => {
                if after_index {
                    return Err(bad_path(path, "expected `.` or `[` after `]`"));
                }
                key.push(c);
            }
        }
    }
    if !key.is_empty() {
        items.push(PathItem::Key(key));
    }
    Ok(items)
}

impl Value {
    pub fn peek(&self, path: &str) -> Result<Option<&Value>> {
        let items = parse(path)?;
        Ok(self.peek_items(&items))
    }

    pub fn peek_items(&self, items: &[PathItem]) -> Option<&Value> {
        let mut cur = self;
        for item in items {
            cur = match item {
                PathItem::Key(k) => cur.get(k)?,
                PathItem::Index(i) => cur.as_array().ok()?.get(*i)?,
            };
        }
        Some(cur)
    }

    pub fn peek_mut(&mut self, path: &str) -> Result<Option<&mut Value>> {
        let items = parse(path)?;
        let mut cur = self;
        for item in &items {
            let next = match item {
                PathItem::Key(k) => cur.get_mut(k),
                PathItem::Index(i) => match cur {
                    Value::Array(a) => a.get_mut(*i),
                    _ => None,
                },
            };
            match next {
                Some(n) => cur = n,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    /// Store `v` at `path`, creating missing intermediate containers.
    ///
    /// Arrays are padded with `Null` up to the index. An intermediate node of
    /// the wrong container type is replaced; the root itself must already be
    /// the container the first segment addresses.
    pub fn set(&mut self, path: &str, v: Value) -> Result<()> {
        let items = parse(path)?;
        self.set_items(&items, v)
            .map_err(|why| bad_path(path, why))
    }

    pub fn set_items(&mut self, items: &[PathItem], v: Value) -> std::result::Result<(), &'static str> {
        let Some((first, _)) = items.split_first() else {
            *self = v;
            return Ok(());
        };
        match (first, &*self) {
            (PathItem::Key(_), Value::Object(_)) | (PathItem::Index(_), Value::Array(_)) => {}
            (PathItem::Key(_), _) => return Err("root is not an object"),
            (PathItem::Index(_), _) => return Err("root is not an array"),
        }

        let mut cur = self;
        for (pos, item) in items.iter().enumerate() {
            let slot: &mut Value = match item {
                PathItem::Key(k) => {
                    if !matches!(cur, Value::Object(_)) {
                        *cur = Value::object();
                    }
                    let Value::Object(o) = cur else {
                        return Err("object expected");
                    };
                    let idx = match o.iter().position(|(ok, _)| ok == k) {
                        Some(idx) => idx,
                        None => {
                            o.push((k.clone(), Value::Null));
                            o.len() - 1
                        }
                    };
                    &mut o[idx].1
                }
                PathItem::Index(i) => {
                    if !matches!(cur, Value::Array(_)) {
                        *cur = Value::array();
                    }
                    let Value::Array(a) = cur else {
                        return Err("array expected");
                    };
                    if a.len() <= *i {
                        a.resize(*i + 1, Value::Null);
                    }
                    &mut a[*i]
                }
            };
            if pos + 1 == items.len() {
                *slot = v;
                return Ok(());
            }
            cur = slot;
        }
        Ok(())
    }

    /// Detach and return the value at `path`.
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>> {
        let mut items = parse(path)?;
        let Some(last) = items.pop() else {
            return Ok(None);
        };
        let parent = if items.is_empty() {
            Some(self)
        } else {
            let mut cur = Some(self);
            for item in &items {
                cur = match (item, cur) {
                    (PathItem::Key(k), Some(v)) => v.get_mut(k),
                    (PathItem::Index(i), Some(Value::Array(a))) => a.get_mut(*i),
                    _ => None,
                };
            }
            cur
        };
        Ok(match (last, parent) {
            (PathItem::Key(k), Some(p)) => p.remove_key(&k),
            (PathItem::Index(i), Some(Value::Array(a))) if i < a.len() => Some(a.remove(i)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_path() {
        assert_eq!(
            parse("a.b[2].c").unwrap(),
            vec![
                PathItem::Key("a".into()),
                PathItem::Key("b".into()),
                PathItem::Index(2),
                PathItem::Key("c".into()),
            ]
        );
        assert_eq!(
            parse("m[0][1]").unwrap(),
            vec![PathItem::Key("m".into()), PathItem::Index(0), PathItem::Index(1)]
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", ".a", "a.", "a..b", "a[", "a[x]", "a[-1]", "a]", "a[0]b"] {
            assert!(parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn set_creates_and_pads() {
        let mut root = Value::object();
        root.set("a.b[2].c", Value::Int32(7)).unwrap();
        assert_eq!(root.peek("a.b[2].c").unwrap(), Some(&Value::Int32(7)));
        assert_eq!(root.peek("a.b[0]").unwrap(), Some(&Value::Null));
        assert_eq!(root.peek("a.b[5]").unwrap(), None);
    }

    #[test]
    fn set_replaces_wrong_intermediate_type() {
        let mut root = Value::object();
        root.set("a", Value::from("scalar")).unwrap();
        root.set("a.b", Value::Bool(true)).unwrap();
        assert_eq!(root.peek("a.b").unwrap(), Some(&Value::Bool(true)));

        let mut not_obj = Value::Int8(1);
        assert!(not_obj.set("a", Value::Null).is_err());
    }

    #[test]
    fn remove_detaches() {
        let mut root = Value::object();
        root.set("x.y", Value::Int64(1)).unwrap();
        root.set("x.z[1]", Value::Int64(2)).unwrap();
        assert_eq!(root.remove("x.y").unwrap(), Some(Value::Int64(1)));
        assert_eq!(root.remove("x.z[1]").unwrap(), Some(Value::Int64(2)));
        assert_eq!(root.peek("x.y").unwrap(), None);
        assert_eq!(root.remove("nope.deeper").unwrap(), None);
    }
}
