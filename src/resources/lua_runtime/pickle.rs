//! Tagged byte stream for persisting script state.
//!
//! Each value is a tag byte followed by its payload:
//!
//! | tag | value   | payload                                   |
//! |-----|---------|-------------------------------------------|
//! | 0   | nil     | none                                      |
//! | 1   | number  | `f64`, little endian                      |
//! | 2   | boolean | one byte, 0 or 1                          |
//! | 3   | string  | `u32` little endian length, then bytes    |
//! | 4   | table   | key/value pairs, then a nil tag           |
//!
//! Table entries whose key or value cannot be encoded are skipped with a
//! warning, as are references back into a table that is still being
//! written. Tables nested deeper than [`MAX_PICKLE_DEPTH`] are an error
//! both when writing and when reading.

use log::warn;
use mlua::prelude::*;
use rustc_hash::FxHashSet;
use thiserror::Error;

const TAG_NIL: u8 = 0;
const TAG_NUMBER: u8 = 1;
const TAG_BOOLEAN: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_TABLE: u8 = 4;

/// Deepest table nesting accepted by [`pickle`] and [`unpickle`].
pub const MAX_PICKLE_DEPTH: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PickleError {
    #[error("pickled data ends unexpectedly at byte {0}")]
    Truncated(usize),
    #[error("unknown pickle tag {tag} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },
    #[error("tables nested deeper than {0} levels")]
    TooDeep(usize),
}

impl From<PickleError> for LuaError {
    fn from(err: PickleError) -> Self {
        LuaError::external(err)
    }
}

/// Encodes `value` into a fresh byte buffer.
pub fn pickle(value: &LuaValue) -> LuaResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut open_tables = FxHashSet::default();
    if !write_value(value, &mut out, &mut open_tables, 0)? {
        warn!("cannot pickle a {}, storing nil", value.type_name());
        out.push(TAG_NIL);
    }
    Ok(out)
}

/// Decodes one value from the start of `bytes`.
pub fn unpickle(lua: &Lua, bytes: &[u8]) -> LuaResult<LuaValue> {
    let mut reader = Reader { bytes, pos: 0 };
    reader.read_value(lua, 0)
}

fn encodable(value: &LuaValue) -> bool {
    matches!(
        value,
        LuaValue::Nil
            | LuaValue::Boolean(_)
            | LuaValue::Integer(_)
            | LuaValue::Number(_)
            | LuaValue::String(_)
            | LuaValue::Table(_)
    )
}

/// Appends `value`; returns false without writing when it is not encodable.
fn write_value(
    value: &LuaValue,
    out: &mut Vec<u8>,
    open_tables: &mut FxHashSet<usize>,
    depth: usize,
) -> LuaResult<bool> {
    match value {
        LuaValue::Nil => out.push(TAG_NIL),
        LuaValue::Boolean(b) => {
            out.push(TAG_BOOLEAN);
            out.push(u8::from(*b));
        }
        LuaValue::Integer(i) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&(*i as f64).to_le_bytes());
        }
        LuaValue::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        LuaValue::String(s) => {
            let bytes = s.as_bytes();
            out.push(TAG_STRING);
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        LuaValue::Table(table) => {
            if depth >= MAX_PICKLE_DEPTH {
                return Err(PickleError::TooDeep(MAX_PICKLE_DEPTH).into());
            }
            let id = table.to_pointer() as usize;
            if !open_tables.insert(id) {
                return Ok(false);
            }
            out.push(TAG_TABLE);
            for pair in table.pairs::<LuaValue, LuaValue>() {
                let (key, entry) = pair?;
                if !encodable(&key) || !encodable(&entry) {
                    warn!(
                        "skipping unpicklable table entry ({} = {})",
                        key.type_name(),
                        entry.type_name()
                    );
                    continue;
                }
                let mark = out.len();
                if !write_value(&key, out, open_tables, depth + 1)?
                    || !write_value(&entry, out, open_tables, depth + 1)?
                {
                    warn!("skipping cyclic table entry");
                    out.truncate(mark);
                }
            }
            out.push(TAG_NIL);
            open_tables.remove(&id);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], PickleError> {
        let end = self.pos.checked_add(n).ok_or(PickleError::Truncated(self.pos))?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(PickleError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, PickleError> {
        Ok(self.take(1)?[0])
    }

    fn read_value(&mut self, lua: &Lua, depth: usize) -> LuaResult<LuaValue> {
        let offset = self.pos;
        match self.byte()? {
            TAG_NIL => Ok(LuaValue::Nil),
            TAG_NUMBER => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.take(8)?);
                Ok(LuaValue::Number(f64::from_le_bytes(raw)))
            }
            TAG_BOOLEAN => Ok(LuaValue::Boolean(self.byte()? != 0)),
            TAG_STRING => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(self.take(4)?);
                let len = u32::from_le_bytes(raw) as usize;
                let bytes = self.take(len)?;
                lua.create_string(bytes).map(LuaValue::String)
            }
            TAG_TABLE => {
                if depth >= MAX_PICKLE_DEPTH {
                    return Err(PickleError::TooDeep(MAX_PICKLE_DEPTH).into());
                }
                let table = lua.create_table()?;
                loop {
                    let key = self.read_value(lua, depth + 1)?;
                    if key.is_nil() {
                        break;
                    }
                    let value = self.read_value(lua, depth + 1)?;
                    table.raw_set(key, value)?;
                }
                Ok(LuaValue::Table(table))
            }
            tag => Err(PickleError::UnknownTag { tag, offset }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(lua: &Lua, code: &str) -> LuaValue {
        lua.load(code).eval().unwrap()
    }

    #[test]
    fn test_scalar_encoding() {
        assert_eq!(pickle(&LuaValue::Nil).unwrap(), vec![TAG_NIL]);
        assert_eq!(pickle(&LuaValue::Boolean(true)).unwrap(), vec![TAG_BOOLEAN, 1]);
        let mut number = vec![TAG_NUMBER];
        number.extend_from_slice(&1.5f64.to_le_bytes());
        assert_eq!(pickle(&LuaValue::Number(1.5)).unwrap(), number);
    }

    #[test]
    fn test_string_encoding() {
        let lua = Lua::new();
        let bytes = pickle(&eval(&lua, "return 'ab'")).unwrap();
        assert_eq!(bytes, vec![TAG_STRING, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_table_round_trip() {
        let lua = Lua::new();
        let value = eval(&lua, "return { a = 1, b = 'x', c = true, d = { 1, 2 } }");
        let bytes = pickle(&value).unwrap();
        assert_eq!(bytes.first(), Some(&TAG_TABLE));
        assert_eq!(bytes.last(), Some(&TAG_NIL));

        let restored = unpickle(&lua, &bytes).unwrap();
        lua.globals().set("t", restored).unwrap();
        let ok: bool = lua
            .load("return t.a == 1 and t.b == 'x' and t.c == true and #t.d == 2 and t.d[1] == 1 and t.d[2] == 2")
            .eval()
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_unsupported_entries_are_skipped() {
        let lua = Lua::new();
        let value = eval(&lua, "return { keep = 1, f = function() end, [print] = 2 }");
        let restored = unpickle(&lua, &pickle(&value).unwrap()).unwrap();
        lua.globals().set("t", restored).unwrap();
        let (keep, f): (f64, LuaValue) = lua.load("return t.keep, t.f").eval().unwrap();
        assert_eq!(keep, 1.0);
        assert!(f.is_nil());
        let count: i64 = lua
            .load("local n = 0 for _ in pairs(t) do n = n + 1 end return n")
            .eval()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_cycles_are_skipped() {
        let lua = Lua::new();
        let value = eval(&lua, "local t = { n = 3 } t.self = t return t");
        let restored = unpickle(&lua, &pickle(&value).unwrap()).unwrap();
        lua.globals().set("t", restored).unwrap();
        let (n, cyclic): (f64, LuaValue) = lua.load("return t.n, t.self").eval().unwrap();
        assert_eq!(n, 3.0);
        assert!(cyclic.is_nil());
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let lua = Lua::new();
        let err = unpickle(&lua, &[TAG_NUMBER, 0, 0]).unwrap_err();
        assert!(err.to_string().contains("ends unexpectedly"));
        let err = unpickle(&lua, &[9]).unwrap_err();
        assert!(err.to_string().contains("unknown pickle tag 9"));
    }

    #[test]
    fn test_deep_nesting_is_refused_when_writing() {
        let lua = Lua::new();
        let value = eval(
            &lua,
            "local root = {} local cur = root \
             for i = 1, 100000 do local n = {} cur.next = n cur = n end \
             return root",
        );
        let err = pickle(&value).unwrap_err();
        assert!(err.to_string().contains("nested deeper than"));
    }

    #[test]
    fn test_deep_nesting_is_refused_when_reading() {
        let lua = Lua::new();
        let nested = vec![TAG_TABLE; 100_000];
        let err = unpickle(&lua, &nested).unwrap_err();
        assert!(err.to_string().contains("nested deeper than"));
    }

    #[test]
    fn test_nesting_at_the_limit_round_trips() {
        let lua = Lua::new();
        let code = format!(
            "local root = {{}} local cur = root \
             for i = 2, {} do local n = {{}} cur.next = n cur = n end \
             return root",
            MAX_PICKLE_DEPTH
        );
        let bytes = pickle(&eval(&lua, &code)).unwrap();
        assert!(matches!(unpickle(&lua, &bytes).unwrap(), LuaValue::Table(_)));
    }
}
