//! Compact text rendering of values
//!
//! Records print as `{a:1,b:"x"}`, arrays as `[1,2]`, sets as `|[1,2]|`
//! and maps as `|{"k":1}|`. Times print in RFC 3339.

use std::fmt::{self, Write};

use chrono::{DateTime, SecondsFormat};

use super::primitive::{decode_float, decode_int, decode_uint};
use super::types::{Primitive, TypeDesc};
use super::Value;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_value(f, self)
    }
}

fn format_value(f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
    let body = match v.body() {
        None => return f.write_str("null"),
        Some(b) => b,
    };
    let ty = v.ty().under();
    match ty.desc() {
        TypeDesc::Primitive(p) => format_primitive(f, *p, body),
        TypeDesc::Record(_) => {
            let fields = v.fields().map_err(|_| fmt::Error)?;
            f.write_char('{')?;
            for (i, (name, fv)) in fields.iter().enumerate() {
                if i > 0 {
                    f.write_char(',')?;
                }
                format_name(f, name)?;
                f.write_char(':')?;
                format_value(f, fv)?;
            }
            f.write_char('}')
        }
        TypeDesc::Array(_) | TypeDesc::Set(_) => {
            let set = matches!(ty.desc(), TypeDesc::Set(_));
            let elems = v.elements().map_err(|_| fmt::Error)?;
            f.write_str(if set { "|[" } else { "[" })?;
            for (i, e) in elems.iter().enumerate() {
                if i > 0 {
                    f.write_char(',')?;
                }
                format_value(f, e)?;
            }
            f.write_str(if set { "]|" } else { "]" })
        }
        TypeDesc::Map(_, _) => {
            let entries = v.map_entries().map_err(|_| fmt::Error)?;
            f.write_str("|{")?;
            for (i, (k, val)) in entries.iter().enumerate() {
                if i > 0 {
                    f.write_char(',')?;
                }
                format_value(f, k)?;
                f.write_char(':')?;
                format_value(f, val)?;
            }
            f.write_str("}|")
        }
        TypeDesc::Union(_) => {
            let inner = v.clone().unwrap_union().map_err(|_| fmt::Error)?;
            format_value(f, &inner)
        }
        TypeDesc::Enum(_) => match v.enum_name() {
            Some(name) => f.write_str(name),
            None => Err(fmt::Error),
        },
        TypeDesc::Named(_, _) => Err(fmt::Error),
    }
}

fn format_primitive(f: &mut fmt::Formatter<'_>, p: Primitive, body: &[u8]) -> fmt::Result {
    match p {
        Primitive::Null => f.write_str("null"),
        Primitive::Bool => f.write_str(if body == [1] { "true" } else { "false" }),
        Primitive::Int64 => write!(f, "{}", decode_int(body).map_err(|_| fmt::Error)?),
        Primitive::Uint64 => write!(f, "{}", decode_uint(body).map_err(|_| fmt::Error)?),
        Primitive::Float64 => format_float(f, decode_float(body).map_err(|_| fmt::Error)?),
        Primitive::String => format_quoted(f, &String::from_utf8_lossy(body)),
        Primitive::Bytes => {
            f.write_str("0x")?;
            for b in body {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
        Primitive::Time => {
            let nanos = decode_int(body).map_err(|_| fmt::Error)?;
            let t = DateTime::from_timestamp_nanos(nanos);
            f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        Primitive::Duration => format_duration(f, decode_int(body).map_err(|_| fmt::Error)?),
    }
}

fn format_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        f.write_str("NaN")
    } else if v.is_infinite() {
        f.write_str(if v > 0.0 { "+Inf" } else { "-Inf" })
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        write!(f, "{:.1}", v)
    } else {
        write!(f, "{}", v)
    }
}

fn format_duration(f: &mut fmt::Formatter<'_>, nanos: i64) -> fmt::Result {
    const UNITS: [(i64, &str); 4] = [
        (1_000_000_000, "s"),
        (1_000_000, "ms"),
        (1_000, "us"),
        (1, "ns"),
    ];
    if nanos == 0 {
        return f.write_str("0s");
    }
    for (scale, unit) in UNITS {
        if nanos % scale == 0 {
            return write!(f, "{}{}", nanos / scale, unit);
        }
    }
    write!(f, "{}ns", nanos)
}

fn format_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    match serde_json::to_string(s) {
        Ok(quoted) => f.write_str(&quoted),
        Err(_) => Err(fmt::Error),
    }
}

fn format_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if plain {
        f.write_str(name)
    } else {
        format_quoted(f, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeContext;

    #[test]
    fn test_record_syntax() {
        let zctx = TypeContext::new();
        let xs = Value::array(&zctx, vec![Value::int64(1), Value::int64(2)]).unwrap();
        let rec = Value::record(
            &zctx,
            vec![
                ("v", Value::int64(1)),
                ("s", Value::string("a\"b")),
                ("xs", xs),
                ("my field", Value::null()),
            ],
        )
        .unwrap();
        assert_eq!(
            rec.to_string(),
            r#"{v:1,s:"a\"b",xs:[1,2],"my field":null}"#
        );
    }

    #[test]
    fn test_primitives() {
        assert_eq!(Value::float64(1.0).to_string(), "1.0");
        assert_eq!(Value::float64(2.5).to_string(), "2.5");
        assert_eq!(Value::uint64(7).to_string(), "7");
        assert_eq!(Value::bool(true).to_string(), "true");
        assert_eq!(Value::duration(1_500_000_000).to_string(), "1500ms");
        assert_eq!(Value::time(0).to_string(), "1970-01-01T00:00:00Z");
        assert_eq!(Value::bytes_value([0xde, 0xad]).to_string(), "0xdead");
    }

    #[test]
    fn test_set_syntax() {
        let zctx = TypeContext::new();
        let set = Value::set(&zctx, vec![Value::string("b"), Value::string("a")]).unwrap();
        assert_eq!(set.to_string(), r#"|["a","b"]|"#);
    }
}
