//! Conversion between native PostgreSQL values and [`CellValue`].
//!
//! The mapping is total in both directions: every value a successful query
//! can return has a defined [`CellValue`] form (with a text fallback for
//! types the editor has no dedicated handling for), and every `CellValue`
//! written back by the grid is converted to the parameter type the server
//! inferred for the prepared statement.

use std::error::Error as StdError;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_i18n::t;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

use super::types::CellValue;

type BoxError = Box<dyn StdError + Sync + Send>;

impl<'a> FromSql<'a> for CellValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match ty.name() {
            "bool" => CellValue::Bool(bool::from_sql(ty, raw)?),
            "int2" => CellValue::Int(i16::from_sql(ty, raw)? as i64),
            "int4" => CellValue::Int(i32::from_sql(ty, raw)? as i64),
            "int8" => CellValue::Int(i64::from_sql(ty, raw)?),
            "oid" => CellValue::Int(u32::from_sql(ty, raw)? as i64),
            "float4" => CellValue::Float(f32::from_sql(ty, raw)? as f64),
            "float8" => CellValue::Float(f64::from_sql(ty, raw)?),
            "text" | "varchar" | "bpchar" | "name" | "unknown" => {
                CellValue::Text(String::from_utf8(raw.to_vec())?)
            }
            "date" => CellValue::Temporal(
                NaiveDate::from_sql(ty, raw)?.format("%Y-%m-%d").to_string(),
            ),
            "time" => CellValue::Temporal(
                NaiveTime::from_sql(ty, raw)?.format("%H:%M:%S%.f").to_string(),
            ),
            "timestamp" => CellValue::Temporal(
                NaiveDateTime::from_sql(ty, raw)?
                    .format("%Y-%m-%dT%H:%M:%S%.f")
                    .to_string(),
            ),
            "timestamptz" => {
                CellValue::Temporal(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339())
            }
            "json" | "jsonb" => CellValue::Json(serde_json::Value::from_sql(ty, raw)?),
            "uuid" => CellValue::Text(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            "bytea" => CellValue::Bytes(BASE64.encode(<&[u8]>::from_sql(ty, raw)?)),
            "numeric" => CellValue::Text(numeric::decode(raw)?),
            // Everything else keeps its raw text form; for binary-only types
            // this is lossy but never a failure.
            _ => CellValue::Text(String::from_utf8_lossy(raw).into_owned()),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(CellValue::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl ToSql for CellValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        match ty.name() {
            "bool" => match self {
                CellValue::Bool(b) => b.to_sql(ty, out),
                other => parse_text(other, ty)?.parse::<bool>()?.to_sql(ty, out),
            },
            "int2" => i16::try_from(self.to_i64(ty)?)?.to_sql(ty, out),
            "int4" => i32::try_from(self.to_i64(ty)?)?.to_sql(ty, out),
            "int8" => self.to_i64(ty)?.to_sql(ty, out),
            "oid" => u32::try_from(self.to_i64(ty)?)?.to_sql(ty, out),
            "float4" => (self.to_f64(ty)? as f32).to_sql(ty, out),
            "float8" => self.to_f64(ty)?.to_sql(ty, out),
            "numeric" => {
                numeric::encode(&self.as_text(), out)?;
                Ok(IsNull::No)
            }
            "text" | "varchar" | "bpchar" | "name" => self.as_text().as_str().to_sql(ty, out),
            "date" => {
                let text = parse_text(self, ty)?;
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map_err(|_| invalid(&text, ty))?
                    .to_sql(ty, out)
            }
            "time" => {
                let text = parse_text(self, ty)?;
                NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(&text, "%H:%M"))
                    .map_err(|_| invalid(&text, ty))?
                    .to_sql(ty, out)
            }
            "timestamp" => {
                let text = parse_text(self, ty)?;
                parse_naive_datetime(&text)
                    .ok_or_else(|| invalid(&text, ty))?
                    .to_sql(ty, out)
            }
            "timestamptz" => {
                let text = parse_text(self, ty)?;
                let value = match DateTime::parse_from_rfc3339(&text) {
                    Ok(dt) => dt.with_timezone(&Utc),
                    // Timestamps edited without an offset are taken as UTC.
                    Err(_) => parse_naive_datetime(&text)
                        .ok_or_else(|| invalid(&text, ty))?
                        .and_utc(),
                };
                value.to_sql(ty, out)
            }
            "json" | "jsonb" => match self {
                CellValue::Json(v) => v.to_sql(ty, out),
                other => {
                    let text = other.as_text();
                    let value: serde_json::Value =
                        serde_json::from_str(&text).map_err(|_| invalid(&text, ty))?;
                    value.to_sql(ty, out)
                }
            },
            "uuid" => {
                let text = parse_text(self, ty)?;
                uuid::Uuid::parse_str(&text)
                    .map_err(|_| invalid(&text, ty))?
                    .to_sql(ty, out)
            }
            "bytea" => {
                let text = parse_text(self, ty)?;
                let decoded = BASE64.decode(text.as_bytes()).map_err(|_| invalid(&text, ty))?;
                decoded.to_sql(ty, out)
            }
            _ => Err(unsupported(ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        // accepts() admits every type, conversion errors surface from to_sql.
        self.to_sql(ty, out)
    }
}

impl CellValue {
    fn to_i64(&self, ty: &Type) -> Result<i64, BoxError> {
        match self {
            CellValue::Int(i) => Ok(*i),
            CellValue::Text(s) | CellValue::Temporal(s) => {
                s.trim().parse::<i64>().map_err(|_| invalid(s, ty))
            }
            other => Err(invalid(&other.as_text(), ty)),
        }
    }

    fn to_f64(&self, ty: &Type) -> Result<f64, BoxError> {
        match self {
            CellValue::Float(f) => Ok(*f),
            CellValue::Int(i) => Ok(*i as f64),
            CellValue::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid(s, ty)),
            other => Err(invalid(&other.as_text(), ty)),
        }
    }
}

/// Extracts the textual form of a value destined for a parsed target type;
/// structured values (json) are rejected early with a readable error.
fn parse_text(value: &CellValue, ty: &Type) -> Result<String, BoxError> {
    match value {
        CellValue::Json(_) => Err(invalid(&value.as_text(), ty)),
        other => Ok(other.as_text()),
    }
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn invalid(value: &str, ty: &Type) -> BoxError {
    t!("db.invalid_parameter", value = value, ty = ty.name())
        .to_string()
        .into()
}

fn unsupported(ty: &Type) -> BoxError {
    t!("db.unsupported_parameter", ty = ty.name())
        .to_string()
        .into()
}

/// Wire codec for the `numeric` type.
///
/// The binary form is a sequence of big-endian fields: digit count, weight
/// of the first digit group, sign, display scale, then the digit groups in
/// base 10000. Decoding to a decimal string (instead of a float) keeps the
/// exact value the server sent.
mod numeric {
    use bytes::{BufMut, BytesMut};

    use super::BoxError;

    const SIGN_POS: u16 = 0x0000;
    const SIGN_NEG: u16 = 0x4000;
    const SIGN_NAN: u16 = 0xC000;

    pub fn decode(raw: &[u8]) -> Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("numeric value shorter than its header".into());
        }
        let ndigits = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]) as i32;
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = u16::from_be_bytes([raw[6], raw[7]]) as usize;

        if sign == SIGN_NAN {
            return Ok("NaN".to_string());
        }
        if raw.len() < 8 + ndigits * 2 {
            return Err("numeric value truncated".into());
        }
        let digit = |i: i32| -> u16 {
            if i < 0 || i as usize >= ndigits {
                return 0;
            }
            let at = 8 + i as usize * 2;
            u16::from_be_bytes([raw[at], raw[at + 1]])
        };

        let mut text = String::new();
        if sign == SIGN_NEG {
            text.push('-');
        }

        if weight >= 0 {
            for w in (0..=weight).rev() {
                let d = digit(weight - w);
                if w == weight {
                    text.push_str(&d.to_string());
                } else {
                    text.push_str(&format!("{:04}", d));
                }
            }
        } else {
            text.push('0');
        }

        if dscale > 0 {
            let mut frac = String::new();
            let mut w = -1i32;
            while frac.len() < dscale {
                frac.push_str(&format!("{:04}", digit(weight - w)));
                w -= 1;
            }
            frac.truncate(dscale);
            text.push('.');
            text.push_str(&frac);
        }
        Ok(text)
    }

    pub fn encode(text: &str, out: &mut BytesMut) -> Result<(), BoxError> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("nan") {
            out.put_u16(0);
            out.put_i16(0);
            out.put_u16(SIGN_NAN);
            out.put_u16(0);
            return Ok(());
        }

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_str, frac_str) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        if int_str.is_empty() && frac_str.is_empty() {
            return Err(format!("\"{}\" is not a valid numeric value", text).into());
        }
        if !int_str.bytes().all(|b| b.is_ascii_digit())
            || !frac_str.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(format!("\"{}\" is not a valid numeric value", text).into());
        }

        // Group digits in base 10000, aligned on the decimal point.
        let int_padded = format!("{}{}", "0".repeat((4 - int_str.len() % 4) % 4), int_str);
        let frac_padded = format!("{}{}", frac_str, "0".repeat((4 - frac_str.len() % 4) % 4));
        let mut groups: Vec<i16> = Vec::new();
        for chunk in int_padded
            .as_bytes()
            .chunks(4)
            .chain(frac_padded.as_bytes().chunks(4))
        {
            if chunk.is_empty() {
                continue;
            }
            let group: i16 = std::str::from_utf8(chunk)
                .expect("digit chunks are ascii")
                .parse()
                .expect("digit chunks fit in a base-10000 group");
            groups.push(group);
        }

        let mut weight = (int_padded.len() / 4) as i32 - 1;
        let mut start = 0;
        while start < groups.len() && groups[start] == 0 {
            start += 1;
            weight -= 1;
        }
        let mut end = groups.len();
        while end > start && groups[end - 1] == 0 {
            end -= 1;
        }
        let digits = &groups[start..end];

        let sign = if digits.is_empty() {
            SIGN_POS
        } else if negative {
            SIGN_NEG
        } else {
            SIGN_POS
        };
        out.put_u16(digits.len() as u16);
        out.put_i16(if digits.is_empty() { 0 } else { weight } as i16);
        out.put_u16(sign);
        out.put_u16(frac_str.len() as u16);
        for d in digits {
            out.put_i16(*d);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(ty: &Type, raw: &[u8]) -> CellValue {
        CellValue::from_sql(ty, raw).unwrap()
    }

    #[test]
    fn maps_primitive_types() {
        assert_eq!(decode(&Type::BOOL, &[1]), CellValue::Bool(true));
        assert_eq!(decode(&Type::INT2, &7i16.to_be_bytes()), CellValue::Int(7));
        assert_eq!(decode(&Type::INT4, &(-5i32).to_be_bytes()), CellValue::Int(-5));
        assert_eq!(
            decode(&Type::INT8, &i64::MAX.to_be_bytes()),
            CellValue::Int(i64::MAX)
        );
        assert_eq!(
            decode(&Type::FLOAT8, &2.5f64.to_be_bytes()),
            CellValue::Float(2.5)
        );
        assert_eq!(
            decode(&Type::TEXT, b"hello"),
            CellValue::Text("hello".to_string())
        );
    }

    #[test]
    fn null_maps_to_null_for_any_type() {
        assert_eq!(CellValue::from_sql_null(&Type::INT4).unwrap(), CellValue::Null);
        assert_eq!(CellValue::from_sql_null(&Type::POINT).unwrap(), CellValue::Null);
    }

    #[test]
    fn bytea_maps_to_base64() {
        assert_eq!(
            decode(&Type::BYTEA, &[0xde, 0xad, 0xbe, 0xef]),
            CellValue::Bytes("3q2+7w==".to_string())
        );
    }

    #[test]
    fn json_maps_to_inline_value() {
        // jsonb is versioned with a leading 1 byte.
        let mut raw = vec![1u8];
        raw.extend_from_slice(br#"{"a":1}"#);
        assert_eq!(
            decode(&Type::JSONB, &raw),
            CellValue::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn unmatched_types_fall_back_to_text() {
        assert!(matches!(
            decode(&Type::MACADDR, b"08:00:2b:01:02:03"),
            CellValue::Text(_)
        ));
    }

    #[test]
    fn binds_integers_with_narrowing() {
        let mut out = BytesMut::new();
        CellValue::Int(5).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &5i32.to_be_bytes());

        let mut out = BytesMut::new();
        CellValue::Text("42".to_string())
            .to_sql(&Type::INT8, &mut out)
            .unwrap();
        assert_eq!(&out[..], &42i64.to_be_bytes());

        let mut out = BytesMut::new();
        assert!(CellValue::Int(100_000)
            .to_sql(&Type::INT2, &mut out)
            .is_err());
    }

    #[test]
    fn binds_null_as_is_null() {
        let mut out = BytesMut::new();
        let is_null = CellValue::Null.to_sql(&Type::TEXT, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_unparsable_parameters() {
        let mut out = BytesMut::new();
        assert!(CellValue::Text("abc".to_string())
            .to_sql(&Type::INT4, &mut out)
            .is_err());
        assert!(CellValue::Text("not-a-uuid".to_string())
            .to_sql(&Type::UUID, &mut out)
            .is_err());
    }

    #[test]
    fn binds_temporal_text() {
        let mut out = BytesMut::new();
        CellValue::Temporal("2024-03-01".to_string())
            .to_sql(&Type::DATE, &mut out)
            .unwrap();
        assert!(!out.is_empty());

        let mut out = BytesMut::new();
        CellValue::Text("2024-03-01T10:30:00".to_string())
            .to_sql(&Type::TIMESTAMP, &mut out)
            .unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn numeric_encodes_to_base_10000_groups() {
        let mut out = BytesMut::new();
        numeric::encode("1234.5", &mut out).unwrap();
        // ndigits=2, weight=0, sign=+, dscale=1, digits 1234 and 5000
        assert_eq!(
            &out[..],
            &[0, 2, 0, 0, 0, 0, 0, 1, 0x04, 0xD2, 0x13, 0x88]
        );
    }

    #[test]
    fn numeric_encodes_zero_with_no_digits() {
        let mut out = BytesMut::new();
        numeric::encode("0", &mut out).unwrap();
        assert_eq!(&out[..], &[0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn numeric_decode_restores_text() {
        for text in ["0", "1", "-1", "1234.5", "0.007", "-12345678.900", "10000"] {
            let mut out = BytesMut::new();
            numeric::encode(text, &mut out).unwrap();
            let restored = numeric::decode(&out[..]).unwrap();
            // Trailing zeros inside dscale are preserved by the scale field.
            assert_eq!(restored, *text, "round trip for {}", text);
        }
    }

    #[test]
    fn numeric_rejects_garbage() {
        let mut out = BytesMut::new();
        assert!(numeric::encode("12a4", &mut out).is_err());
        assert!(numeric::encode("", &mut out).is_err());
    }
}
