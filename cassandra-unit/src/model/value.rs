//! Typed values of the legacy dataset format
//!
//! Every key, column name and column value in a legacy dataset is written as a
//! string. It is interpreted with the type declared for its position unless it
//! names a type explicitly with a function such as `utf8(hello)` or
//! `long(12)`. `BytesType` literals are hexadecimal. Composite values separate
//! their components with `:` (`\:` for a literal colon).

use std::fmt;

use crate::error::{Error, Result};
use crate::model::comparator::{
    decode_composite, encode_composite, ComparatorType, MarshalType,
};

/// An encoded value together with the type declared for its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    declared: ComparatorType,
    /// Type each component was actually encoded with
    encoded: Vec<MarshalType>,
    bytes: Vec<u8>,
}

impl Value {
    /// Bytes encoded with the declared type itself
    pub fn new(declared: ComparatorType, bytes: Vec<u8>) -> Self {
        let encoded = declared
            .components()
            .iter()
            .map(|component| component.marshal().unwrap_or(MarshalType::Bytes))
            .collect();
        Self {
            declared,
            encoded,
            bytes,
        }
    }

    /// Parse a dataset literal for a position declared with `declared`
    pub fn parse(raw: &str, declared: &ComparatorType) -> Result<Self> {
        let (encoded, bytes) = match declared {
            ComparatorType::Simple { marshal, .. } => {
                let (marshal, bytes) = encode_literal(raw, *marshal)?;
                (vec![marshal], bytes)
            }
            ComparatorType::Composite(components) => {
                let parts = split_composite(raw);
                if parts.len() > components.len() {
                    return Err(Error::data_set(format!(
                        "composite value '{}' has {} components but {} declares {}",
                        raw,
                        parts.len(),
                        declared,
                        components.len()
                    )));
                }
                let (encoded, parts): (Vec<MarshalType>, Vec<Vec<u8>>) = parts
                    .iter()
                    .zip(components)
                    .map(|(part, component)| {
                        let marshal = component.marshal().unwrap_or(MarshalType::Bytes);
                        encode_literal(part, marshal)
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .unzip();
                (encoded, encode_composite(&parts)?)
            }
        };
        Ok(Self {
            declared: declared.clone(),
            encoded,
            bytes,
        })
    }

    pub fn declared(&self) -> &ComparatorType {
        &self.declared
    }

    /// Types the components were encoded with; differs from the declared
    /// type where the literal used a function such as `long(12)`
    pub fn encoded_types(&self) -> &[MarshalType] {
        &self.encoded
    }

    /// Type of a simple value's bytes
    pub fn encoded_type(&self) -> MarshalType {
        self.encoded.first().copied().unwrap_or(MarshalType::Bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Components of a composite value, or the value itself
    pub fn components(&self) -> Vec<&[u8]> {
        match self.declared {
            ComparatorType::Composite(_) => decode_composite(&self.bytes),
            ComparatorType::Simple { .. } => vec![self.bytes.as_slice()],
        }
    }

    /// Interpret the bytes as a 64-bit counter or long
    pub fn as_i64(&self) -> Option<i64> {
        <[u8; 8]>::try_from(self.bytes.as_slice())
            .ok()
            .map(i64::from_be_bytes)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.declared, hex::encode(&self.bytes))
    }
}

/// Encode one literal, honouring an explicit `type(...)` function
fn encode_literal(raw: &str, declared: MarshalType) -> Result<(MarshalType, Vec<u8>)> {
    let (marshal, literal) = match explicit_function(raw) {
        Some((marshal, inner)) => (marshal, inner),
        None => (declared, raw),
    };
    Ok((marshal, encode_as(literal, marshal)?))
}

fn explicit_function(raw: &str) -> Option<(MarshalType, &str)> {
    let open = raw.find('(')?;
    let inner = raw.strip_suffix(')')?.get(open + 1..)?;
    let name = &raw[..open];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    MarshalType::from_function(name).map(|marshal| (marshal, inner))
}

fn encode_as(literal: &str, marshal: MarshalType) -> Result<Vec<u8>> {
    let invalid = |reason: String| {
        Error::data_set(format!(
            "invalid {} value '{}': {}",
            marshal.short_name(),
            literal,
            reason
        ))
    };
    match marshal {
        MarshalType::Bytes => {
            let digits = literal.strip_prefix("0x").unwrap_or(literal);
            hex::decode(digits).map_err(|e| invalid(e.to_string()))
        }
        MarshalType::Ascii => {
            if literal.is_ascii() {
                Ok(literal.as_bytes().to_vec())
            } else {
                Err(invalid("non-ascii characters".to_string()))
            }
        }
        MarshalType::Utf8 => Ok(literal.as_bytes().to_vec()),
        MarshalType::Long | MarshalType::Counter => literal
            .trim()
            .parse::<i64>()
            .map(|v| v.to_be_bytes().to_vec())
            .map_err(|e| invalid(e.to_string())),
        MarshalType::Int32 => literal
            .trim()
            .parse::<i32>()
            .map(|v| v.to_be_bytes().to_vec())
            .map_err(|e| invalid(e.to_string())),
        MarshalType::Integer => literal
            .trim()
            .parse::<i128>()
            .map(i128_to_varint)
            .map_err(|e| invalid(e.to_string())),
        MarshalType::Boolean => match literal.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(vec![1]),
            "false" => Ok(vec![0]),
            _ => Err(invalid("expected true or false".to_string())),
        },
        MarshalType::Uuid | MarshalType::LexicalUuid | MarshalType::TimeUuid => {
            let uuid = uuid::Uuid::parse_str(literal.trim()).map_err(|e| invalid(e.to_string()))?;
            if marshal == MarshalType::TimeUuid && uuid.get_version_num() != 1 {
                return Err(invalid("not a version 1 uuid".to_string()));
            }
            Ok(uuid.as_bytes().to_vec())
        }
    }
}

fn split_composite(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&':') => {
                current.push(':');
                chars.next();
            }
            ':' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Minimal two's complement big-endian encoding
pub(crate) fn i128_to_varint(value: i128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let (current, next) = (bytes[start], bytes[start + 1]);
        let redundant = (current == 0x00 && next & 0x80 == 0) || (current == 0xff && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::comparator::varint_to_i128;

    fn simple(marshal: MarshalType) -> ComparatorType {
        ComparatorType::simple(marshal)
    }

    #[test]
    fn test_bytes_are_hex() {
        let value = Value::parse("1110", &simple(MarshalType::Bytes)).unwrap();
        assert_eq!(value.bytes(), &[0x11, 0x10]);
        assert!(Value::parse("zz", &simple(MarshalType::Bytes)).is_err());
    }

    #[test]
    fn test_declared_type_drives_encoding() {
        let value = Value::parse("19652258", &simple(MarshalType::Long)).unwrap();
        assert_eq!(value.as_i64(), Some(19652258));

        let value = Value::parse("name11", &simple(MarshalType::Utf8)).unwrap();
        assert_eq!(value.bytes(), b"name11");

        let value = Value::parse("11", &simple(MarshalType::Int32)).unwrap();
        assert_eq!(value.bytes(), &11i32.to_be_bytes());
    }

    #[test]
    fn test_explicit_function_overrides_declared_type() {
        let value = Value::parse("utf8(hello world!)", &simple(MarshalType::Bytes)).unwrap();
        assert_eq!(value.bytes(), b"hello world!");
        assert_eq!(value.declared(), &simple(MarshalType::Bytes));
        assert_eq!(value.encoded_type(), MarshalType::Utf8);

        let value = Value::parse("long(12)", &simple(MarshalType::Utf8)).unwrap();
        assert_eq!(value.as_i64(), Some(12));
        assert_eq!(value.encoded_type(), MarshalType::Long);

        let value = Value::parse("plain", &simple(MarshalType::Utf8)).unwrap();
        assert_eq!(value.encoded_type(), MarshalType::Utf8);

        let value = Value::parse("bytes(68656c6c6f)", &simple(MarshalType::Utf8)).unwrap();
        assert_eq!(value.bytes(), b"hello");
    }

    #[test]
    fn test_parentheses_without_known_function_are_literal() {
        let value = Value::parse("call(me)", &simple(MarshalType::Utf8)).unwrap();
        assert_eq!(value.bytes(), b"call(me)");
    }

    #[test]
    fn test_uuid_values() {
        let raw = "13816710-1dd2-11b2-879a-782bcb80ff6a";
        let value = Value::parse(raw, &simple(MarshalType::TimeUuid)).unwrap();
        assert_eq!(value.bytes(), uuid::Uuid::parse_str(raw).unwrap().as_bytes());

        let random = "6f7e9b4e-1a6a-4c0e-9a58-6d6c2f1d2b31";
        assert!(Value::parse(random, &simple(MarshalType::TimeUuid)).is_err());
        assert!(Value::parse(random, &simple(MarshalType::Uuid)).is_ok());
    }

    #[test]
    fn test_integer_minimal_encoding() {
        assert_eq!(i128_to_varint(0), vec![0x00]);
        assert_eq!(i128_to_varint(127), vec![0x7f]);
        assert_eq!(i128_to_varint(128), vec![0x00, 0x80]);
        assert_eq!(i128_to_varint(-1), vec![0xff]);
        assert_eq!(i128_to_varint(-129), vec![0xff, 0x7f]);
        assert_eq!(varint_to_i128(&i128_to_varint(-129)), Some(-129));
    }

    #[test]
    fn test_composite_values() {
        let declared = ComparatorType::parse("CompositeType(LongType,UTF8Type)").unwrap();
        let value = Value::parse("12:a\\:b", &declared).unwrap();
        assert_eq!(value.components(), vec![&12i64.to_be_bytes()[..], &b"a:b"[..]]);
        assert_eq!(value.encoded_types(), &[MarshalType::Long, MarshalType::Utf8]);

        let value = Value::parse("12:bytes(ff)", &declared).unwrap();
        assert_eq!(value.encoded_types(), &[MarshalType::Long, MarshalType::Bytes]);

        assert!(Value::parse("1:a:b", &declared).is_err());
    }

    #[test]
    fn test_boolean_and_ascii() {
        assert_eq!(Value::parse("TRUE", &simple(MarshalType::Boolean)).unwrap().bytes(), &[1]);
        assert!(Value::parse("maybe", &simple(MarshalType::Boolean)).is_err());
        assert!(Value::parse("héllo", &simple(MarshalType::Ascii)).is_err());
    }
}
