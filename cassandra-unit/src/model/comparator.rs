//! Comparator and validator types
//!
//! A comparator names the marshal type of a column family position (row key,
//! column name, sub column name, column value) and defines both the byte
//! encoding of values in that position and their sort order. Types are written
//! in dataset files the way Cassandra names them: `UTF8Type`,
//! `org.apache.cassandra.db.marshal.LongType`, `UTF8Type(reversed=true)`,
//! `ReversedType(LongType)` or `CompositeType(LongType,UTF8Type)`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_res, opt},
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::error::{Error, Result};

const MARSHAL_PACKAGE: &str = "org.apache.cassandra.db.marshal.";

/// Base marshal types understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarshalType {
    Bytes,
    Ascii,
    Utf8,
    Long,
    Int32,
    Integer,
    Boolean,
    Uuid,
    TimeUuid,
    LexicalUuid,
    Counter,
}

impl MarshalType {
    pub const ALL: [MarshalType; 11] = [
        MarshalType::Bytes,
        MarshalType::Ascii,
        MarshalType::Utf8,
        MarshalType::Long,
        MarshalType::Int32,
        MarshalType::Integer,
        MarshalType::Boolean,
        MarshalType::Uuid,
        MarshalType::TimeUuid,
        MarshalType::LexicalUuid,
        MarshalType::Counter,
    ];

    /// Cassandra short type name, e.g. `UTF8Type`
    pub fn short_name(self) -> &'static str {
        match self {
            MarshalType::Bytes => "BytesType",
            MarshalType::Ascii => "AsciiType",
            MarshalType::Utf8 => "UTF8Type",
            MarshalType::Long => "LongType",
            MarshalType::Int32 => "Int32Type",
            MarshalType::Integer => "IntegerType",
            MarshalType::Boolean => "BooleanType",
            MarshalType::Uuid => "UUIDType",
            MarshalType::TimeUuid => "TimeUUIDType",
            MarshalType::LexicalUuid => "LexicalUUIDType",
            MarshalType::Counter => "CounterColumnType",
        }
    }

    /// Fully qualified Cassandra class name
    pub fn class_name(self) -> String {
        format!("{}{}", MARSHAL_PACKAGE, self.short_name())
    }

    /// Name of the value function selecting this type in dataset files, e.g. `utf8(...)`
    pub fn function_name(self) -> &'static str {
        match self {
            MarshalType::Bytes => "bytes",
            MarshalType::Ascii => "ascii",
            MarshalType::Utf8 => "utf8",
            MarshalType::Long => "long",
            MarshalType::Int32 => "int",
            MarshalType::Integer => "integer",
            MarshalType::Boolean => "boolean",
            MarshalType::Uuid => "uuid",
            MarshalType::TimeUuid => "timeuuid",
            MarshalType::LexicalUuid => "lexicaluuid",
            MarshalType::Counter => "counter",
        }
    }

    /// CQL type used when the legacy model is expressed as a CQL table
    pub fn cql_type(self) -> &'static str {
        match self {
            MarshalType::Bytes => "blob",
            MarshalType::Ascii => "ascii",
            MarshalType::Utf8 => "text",
            MarshalType::Long => "bigint",
            MarshalType::Int32 => "int",
            MarshalType::Integer => "varint",
            MarshalType::Boolean => "boolean",
            MarshalType::Uuid | MarshalType::LexicalUuid => "uuid",
            MarshalType::TimeUuid => "timeuuid",
            MarshalType::Counter => "counter",
        }
    }

    /// Look up a type by short or qualified name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.strip_prefix(MARSHAL_PACKAGE).unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|t| t.short_name().eq_ignore_ascii_case(short))
    }

    /// Look up a type by value function name
    pub fn from_function(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.function_name().eq_ignore_ascii_case(name))
    }

    fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        if a.is_empty() || b.is_empty() {
            return a.len().cmp(&b.len());
        }
        match self {
            MarshalType::Long | MarshalType::Counter => {
                match (<[u8; 8]>::try_from(a), <[u8; 8]>::try_from(b)) {
                    (Ok(x), Ok(y)) => i64::from_be_bytes(x).cmp(&i64::from_be_bytes(y)),
                    _ => a.cmp(b),
                }
            }
            MarshalType::Int32 => match (<[u8; 4]>::try_from(a), <[u8; 4]>::try_from(b)) {
                (Ok(x), Ok(y)) => i32::from_be_bytes(x).cmp(&i32::from_be_bytes(y)),
                _ => a.cmp(b),
            },
            MarshalType::Integer => match (varint_to_i128(a), varint_to_i128(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.cmp(b),
            },
            MarshalType::TimeUuid => compare_time_uuid(a, b),
            MarshalType::Uuid => {
                if uuid_version(a) == Some(1) && uuid_version(b) == Some(1) {
                    compare_time_uuid(a, b)
                } else {
                    a.cmp(b)
                }
            }
            MarshalType::LexicalUuid => compare_signed_halves(a, b),
            MarshalType::Bytes | MarshalType::Ascii | MarshalType::Utf8 | MarshalType::Boolean => {
                a.cmp(b)
            }
        }
    }
}

/// A comparator or validator declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparatorType {
    Simple { marshal: MarshalType, reversed: bool },
    Composite(Vec<ComparatorType>),
}

impl Default for ComparatorType {
    fn default() -> Self {
        ComparatorType::simple(MarshalType::Bytes)
    }
}

impl ComparatorType {
    pub fn simple(marshal: MarshalType) -> Self {
        ComparatorType::Simple {
            marshal,
            reversed: false,
        }
    }

    pub fn reversed(marshal: MarshalType) -> Self {
        ComparatorType::Simple {
            marshal,
            reversed: true,
        }
    }

    /// Parse a type expression as written in dataset files
    pub fn parse(input: &str) -> Result<Self> {
        match all_consuming(delimited(multispace0, type_expr, multispace0))(input) {
            Ok((_, comparator)) => Ok(comparator),
            Err(_) => Err(Error::data_set(format!("unknown comparator type '{}'", input))),
        }
    }

    pub fn marshal(&self) -> Option<MarshalType> {
        match self {
            ComparatorType::Simple { marshal, .. } => Some(*marshal),
            ComparatorType::Composite(_) => None,
        }
    }

    pub fn is_reversed(&self) -> bool {
        matches!(self, ComparatorType::Simple { reversed: true, .. })
    }

    pub fn is_counter(&self) -> bool {
        self.marshal() == Some(MarshalType::Counter)
    }

    pub fn components(&self) -> &[ComparatorType] {
        match self {
            ComparatorType::Composite(components) => components,
            ComparatorType::Simple { .. } => std::slice::from_ref(self),
        }
    }

    /// Fully qualified class name, as Cassandra reports it
    pub fn class_name(&self) -> String {
        match self {
            ComparatorType::Simple { marshal, reversed: false } => marshal.class_name(),
            ComparatorType::Simple { marshal, reversed: true } => {
                format!("{}ReversedType({})", MARSHAL_PACKAGE, marshal.class_name())
            }
            ComparatorType::Composite(components) => {
                let inner: Vec<String> = components.iter().map(|c| c.class_name()).collect();
                format!("{}CompositeType({})", MARSHAL_PACKAGE, inner.join(","))
            }
        }
    }

    /// Order two encoded values of this type
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            ComparatorType::Simple { marshal, reversed } => {
                let ordering = marshal.compare(a, b);
                if *reversed {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            ComparatorType::Composite(components) => {
                let left = decode_composite(a);
                let right = decode_composite(b);
                for (i, comparator) in components.iter().enumerate() {
                    match (left.get(i), right.get(i)) {
                        (Some(x), Some(y)) => match comparator.compare(x, y) {
                            Ordering::Equal => continue,
                            other => return other,
                        },
                        (None, None) => return Ordering::Equal,
                        (None, Some(_)) => return Ordering::Less,
                        (Some(_), None) => return Ordering::Greater,
                    }
                }
                left.len().cmp(&right.len())
            }
        }
    }
}

impl fmt::Display for ComparatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparatorType::Simple { marshal, reversed: false } => write!(f, "{}", marshal.short_name()),
            ComparatorType::Simple { marshal, reversed: true } => {
                write!(f, "{}(reversed=true)", marshal.short_name())
            }
            ComparatorType::Composite(components) => {
                let inner: Vec<String> = components.iter().map(|c| c.to_string()).collect();
                write!(f, "CompositeType({})", inner.join(","))
            }
        }
    }
}

impl FromStr for ComparatorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ComparatorType::parse(s)
    }
}

fn type_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '.' || c == '_')(input)
}

fn marshal_type(input: &str) -> IResult<&str, MarshalType> {
    map_res(type_name, |name| MarshalType::from_name(name).ok_or(()))(input)
}

/// `(reversed=true)` suffix
fn reversed_flag(input: &str) -> IResult<&str, bool> {
    delimited(
        tuple((char('('), multispace0, tag_no_case("reversed"), multispace0, char('='), multispace0)),
        alt((map(tag_no_case("true"), |_| true), map(tag_no_case("false"), |_| false))),
        tuple((multispace0, char(')'))),
    )(input)
}

/// `ReversedType(LongType)`
fn reversed_type(input: &str) -> IResult<&str, ComparatorType> {
    map(
        preceded(
            tuple((opt(tag(MARSHAL_PACKAGE)), tag("ReversedType"))),
            delimited(
                tuple((char('('), multispace0)),
                marshal_type,
                tuple((multispace0, char(')'))),
            ),
        ),
        ComparatorType::reversed,
    )(input)
}

fn simple_type(input: &str) -> IResult<&str, ComparatorType> {
    alt((
        reversed_type,
        map(tuple((marshal_type, opt(reversed_flag))), |(marshal, reversed)| {
            ComparatorType::Simple {
                marshal,
                reversed: reversed.unwrap_or(false),
            }
        }),
    ))(input)
}

fn composite_type(input: &str) -> IResult<&str, ComparatorType> {
    map(
        preceded(
            tuple((opt(tag(MARSHAL_PACKAGE)), tag("CompositeType"))),
            delimited(
                tuple((char('('), multispace0)),
                separated_list1(tuple((multispace0, char(','), multispace0)), simple_type),
                tuple((multispace0, char(')'))),
            ),
        ),
        ComparatorType::Composite,
    )(input)
}

fn type_expr(input: &str) -> IResult<&str, ComparatorType> {
    alt((composite_type, simple_type))(input)
}

/// Encode composite components: `<u16 length><bytes><end-of-component>` each
pub(crate) fn encode_composite(components: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for component in components {
        let len = u16::try_from(component.len()).map_err(|_| {
            Error::data_set(format!(
                "composite component of {} bytes exceeds the {} byte limit",
                component.len(),
                u16::MAX
            ))
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(component);
        out.push(0);
    }
    Ok(out)
}

pub(crate) fn decode_composite(bytes: &[u8]) -> Vec<&[u8]> {
    let mut components = Vec::new();
    let mut rest = bytes;
    while rest.len() >= 2 {
        let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        if rest.len() < 2 + len {
            break;
        }
        components.push(&rest[2..2 + len]);
        rest = &rest[(2 + len + 1).min(rest.len())..];
    }
    components
}

/// Two's complement big-endian integer of up to 16 bytes
pub(crate) fn varint_to_i128(bytes: &[u8]) -> Option<i128> {
    if bytes.is_empty() || bytes.len() > 16 {
        return None;
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Some(i128::from_be_bytes(buf))
}

fn uuid_version(bytes: &[u8]) -> Option<u8> {
    (bytes.len() == 16).then(|| bytes[6] >> 4)
}

/// 60-bit timestamp of a version 1 UUID
fn uuid_timestamp(bytes: &[u8]) -> Option<u64> {
    if bytes.len() != 16 {
        return None;
    }
    let time_low = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;
    let time_mid = u16::from_be_bytes([bytes[4], bytes[5]]) as u64;
    let time_hi = (u16::from_be_bytes([bytes[6], bytes[7]]) & 0x0fff) as u64;
    Some((time_hi << 48) | (time_mid << 32) | time_low)
}

fn compare_time_uuid(a: &[u8], b: &[u8]) -> Ordering {
    match (uuid_timestamp(a), uuid_timestamp(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| compare_signed_halves(a, b)),
        _ => a.cmp(b),
    }
}

/// Most significant then least significant 64 bits, both signed
fn compare_signed_halves(a: &[u8], b: &[u8]) -> Ordering {
    match (<[u8; 16]>::try_from(a), <[u8; 16]>::try_from(b)) {
        (Ok(x), Ok(y)) => {
            let split = |v: [u8; 16]| {
                let (hi, lo) = v.split_at(8);
                (
                    i64::from_be_bytes(hi.try_into().unwrap_or_default()),
                    i64::from_be_bytes(lo.try_into().unwrap_or_default()),
                )
            };
            split(x).cmp(&split(y))
        }
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_qualified_names() {
        assert_eq!(
            ComparatorType::parse("UTF8Type").unwrap(),
            ComparatorType::simple(MarshalType::Utf8)
        );
        assert_eq!(
            ComparatorType::parse("org.apache.cassandra.db.marshal.TimeUUIDType").unwrap(),
            ComparatorType::simple(MarshalType::TimeUuid)
        );
        assert_eq!(
            ComparatorType::parse(" longtype ").unwrap(),
            ComparatorType::simple(MarshalType::Long)
        );
    }

    #[test]
    fn test_parse_reversed_forms() {
        let expected = ComparatorType::reversed(MarshalType::Utf8);
        assert_eq!(ComparatorType::parse("UTF8Type(reversed=true)").unwrap(), expected);
        assert_eq!(ComparatorType::parse("ReversedType(UTF8Type)").unwrap(), expected);
        assert_eq!(
            ComparatorType::parse("UTF8Type(reversed=false)").unwrap(),
            ComparatorType::simple(MarshalType::Utf8)
        );
    }

    #[test]
    fn test_parse_composite() {
        let parsed = ComparatorType::parse("CompositeType(LongType, UTF8Type(reversed=true))").unwrap();
        assert_eq!(
            parsed,
            ComparatorType::Composite(vec![
                ComparatorType::simple(MarshalType::Long),
                ComparatorType::reversed(MarshalType::Utf8),
            ])
        );
        assert_eq!(parsed.to_string(), "CompositeType(LongType,UTF8Type(reversed=true))");
        assert_eq!(parsed.components().len(), 2);
    }

    #[test]
    fn test_parse_unknown_type() {
        assert!(ComparatorType::parse("DoubleDecimalType").is_err());
        assert!(ComparatorType::parse("UTF8Type(").is_err());
        assert!(ComparatorType::parse("").is_err());
    }

    #[test]
    fn test_class_names() {
        assert_eq!(
            ComparatorType::simple(MarshalType::Long).class_name(),
            "org.apache.cassandra.db.marshal.LongType"
        );
        assert_eq!(
            ComparatorType::reversed(MarshalType::Utf8).class_name(),
            "org.apache.cassandra.db.marshal.ReversedType(org.apache.cassandra.db.marshal.UTF8Type)"
        );
    }

    #[test]
    fn test_long_ordering_is_signed() {
        let long = ComparatorType::simple(MarshalType::Long);
        let minus_one = (-1i64).to_be_bytes();
        let two = 2i64.to_be_bytes();
        assert_eq!(long.compare(&minus_one, &two), Ordering::Less);
        // unsigned byte order would say the opposite
        assert_eq!(minus_one.as_slice().cmp(two.as_slice()), Ordering::Greater);
    }

    #[test]
    fn test_reversed_ordering() {
        let reversed = ComparatorType::reversed(MarshalType::Utf8);
        assert_eq!(reversed.compare(b"a", b"b"), Ordering::Greater);
    }

    #[test]
    fn test_varint_ordering() {
        let integer = ComparatorType::simple(MarshalType::Integer);
        assert_eq!(integer.compare(&[0xff], &[0x01]), Ordering::Less);
        assert_eq!(integer.compare(&[0x01, 0x00], &[0x7f]), Ordering::Greater);
        assert_eq!(varint_to_i128(&[0xff, 0x00]), Some(-256));
    }

    #[test]
    fn test_time_uuid_ordering_uses_timestamp() {
        let earlier = uuid::Uuid::parse_str("13816710-1dd2-11b2-879a-782bcb80ff6a").unwrap();
        let later = uuid::Uuid::parse_str("13818e20-1dd2-11b2-879a-782bcb80ff6a").unwrap();
        let time_uuid = ComparatorType::simple(MarshalType::TimeUuid);
        assert_eq!(
            time_uuid.compare(earlier.as_bytes(), later.as_bytes()),
            Ordering::Less
        );
    }

    #[test]
    fn test_composite_roundtrip_and_ordering() {
        let encoded = encode_composite(&[1i64.to_be_bytes().to_vec(), b"b".to_vec()]).unwrap();
        assert_eq!(decode_composite(&encoded), vec![&1i64.to_be_bytes()[..], &b"b"[..]]);

        let composite = ComparatorType::Composite(vec![
            ComparatorType::simple(MarshalType::Long),
            ComparatorType::reversed(MarshalType::Utf8),
        ]);
        let a = encode_composite(&[1i64.to_be_bytes().to_vec(), b"a".to_vec()]).unwrap();
        let b = encode_composite(&[1i64.to_be_bytes().to_vec(), b"b".to_vec()]).unwrap();
        let c = encode_composite(&[2i64.to_be_bytes().to_vec(), b"a".to_vec()]).unwrap();
        assert_eq!(composite.compare(&a, &b), Ordering::Greater);
        assert_eq!(composite.compare(&b, &c), Ordering::Less);
    }

    #[test]
    fn test_composite_component_length_is_bounded() {
        let largest = vec![b'x'; u16::MAX as usize];
        assert!(encode_composite(&[largest]).is_ok());

        let oversized = vec![b'x'; u16::MAX as usize + 1];
        assert!(matches!(
            encode_composite(&[b"a".to_vec(), oversized]),
            Err(Error::DataSet(_))
        ));
    }

    #[test]
    fn test_empty_values_sort_first() {
        let utf8 = ComparatorType::simple(MarshalType::Utf8);
        assert_eq!(utf8.compare(b"", b"a"), Ordering::Less);
    }
}
