use std::{cmp::Ordering, fmt};

use num_bigint::BigInt;

use crate::heap::Heap;

macro_rules! heap_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect("heap index exceeds u32"))
            }

            #[inline]
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

heap_id!(
    /// Identity of an interned string. Two equal strings always share an id,
    /// so id equality is string equality.
    StringId
);
heap_id!(
    /// Identity of a symbol. Symbols are never interned; id equality is the
    /// reference identity the language observes.
    SymbolId
);
heap_id!(
    /// Identity of an interned arbitrary-precision integer.
    BigIntId
);
heap_id!(
    /// Identity of an object record in the heap arena.
    ObjectId
);
heap_id!(
    /// Identity of a private name (`#x`). Private names compare by identity,
    /// never by description, and are not exposed to language code.
    PrivateNameId
);
heap_id!(
    /// Identity of an environment record.
    EnvId
);
heap_id!(
    /// Identity of a private environment record.
    PrivateEnvId
);

/// A language value.
///
/// Small values are stored inline; strings, symbols, bigints and objects are
/// arena ids into the [`Heap`]. The enum is `Copy`, so values can be moved
/// around freely without reference counting; reclamation is the business of a
/// tracing collector layered on the heap's `mark` capability.
///
/// The derived `PartialEq` is exactly the language's strict equality for
/// same-type operands: interned ids make string/bigint comparison structural,
/// object/symbol ids compare by identity, and `f64` equality gives the
/// required NaN and signed-zero behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(BigIntId),
    String(StringId),
    Symbol(SymbolId),
    Object(ObjectId),
    /// A private name used as a key by class machinery. Never observable as a
    /// first-class value from language code.
    PrivateName(PrivateNameId),
}

impl Value {
    /// True for `undefined` and `null`.
    #[inline]
    pub fn is_nullish(self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    #[inline]
    pub fn is_object(self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// The object id, if this value is an object.
    #[inline]
    pub(crate) fn object_id(self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(id),
            _ => None,
        }
    }

    /// The `typeof` tag for this value, except that callables report
    /// `"function"`, which requires the heap and is handled by the caller.
    pub(crate) fn type_of_non_callable(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Object(_) => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::PrivateName(_) => unreachable!("private names never reach typeof"),
        }
    }

    /// A short name for the value's type, used in error messages.
    pub(crate) fn kind_name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
            Self::PrivateName(_) => "private name",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

/// A symbol record: an optional description plus the identity its id gives it.
#[derive(Debug)]
pub(crate) struct SymbolRecord {
    pub description: Option<StringId>,
}

/// A private name record. The description is the source-text spelling
/// (without `#`), kept for error messages only.
#[derive(Debug)]
pub(crate) struct PrivateNameRecord {
    pub description: Box<str>,
}

/// A string value: a sequence of UTF-16 code units.
///
/// Not Unicode scalar values; lone surrogates are preserved, concatenated and
/// compared exactly as the language requires. Construction from Rust strings
/// re-encodes to UTF-16.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsString {
    units: Vec<u16>,
}

impl JsString {
    pub fn from_units(units: Vec<u16>) -> Self {
        Self { units }
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            units: s.encode_utf16().collect(),
        }
    }

    #[inline]
    pub fn units(&self) -> &[u16] {
        &self.units
    }

    /// Number of code units, which is what `length` reports.
    #[inline]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn code_unit_at(&self, index: usize) -> Option<u16> {
        self.units.get(index).copied()
    }

    pub fn concat(&self, other: &Self) -> Self {
        let mut units = Vec::with_capacity(self.units.len() + other.units.len());
        units.extend_from_slice(&self.units);
        units.extend_from_slice(&other.units);
        Self { units }
    }

    /// Lossy conversion for display: unpaired surrogates become U+FFFD.
    pub fn to_rust_string(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }

    /// If this string is a canonical array index (`"0"`, or a decimal string
    /// with no leading zero) whose value is below 2^32 - 1, return it.
    pub fn as_array_index(&self) -> Option<u32> {
        if self.units.is_empty() || self.units.len() > 10 {
            return None;
        }
        if self.units[0] == b'0'.into() && self.units.len() > 1 {
            return None;
        }
        let mut n: u64 = 0;
        for &u in &self.units {
            if !(u16::from(b'0')..=u16::from(b'9')).contains(&u) {
                return None;
            }
            n = n * 10 + u64::from(u - u16::from(b'0'));
        }
        // 2^32 - 1 itself is not a valid array index
        if n < u64::from(u32::MAX) { Some(n as u32) } else { None }
    }

    /// String-to-number conversion: optional whitespace, optional sign,
    /// decimal/hex/octal/binary literal or `Infinity`. Anything else is NaN.
    pub fn to_number(&self) -> f64 {
        let text = match String::from_utf16(&self.units) {
            Ok(text) => text,
            Err(_) => return f64::NAN,
        };
        let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
        if trimmed.is_empty() {
            return 0.0;
        }
        let (sign, body) = match trimmed.as_bytes()[0] {
            b'+' => (1.0, &trimmed[1..]),
            b'-' => (-1.0, &trimmed[1..]),
            _ => (1.0, trimmed),
        };
        if body == "Infinity" {
            return sign * f64::INFINITY;
        }
        // Radix prefixes are only valid without a sign.
        if sign > 0.0 && body.len() == trimmed.len() {
            if let Some(digits) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
                return radix_to_number(digits, 16);
            }
            if let Some(digits) = body.strip_prefix("0o").or_else(|| body.strip_prefix("0O")) {
                return radix_to_number(digits, 8);
            }
            if let Some(digits) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
                return radix_to_number(digits, 2);
            }
        }
        if !body.is_empty()
            && body
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        {
            body.parse::<f64>().map_or(f64::NAN, |n| sign * n)
        } else {
            f64::NAN
        }
    }
}

fn radix_to_number(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut n: f64 = 0.0;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => n = n * f64::from(radix) + f64::from(d),
            None => return f64::NAN,
        }
    }
    n
}

impl PartialOrd for JsString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JsString {
    /// Code-unit lexicographic order: the order module namespaces sort their
    /// exports in and the order the `<` operator uses on strings.
    fn cmp(&self, other: &Self) -> Ordering {
        self.units.cmp(&other.units)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rust_string())
    }
}

/// Formats a bigint the way `ToString` on a BigInt does (base 10, no suffix).
pub(crate) fn bigint_to_string(value: &BigInt) -> String {
    value.to_str_radix(10)
}

/// Resolves a heap value for display in diagnostics without invoking any
/// language-level behavior.
pub(crate) fn brief(value: Value, heap: &Heap) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::Null => "null".to_owned(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => crate::numeric::number_to_string(n),
        Value::BigInt(id) => format!("{}n", bigint_to_string(heap.bigint(id))),
        Value::String(id) => heap.string(id).to_rust_string(),
        Value::Symbol(id) => match heap.symbol(id).description {
            Some(desc) => format!("Symbol({})", heap.string(desc)),
            None => "Symbol()".to_owned(),
        },
        Value::Object(_) => "[object]".to_owned(),
        Value::PrivateName(id) => format!("#{}", heap.private_name(id).description),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_index_accepts_canonical_forms() {
        assert_eq!(JsString::from_str("0").as_array_index(), Some(0));
        assert_eq!(JsString::from_str("42").as_array_index(), Some(42));
        assert_eq!(JsString::from_str("4294967294").as_array_index(), Some(4_294_967_294));
    }

    #[test]
    fn array_index_rejects_non_canonical_forms() {
        assert_eq!(JsString::from_str("").as_array_index(), None);
        assert_eq!(JsString::from_str("01").as_array_index(), None);
        assert_eq!(JsString::from_str("-1").as_array_index(), None);
        assert_eq!(JsString::from_str("4294967295").as_array_index(), None);
        assert_eq!(JsString::from_str("1.5").as_array_index(), None);
    }

    #[test]
    fn string_to_number_handles_literals() {
        assert_eq!(JsString::from_str("  12  ").to_number(), 12.0);
        assert_eq!(JsString::from_str("").to_number(), 0.0);
        assert_eq!(JsString::from_str("0x10").to_number(), 16.0);
        assert_eq!(JsString::from_str("0b101").to_number(), 5.0);
        assert_eq!(JsString::from_str("-Infinity").to_number(), f64::NEG_INFINITY);
        assert!(JsString::from_str("12px").to_number().is_nan());
        assert!(JsString::from_str("+0x10").to_number().is_nan());
    }

    #[test]
    fn code_unit_order_is_not_scalar_order() {
        // A lone high surrogate sorts above BMP text but below U+FFFF.
        let lone = JsString::from_units(vec![0xD800]);
        let text = JsString::from_str("z");
        let max = JsString::from_units(vec![0xFFFF]);
        assert!(text < lone);
        assert!(lone < max);
    }
}
