//! ArrayBuffer blocks and the byte-level codecs shared by DataView and the
//! typed arrays. Encoding goes through a fixed 8-byte scratch area; NaN
//! payloads are canonicalised to one bit pattern per float width and
//! endianness.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    agent::Agent,
    completion::JsResult,
    intrinsics::error::ErrorKind,
    object::ObjectData,
    value::{ObjectId, Value},
};

/// Element types of the integer-indexed views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementType {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl ElementType {
    pub const COUNT: usize = 11;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Int8,
        Self::Uint8,
        Self::Uint8Clamped,
        Self::Int16,
        Self::Uint16,
        Self::Int32,
        Self::Uint32,
        Self::Float32,
        Self::Float64,
        Self::BigInt64,
        Self::BigUint64,
    ];

    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 | Self::Uint8Clamped => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 | Self::BigInt64 | Self::BigUint64 => 8,
        }
    }

    pub fn is_bigint(self) -> bool {
        matches!(self, Self::BigInt64 | Self::BigUint64)
    }

    pub fn constructor_name(self) -> &'static str {
        match self {
            Self::Int8 => "Int8Array",
            Self::Uint8 => "Uint8Array",
            Self::Uint8Clamped => "Uint8ClampedArray",
            Self::Int16 => "Int16Array",
            Self::Uint16 => "Uint16Array",
            Self::Int32 => "Int32Array",
            Self::Uint32 => "Uint32Array",
            Self::Float32 => "Float32Array",
            Self::Float64 => "Float64Array",
            Self::BigInt64 => "BigInt64Array",
            Self::BigUint64 => "BigUint64Array",
        }
    }
}

/// The slots of an ArrayBuffer (or SharedArrayBuffer, distinguished by
/// `shared`). Detachment nulls the block; shared blocks cannot detach.
#[derive(Debug)]
pub(crate) struct ArrayBufferData {
    pub block: Option<Vec<u8>>,
    pub shared: bool,
}

/// The slots of a DataView.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DataViewData {
    pub buffer: ObjectId,
    pub byte_offset: usize,
    pub byte_length: usize,
}

pub(crate) fn allocate_array_buffer(agent: &mut Agent, byte_length: usize, shared: bool) -> ObjectId {
    let realm = agent.current_realm_id();
    let prototype = if shared {
        agent.intrinsics().shared_array_buffer_prototype
    } else {
        agent.intrinsics().array_buffer_prototype
    };
    let record = crate::object::ObjectRecord::new(
        Some(prototype),
        ObjectData::ArrayBuffer(ArrayBufferData { block: Some(vec![0; byte_length]), shared }),
        realm,
    );
    agent.heap.alloc_object(record)
}

fn buffer_data(agent: &Agent, buffer: ObjectId) -> &ArrayBufferData {
    match &agent.heap.object(buffer).data {
        ObjectData::ArrayBuffer(data) => data,
        _ => unreachable!("buffer operation on a non-buffer"),
    }
}

pub(crate) fn is_detached(agent: &Agent, buffer: ObjectId) -> bool {
    buffer_data(agent, buffer).block.is_none()
}

pub(crate) fn buffer_byte_length(agent: &Agent, buffer: ObjectId) -> usize {
    buffer_data(agent, buffer).block.as_ref().map_or(0, Vec::len)
}

/// `DetachArrayBuffer`.
pub(crate) fn detach_array_buffer(agent: &mut Agent, buffer: ObjectId) -> JsResult<()> {
    if buffer_data(agent, buffer).shared {
        return Err(agent.throw_error(ErrorKind::Type, "cannot detach a shared buffer"));
    }
    if let ObjectData::ArrayBuffer(data) = &mut agent.heap.object_mut(buffer).data {
        data.block = None;
    }
    Ok(())
}

// Canonical quiet-NaN encodings, little-endian byte order.
const F32_NAN_LE: [u8; 4] = [0x00, 0x00, 0xC0, 0x7F];
const F64_NAN_LE: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF8, 0x7F];

fn to_int_n(n: f64, bits: u32) -> u64 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulus = 2f64.powi(bits as i32);
    let m = n.trunc().rem_euclid(modulus);
    m as u64
}

/// `Uint8Clamped` conversion: clamp to [0, 255] with ties rounding to even.
pub(crate) fn clamp_uint8(n: f64) -> u8 {
    if n.is_nan() {
        return 0;
    }
    if n <= 0.0 {
        return 0;
    }
    if n >= 255.0 {
        return 255;
    }
    let floor = n.floor();
    let diff = n - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as u8
}

fn bigint_to_u64_wrapping(value: &BigInt) -> u64 {
    let modulus = BigInt::from(u64::MAX) + BigInt::from(1u8);
    let m = ((value % &modulus) + &modulus) % &modulus;
    m.to_u64().expect("value reduced modulo 2^64")
}

/// `NumericToRawBytes` into the scratch area; returns the byte count.
fn numeric_to_raw_bytes(
    agent: &Agent,
    element: ElementType,
    value: Value,
    is_little_endian: bool,
    scratch: &mut [u8; 8],
) -> usize {
    let size = element.size();
    match element {
        ElementType::Float32 => {
            let n = as_number(value);
            let bytes = if n.is_nan() { F32_NAN_LE } else { (n as f32).to_le_bytes() };
            scratch[..4].copy_from_slice(&bytes);
        }
        ElementType::Float64 => {
            let n = as_number(value);
            let bytes = if n.is_nan() { F64_NAN_LE } else { n.to_le_bytes() };
            scratch[..8].copy_from_slice(&bytes);
        }
        ElementType::Uint8Clamped => {
            scratch[0] = clamp_uint8(as_number(value));
        }
        ElementType::BigInt64 | ElementType::BigUint64 => {
            let Value::BigInt(id) = value else {
                unreachable!("bigint element written with a non-bigint value");
            };
            let raw = bigint_to_u64_wrapping(agent.heap.bigint(id));
            scratch[..8].copy_from_slice(&raw.to_le_bytes());
        }
        _ => {
            let raw = to_int_n(as_number(value), (size * 8) as u32);
            scratch[..size].copy_from_slice(&raw.to_le_bytes()[..size]);
        }
    }
    if !is_little_endian {
        scratch[..size].reverse();
    }
    size
}

fn as_number(value: Value) -> f64 {
    match value {
        Value::Number(n) => n,
        _ => unreachable!("numeric element written with a non-number value"),
    }
}

/// `GetValueFromBuffer`. The caller has checked attachment and bounds.
pub(crate) fn get_value_from_buffer(
    agent: &mut Agent,
    buffer: ObjectId,
    byte_index: usize,
    element: ElementType,
    is_little_endian: bool,
) -> Value {
    let size = element.size();
    let mut scratch = [0u8; 8];
    {
        let data = buffer_data(agent, buffer);
        let block = data.block.as_ref().expect("buffer checked for detachment");
        scratch[..size].copy_from_slice(&block[byte_index..byte_index + size]);
    }
    if !is_little_endian {
        scratch[..size].reverse();
    }
    match element {
        ElementType::Int8 => Value::Number(f64::from(scratch[0] as i8)),
        ElementType::Uint8 | ElementType::Uint8Clamped => Value::Number(f64::from(scratch[0])),
        ElementType::Int16 => Value::Number(f64::from(i16::from_le_bytes([scratch[0], scratch[1]]))),
        ElementType::Uint16 => Value::Number(f64::from(u16::from_le_bytes([scratch[0], scratch[1]]))),
        ElementType::Int32 => {
            Value::Number(f64::from(i32::from_le_bytes([scratch[0], scratch[1], scratch[2], scratch[3]])))
        }
        ElementType::Uint32 => {
            Value::Number(f64::from(u32::from_le_bytes([scratch[0], scratch[1], scratch[2], scratch[3]])))
        }
        ElementType::Float32 => {
            Value::Number(f64::from(f32::from_le_bytes([scratch[0], scratch[1], scratch[2], scratch[3]])))
        }
        ElementType::Float64 => Value::Number(f64::from_le_bytes(scratch)),
        ElementType::BigInt64 => {
            let raw = i64::from_le_bytes(scratch);
            Value::BigInt(agent.heap.intern_bigint(BigInt::from(raw)))
        }
        ElementType::BigUint64 => {
            let raw = u64::from_le_bytes(scratch);
            Value::BigInt(agent.heap.intern_bigint(BigInt::from(raw)))
        }
    }
}

/// `SetValueInBuffer`. The caller has checked attachment, bounds, and
/// converted `value` to the element's numeric kind.
pub(crate) fn set_value_in_buffer(
    agent: &mut Agent,
    buffer: ObjectId,
    byte_index: usize,
    element: ElementType,
    value: Value,
    is_little_endian: bool,
) -> JsResult<()> {
    let mut scratch = [0u8; 8];
    let size = numeric_to_raw_bytes(agent, element, value, is_little_endian, &mut scratch);
    let ObjectData::ArrayBuffer(data) = &mut agent.heap.object_mut(buffer).data else {
        return Err(crate::completion::EngineError::internal("buffer write on a non-buffer"));
    };
    let Some(block) = data.block.as_mut() else {
        return Err(crate::completion::EngineError::internal("buffer write after detach"));
    };
    block[byte_index..byte_index + size].copy_from_slice(&scratch[..size]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_uint8_rounds_ties_to_even() {
        assert_eq!(clamp_uint8(0.5), 0);
        assert_eq!(clamp_uint8(1.5), 2);
        assert_eq!(clamp_uint8(2.5), 2);
        assert_eq!(clamp_uint8(3.5), 4);
        assert_eq!(clamp_uint8(-3.0), 0);
        assert_eq!(clamp_uint8(300.0), 255);
        assert_eq!(clamp_uint8(f64::NAN), 0);
    }

    #[test]
    fn to_int_n_wraps_modulo() {
        assert_eq!(to_int_n(256.0, 8), 0);
        assert_eq!(to_int_n(-1.0, 8), 255);
        assert_eq!(to_int_n(258.5, 8), 2);
    }

    #[test]
    fn float32_nan_pattern_is_canonical() {
        let mut scratch = [0u8; 8];
        let agent = crate::agent::Agent::default();
        let n = numeric_to_raw_bytes(&agent, ElementType::Float32, Value::Number(f64::NAN), true, &mut scratch);
        assert_eq!(&scratch[..n], &F32_NAN_LE);
        let mut scratch_be = [0u8; 8];
        let n = numeric_to_raw_bytes(&agent, ElementType::Float32, Value::Number(f64::NAN), false, &mut scratch_be);
        let mut reversed = F32_NAN_LE;
        reversed.reverse();
        assert_eq!(&scratch_be[..n], &reversed);
    }

    #[test]
    fn float64_nan_pattern_is_canonical() {
        let mut scratch = [0u8; 8];
        let agent = crate::agent::Agent::default();
        numeric_to_raw_bytes(&agent, ElementType::Float64, Value::Number(f64::NAN), true, &mut scratch);
        assert_eq!(scratch, F64_NAN_LE);
    }
}
