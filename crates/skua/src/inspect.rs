//! The inspector: a canonical textual rendering of values for debug
//! output. Reads only own data; never invokes getters, traps, or
//! conversions, so inspecting a value has no observable effect.

use crate::{
    agent::Agent,
    intrinsics::promise::PromiseState,
    object::{ObjectData, PropertyEntry, PropertyKey},
    value::{ObjectId, Value},
};

const MAX_DEPTH: usize = 4;

/// Renders a value the way the debug surface prints it.
pub(crate) fn inspect(agent: &Agent, value: Value) -> String {
    let mut seen = Vec::new();
    render(agent, value, 0, &mut seen)
}

fn render(agent: &Agent, value: Value, depth: usize, seen: &mut Vec<ObjectId>) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::Null => "null".to_owned(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => crate::numeric::number_to_string(n),
        Value::BigInt(id) => format!("{}n", crate::value::bigint_to_string(agent.heap.bigint(id))),
        Value::String(id) => {
            if depth == 0 {
                agent.heap.string(id).to_rust_string()
            } else {
                format!("'{}'", agent.heap.string(id).to_rust_string())
            }
        }
        Value::Symbol(id) => match agent.heap.symbol(id).description {
            Some(desc) => format!("Symbol({})", agent.heap.string(desc)),
            None => "Symbol()".to_owned(),
        },
        Value::Object(id) => render_object(agent, id, depth, seen),
        Value::PrivateName(id) => format!("#{}", agent.heap.private_name(id).description),
    }
}

fn render_object(agent: &Agent, id: ObjectId, depth: usize, seen: &mut Vec<ObjectId>) -> String {
    if seen.contains(&id) {
        return "[Circular]".to_owned();
    }
    if depth > MAX_DEPTH {
        return "[Object]".to_owned();
    }
    seen.push(id);
    let record = agent.heap.object(id);
    let out = match &record.data {
        ObjectData::Array => render_array(agent, id, depth, seen),
        ObjectData::Error(_) => {
            // Errors render as their stack string.
            match record.entry(PropertyKey::String(agent.heap.statics.stack)) {
                Some(PropertyEntry::Data { value: Value::String(s), .. }) => {
                    agent.heap.string(*s).to_rust_string()
                }
                _ => "[Error]".to_owned(),
            }
        }
        ObjectData::Promise(data) => match &data.state {
            PromiseState::Pending { .. } => "Promise { <pending> }".to_owned(),
            PromiseState::Fulfilled(v) => {
                format!("Promise {{ {} }}", render(agent, *v, depth + 1, seen))
            }
            PromiseState::Rejected(v) => {
                format!("Promise {{ <rejected> {} }}", render(agent, *v, depth + 1, seen))
            }
        },
        ObjectData::TypedArray(data) => {
            let mut parts = Vec::new();
            // Render raw elements without going through the internal
            // methods; a detached buffer renders empty.
            for index in 0..data.length.min(32) {
                let byte = data.byte_offset + index * data.kind.size();
                if crate::buffer::is_detached(agent, data.buffer) {
                    break;
                }
                // Reading requires &mut Agent for bigint interning; for
                // the inspector the numeric kinds matter and never intern.
                parts.push(render_typed_element(agent, data.buffer, byte, data.kind));
            }
            format!("{} [ {} ]", data.kind.constructor_name(), parts.join(", "))
        }
        ObjectData::Proxy(_) => "[Proxy]".to_owned(),
        ObjectData::ModuleNamespace(_) => "[Module]".to_owned(),
        ObjectData::Generator(_) => "Object [Generator] {}".to_owned(),
        ObjectData::AsyncGenerator(_) => "Object [AsyncGenerator] {}".to_owned(),
        _ if record.is_callable() => {
            let name = match record.entry(PropertyKey::String(agent.heap.statics.name)) {
                Some(PropertyEntry::Data { value: Value::String(s), .. }) => {
                    agent.heap.string(*s).to_rust_string()
                }
                _ => String::new(),
            };
            if name.is_empty() {
                "[Function (anonymous)]".to_owned()
            } else {
                format!("[Function: {name}]")
            }
        }
        _ => render_plain(agent, id, depth, seen),
    };
    seen.pop();
    out
}

fn render_typed_element(
    agent: &Agent,
    buffer: ObjectId,
    byte_index: usize,
    kind: crate::buffer::ElementType,
) -> String {
    use crate::buffer::ElementType;
    let read = |n: usize| -> Vec<u8> {
        match &agent.heap.object(buffer).data {
            ObjectData::ArrayBuffer(data) => data
                .block
                .as_ref()
                .map(|b| b[byte_index..byte_index + n].to_vec())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    };
    match kind {
        ElementType::Int8 => (read(1)[0] as i8).to_string(),
        ElementType::Uint8 | ElementType::Uint8Clamped => read(1)[0].to_string(),
        ElementType::Int16 => i16::from_le_bytes(read(2).try_into().expect("2 bytes")).to_string(),
        ElementType::Uint16 => u16::from_le_bytes(read(2).try_into().expect("2 bytes")).to_string(),
        ElementType::Int32 => i32::from_le_bytes(read(4).try_into().expect("4 bytes")).to_string(),
        ElementType::Uint32 => u32::from_le_bytes(read(4).try_into().expect("4 bytes")).to_string(),
        ElementType::Float32 => {
            crate::numeric::number_to_string(f64::from(f32::from_le_bytes(read(4).try_into().expect("4 bytes"))))
        }
        ElementType::Float64 => {
            crate::numeric::number_to_string(f64::from_le_bytes(read(8).try_into().expect("8 bytes")))
        }
        ElementType::BigInt64 => format!("{}n", i64::from_le_bytes(read(8).try_into().expect("8 bytes"))),
        ElementType::BigUint64 => format!("{}n", u64::from_le_bytes(read(8).try_into().expect("8 bytes"))),
    }
}

fn render_array(agent: &Agent, id: ObjectId, depth: usize, seen: &mut Vec<ObjectId>) -> String {
    let record = agent.heap.object(id);
    let length = match record.entry(PropertyKey::String(agent.heap.statics.length)) {
        Some(PropertyEntry::Data { value: Value::Number(n), .. }) => *n as u64,
        _ => 0,
    };
    let mut parts = Vec::new();
    for index in 0..length.min(64) {
        let key_text = index.to_string();
        let entry = record.properties.iter().find_map(|(key, entry)| match key {
            PropertyKey::String(s) if agent.heap.string(*s).to_rust_string() == key_text => Some(entry),
            _ => None,
        });
        match entry {
            Some(PropertyEntry::Data { value, .. }) => {
                parts.push(render(agent, *value, depth + 1, seen));
            }
            Some(PropertyEntry::Accessor { .. }) => parts.push("[Getter/Setter]".to_owned()),
            None => parts.push("<empty>".to_owned()),
        }
    }
    if length > 64 {
        parts.push(format!("... {} more items", length - 64));
    }
    format!("[ {} ]", parts.join(", "))
}

fn render_plain(agent: &Agent, id: ObjectId, depth: usize, seen: &mut Vec<ObjectId>) -> String {
    let record = agent.heap.object(id);
    let mut parts = Vec::new();
    for (key, entry) in &record.properties {
        let PropertyEntry::Data { value, enumerable: true, .. } = entry else {
            continue;
        };
        parts.push(format!(
            "{}: {}",
            key.display(&agent.heap),
            render(agent, *value, depth + 1, seen)
        ));
    }
    if parts.is_empty() {
        "{}".to_owned()
    } else {
        format!("{{ {} }}", parts.join(", "))
    }
}
