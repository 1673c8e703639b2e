//! 模拟引擎的 Variant 运算
//!
//! 比较、哈希、真值、字符串化与运算符求值。只实现扩展桥接会用到的组合，
//! 其余组合按引擎惯例报告为无效运算。

use super::containers::{self, PackedData};
use super::objects;
use super::value::{self, Words};
use crate::builtins::Real;
use crate::variant::{GType, VariantOperator};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn is_string_family(gtype: GType) -> bool {
    matches!(gtype, GType::String | GType::StringName)
}

/// Engine `==`.
pub(crate) fn equals(a: &Words, b: &Words) -> bool {
    let (ta, tb) = (value::tag(a), value::tag(b));
    if let (Some(x), Some(y)) = (value::as_number(a), value::as_number(b)) {
        return x == y;
    }
    if is_string_family(ta) && is_string_family(tb) {
        return value::as_text(a) == value::as_text(b);
    }
    if ta != tb {
        return false;
    }
    let (ha, hb) = (value::handle(a), value::handle(b));
    match ta {
        GType::Nil => true,
        GType::Bool => value::as_bool(a) == value::as_bool(b),
        GType::NodePath => value::as_text(a) == value::as_text(b),
        GType::Object => ha == hb,
        GType::Callable => ha == hb || objects::callable_key(ha) == objects::callable_key(hb),
        GType::Signal => {
            // SAFETY: payload handles are live while the payloads are.
            match unsafe { (objects::signal(ha), objects::signal(hb)) } {
                (Some(x), Some(y)) => x.instance_id == y.instance_id && x.name == y.name,
                (x, y) => x.is_none() && y.is_none(),
            }
        }
        GType::Array => {
            if ha == hb {
                return true;
            }
            let (xs, ys) = (containers::array_snapshot(ha), containers::array_snapshot(hb));
            let same = xs.len() == ys.len() && xs.iter().zip(&ys).all(|(x, y)| equals(x, y));
            value::destroy_all(xs);
            value::destroy_all(ys);
            same
        }
        GType::Dictionary => {
            if ha == hb {
                return true;
            }
            let (keys, values) = (containers::dict_column(ha, true), containers::dict_column(ha, false));
            let same = keys.len() == containers::dict_len(hb)
                && keys.iter().zip(&values).all(|(key, value_words)| {
                    containers::dict_get(hb, key).map_or(false, |other| {
                        let same = equals(value_words, &other);
                        value::destroy_words(other);
                        same
                    })
                });
            value::destroy_all(keys);
            value::destroy_all(values);
            same
        }
        gtype if gtype.is_packed_array() => {
            // SAFETY: packed payloads own a live block.
            let (x, y) = unsafe { (PackedData::get(ha), PackedData::get(hb)) };
            if gtype == GType::PackedStringArray {
                x.strings() == y.strings()
            } else {
                x.bytes() == y.bytes()
            }
        }
        _ => value::pod_bytes(a) == value::pod_bytes(b),
    }
}

/// Dictionary key match: same type family, then equality.
pub(crate) fn keys_match(a: &Words, b: &Words) -> bool {
    let (ta, tb) = (value::tag(a), value::tag(b));
    let same_family = ta == tb || (is_string_family(ta) && is_string_family(tb));
    same_family && equals(a, b)
}

pub(crate) fn hash(words: &Words) -> i64 {
    let mut hasher = DefaultHasher::new();
    let gtype = value::tag(words);
    match gtype {
        GType::Nil => return 0,
        GType::Bool | GType::Int => words[1].hash(&mut hasher),
        GType::Float => {
            let number = value::as_float(words).unwrap_or(0.0);
            if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
                (number as i64 as u64).hash(&mut hasher)
            } else {
                number.to_bits().hash(&mut hasher)
            }
        }
        GType::String | GType::StringName | GType::NodePath => value::as_text(words).hash(&mut hasher),
        GType::Object => value::handle(words).hash(&mut hasher),
        GType::Callable => {
            let handle = value::handle(words);
            match objects::callable_custom_hash(handle) {
                Some(custom) => custom.hash(&mut hasher),
                None => objects::callable_key(handle).hash(&mut hasher),
            }
        }
        GType::Signal => {
            // SAFETY: payload handles are live while the payload is.
            if let Some(signal) = unsafe { objects::signal(value::handle(words)) } {
                (signal.instance_id, &signal.name).hash(&mut hasher);
            }
        }
        GType::Array => {
            let elements = containers::array_snapshot(value::handle(words));
            for element in &elements {
                hash(element).hash(&mut hasher);
            }
            value::destroy_all(elements);
        }
        GType::Dictionary => {
            let handle = value::handle(words);
            let (keys, values) = (containers::dict_column(handle, true), containers::dict_column(handle, false));
            for (key, value_words) in keys.iter().zip(&values) {
                (hash(key), hash(value_words)).hash(&mut hasher);
            }
            value::destroy_all(keys);
            value::destroy_all(values);
        }
        gtype if gtype.is_packed_array() => {
            // SAFETY: packed payloads own a live block.
            let data = unsafe { PackedData::get(value::handle(words)) };
            if gtype == GType::PackedStringArray {
                data.strings().hash(&mut hasher);
            } else {
                data.bytes().hash(&mut hasher);
            }
        }
        _ => value::pod_bytes(words).hash(&mut hasher),
    }
    i64::from(hasher.finish() as u32)
}

pub(crate) fn booleanize(words: &Words) -> bool {
    let handle = value::handle(words);
    match value::tag(words) {
        GType::Nil => false,
        GType::Bool => words[1] != 0,
        GType::Int => words[1] != 0,
        GType::Float => value::as_float(words).map_or(false, |number| number != 0.0),
        GType::String | GType::StringName | GType::NodePath => {
            value::as_text(words).map_or(false, |text| !text.is_empty())
        }
        GType::Object => objects::instance_id_raw(handle) != 0,
        GType::Callable => handle != 0,
        GType::Signal => handle != 0,
        GType::Array => containers::array_len(handle) > 0,
        GType::Dictionary => containers::dict_len(handle) > 0,
        // SAFETY: packed payloads own a live block.
        gtype if gtype.is_packed_array() => unsafe { PackedData::get(handle) }.len() > 0,
        _ => value::pod_bytes(words).iter().any(|byte| *byte != 0),
    }
}

// ---- stringify -----------------------------------------------------------------

fn format_float(number: f64) -> String {
    if number.is_nan() {
        "nan".to_string()
    } else if number.is_infinite() {
        if number > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if number.fract() == 0.0 && number.abs() < 1e16 {
        format!("{number:.1}")
    } else {
        format!("{number}")
    }
}

fn reals(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks_exact(std::mem::size_of::<Real>())
        .map(|chunk| {
            let number = if chunk.len() == 8 {
                f64::from_le_bytes(chunk.try_into().unwrap_or([0; 8]))
            } else {
                f64::from(f32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])))
            };
            format_float(number)
        })
        .collect()
}

fn ints(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])).to_string())
        .collect()
}

fn floats32(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks_exact(4)
        .map(|chunk| format_float(f64::from(f32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])))))
        .collect()
}

fn tuple(parts: &[String]) -> String {
    format!("({})", parts.join(", "))
}

/// Text of a plain-data builtin from its bytes.
fn format_pod(gtype: GType, bytes: &[u8]) -> String {
    match gtype {
        GType::Vector2 | GType::Vector3 | GType::Vector4 | GType::Quaternion => tuple(&reals(bytes)),
        GType::Vector2i | GType::Vector3i | GType::Vector4i => tuple(&ints(bytes)),
        GType::Rect2 | GType::Aabb => {
            let parts = reals(bytes);
            let half = parts.len() / 2;
            format!("[P: {}, S: {}]", tuple(&parts[..half]), tuple(&parts[half..]))
        }
        GType::Rect2i => {
            let parts = ints(bytes);
            format!("[P: {}, S: {}]", tuple(&parts[..2]), tuple(&parts[2..]))
        }
        GType::Plane => {
            let parts = reals(bytes);
            format!("[N: {}, D: {}]", tuple(&parts[..3]), parts[3])
        }
        GType::Transform2D => {
            let parts = reals(bytes);
            format!(
                "[X: {}, Y: {}, O: {}]",
                tuple(&parts[0..2]),
                tuple(&parts[2..4]),
                tuple(&parts[4..6])
            )
        }
        GType::Basis => {
            let parts = reals(bytes);
            format!("[X: {}, Y: {}, Z: {}]", tuple(&parts[0..3]), tuple(&parts[3..6]), tuple(&parts[6..9]))
        }
        GType::Transform3D => {
            let parts = reals(bytes);
            format!(
                "[X: {}, Y: {}, Z: {}, O: {}]",
                tuple(&parts[0..3]),
                tuple(&parts[3..6]),
                tuple(&parts[6..9]),
                tuple(&parts[9..12])
            )
        }
        GType::Projection => {
            let parts = reals(bytes);
            let rows: Vec<String> = parts.chunks(4).map(|row| row.join(", ")).collect();
            format!("\n{}\n", rows.join("\n"))
        }
        GType::Color => tuple(&floats32(bytes)),
        GType::Rid => {
            let id = u64::from_le_bytes(bytes.get(..8).and_then(|b| b.try_into().ok()).unwrap_or([0; 8]));
            format!("RID({id})")
        }
        _ => String::new(),
    }
}

/// Element text inside containers: strings are quoted.
fn nested(words: &Words) -> String {
    match value::tag(words) {
        GType::String => format!("\"{}\"", value::as_text(words).unwrap_or_default()),
        GType::StringName => format!("&\"{}\"", value::as_text(words).unwrap_or_default()),
        GType::NodePath => format!("^\"{}\"", value::as_text(words).unwrap_or_default()),
        _ => stringify(words),
    }
}

fn format_packed(data: &mut PackedData) -> String {
    let parts: Vec<String> = if data.kind() == GType::PackedStringArray {
        data.strings().into_iter().map(|text| format!("\"{text}\"")).collect()
    } else {
        (0..data.len())
            .map(|index| {
                let words = data.get_words(index);
                let text = stringify(&words);
                value::destroy_words(words);
                text
            })
            .collect()
    };
    format!("[{}]", parts.join(", "))
}

/// Engine `str()`.
pub(crate) fn stringify(words: &Words) -> String {
    let handle = value::handle(words);
    match value::tag(words) {
        GType::Nil => "<null>".to_string(),
        GType::Bool => (words[1] != 0).to_string(),
        GType::Int => (words[1] as i64).to_string(),
        GType::Float => format_float(value::as_float(words).unwrap_or(0.0)),
        GType::String | GType::StringName | GType::NodePath => value::as_text(words).unwrap_or_default(),
        GType::Object => objects::object_display(handle),
        GType::Callable => objects::callable_display(handle),
        GType::Signal => match unsafe { objects::signal(handle) } {
            Some(signal) => format!("{}::{}", objects::object_display(signal.object), signal.name),
            None => "null::null".to_string(),
        },
        GType::Array => {
            let elements = containers::array_snapshot(handle);
            let text = elements.iter().map(nested).collect::<Vec<_>>().join(", ");
            value::destroy_all(elements);
            format!("[{text}]")
        }
        GType::Dictionary => {
            let (keys, values) = (containers::dict_column(handle, true), containers::dict_column(handle, false));
            let text = keys
                .iter()
                .zip(&values)
                .map(|(key, value_words)| format!("{}: {}", nested(key), nested(value_words)))
                .collect::<Vec<_>>()
                .join(", ");
            value::destroy_all(keys);
            value::destroy_all(values);
            if text.is_empty() {
                "{ }".to_string()
            } else {
                format!("{{ {text} }}")
            }
        }
        // SAFETY: packed payloads own a live block.
        gtype if gtype.is_packed_array() => format_packed(unsafe { PackedData::get(handle) }),
        gtype => format_pod(gtype, value::pod_bytes(words)),
    }
}

// ---- evaluate -----------------------------------------------------------------------

fn compare(a: &Words, b: &Words) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (value::as_int(a), value::as_int(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (value::as_number(a), value::as_number(b)) {
        return x.partial_cmp(&y);
    }
    if is_string_family(value::tag(a)) && is_string_family(value::tag(b)) {
        return Some(value::as_text(a).cmp(&value::as_text(b)));
    }
    if value::tag(a) == GType::Bool && value::tag(b) == GType::Bool {
        return Some(words_bool(a).cmp(&words_bool(b)));
    }
    None
}

fn words_bool(words: &Words) -> bool {
    words[1] != 0
}

fn arithmetic(op: VariantOperator, a: &Words, b: &Words) -> Option<Words> {
    if let (Some(x), Some(y)) = (value::as_int(a), value::as_int(b)) {
        let result = match op {
            VariantOperator::Add => x.wrapping_add(y),
            VariantOperator::Subtract => x.wrapping_sub(y),
            VariantOperator::Multiply => x.wrapping_mul(y),
            VariantOperator::Divide | VariantOperator::Module if y == 0 => return None,
            VariantOperator::Divide => x.wrapping_div(y),
            VariantOperator::Module => x.wrapping_rem(y),
            VariantOperator::Power => return Some(value::make_float((x as f64).powf(y as f64))),
            _ => return None,
        };
        return Some(value::make_int(result));
    }
    let (x, y) = (value::as_number(a)?, value::as_number(b)?);
    let result = match op {
        VariantOperator::Add => x + y,
        VariantOperator::Subtract => x - y,
        VariantOperator::Multiply => x * y,
        VariantOperator::Divide => x / y,
        VariantOperator::Power => x.powf(y),
        _ => return None,
    };
    Some(value::make_float(result))
}

fn bitwise(op: VariantOperator, a: &Words, b: &Words) -> Option<Words> {
    let (x, y) = (value::as_int(a)?, value::as_int(b)?);
    let result = match op {
        VariantOperator::ShiftLeft if (0..64).contains(&y) => x.wrapping_shl(y as u32),
        VariantOperator::ShiftRight if (0..64).contains(&y) => x.wrapping_shr(y as u32),
        VariantOperator::BitAnd => x & y,
        VariantOperator::BitOr => x | y,
        VariantOperator::BitXor => x ^ y,
        _ => return None,
    };
    Some(value::make_int(result))
}

fn contains(needle: &Words, haystack: &Words) -> Option<bool> {
    let handle = value::handle(haystack);
    match value::tag(haystack) {
        GType::String | GType::StringName => {
            let text = value::as_text(haystack)?;
            Some(text.contains(value::as_text(needle)?.as_str()))
        }
        GType::Array => {
            let elements = containers::array_snapshot(handle);
            let found = elements.iter().any(|element| equals(element, needle));
            value::destroy_all(elements);
            Some(found)
        }
        GType::Dictionary => Some(containers::dict_has(handle, needle)),
        _ => None,
    }
}

/// Engine operator evaluation; `None` for unsupported operand types.
pub(crate) fn evaluate(op: VariantOperator, a: &Words, b: &Words) -> Option<Words> {
    use std::cmp::Ordering::*;
    match op {
        VariantOperator::Equal => Some(value::make_bool(equals(a, b))),
        VariantOperator::NotEqual => Some(value::make_bool(!equals(a, b))),
        VariantOperator::Less => compare(a, b).map(|o| value::make_bool(o == Less)),
        VariantOperator::LessEqual => compare(a, b).map(|o| value::make_bool(o != Greater)),
        VariantOperator::Greater => compare(a, b).map(|o| value::make_bool(o == Greater)),
        VariantOperator::GreaterEqual => compare(a, b).map(|o| value::make_bool(o != Less)),
        VariantOperator::Add => {
            let (ta, tb) = (value::tag(a), value::tag(b));
            if is_string_family(ta) && is_string_family(tb) {
                let joined = value::as_text(a)? + &value::as_text(b)?;
                return Some(value::make_string(&joined));
            }
            if ta == GType::Array && tb == GType::Array {
                let mut elements = containers::array_snapshot(value::handle(a));
                elements.extend(containers::array_snapshot(value::handle(b)));
                let handle = containers::array_from(containers::ArrayData {
                    elements,
                    typed: None,
                });
                return Some(value::make_array(handle));
            }
            arithmetic(op, a, b)
        }
        VariantOperator::Subtract
        | VariantOperator::Multiply
        | VariantOperator::Divide
        | VariantOperator::Module
        | VariantOperator::Power => arithmetic(op, a, b),
        VariantOperator::Negate => match value::tag(a) {
            GType::Int => value::as_int(a).map(|x| value::make_int(x.wrapping_neg())),
            GType::Float => value::as_float(a).map(|x| value::make_float(-x)),
            _ => None,
        },
        VariantOperator::Positive => match value::tag(a) {
            GType::Int | GType::Float => Some(*a),
            _ => None,
        },
        VariantOperator::ShiftLeft
        | VariantOperator::ShiftRight
        | VariantOperator::BitAnd
        | VariantOperator::BitOr
        | VariantOperator::BitXor => bitwise(op, a, b),
        VariantOperator::BitNegate => value::as_int(a).map(|x| value::make_int(!x)),
        VariantOperator::And => Some(value::make_bool(booleanize(a) && booleanize(b))),
        VariantOperator::Or => Some(value::make_bool(booleanize(a) || booleanize(b))),
        VariantOperator::Xor => Some(value::make_bool(booleanize(a) != booleanize(b))),
        VariantOperator::Not => Some(value::make_bool(!booleanize(a))),
        VariantOperator::In => contains(a, b).map(value::make_bool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_compare_across_int_and_float() {
        assert!(equals(&value::make_int(2), &value::make_float(2.0)));
        assert!(!keys_match(&value::make_int(2), &value::make_float(2.0)));
        let less = evaluate(VariantOperator::Less, &value::make_int(1), &value::make_float(1.5));
        assert_eq!(less.and_then(|w| value::as_bool(&w)), Some(true));
    }

    #[test]
    fn test_integer_division_by_zero_is_invalid() {
        assert!(evaluate(VariantOperator::Divide, &value::make_int(1), &value::make_int(0)).is_none());
        assert!(evaluate(VariantOperator::Module, &value::make_int(1), &value::make_int(0)).is_none());
        let quotient = evaluate(VariantOperator::Divide, &value::make_int(7), &value::make_int(2));
        assert_eq!(quotient.and_then(|w| value::as_int(&w)), Some(3));
    }

    #[test]
    fn test_stringify_scalars() {
        assert_eq!(stringify(&value::NIL), "<null>");
        assert_eq!(stringify(&value::make_float(3.0)), "3.0");
        assert_eq!(stringify(&value::make_float(f64::INFINITY)), "inf");
        assert_eq!(stringify(&value::make_bool(true)), "true");
    }

    #[test]
    fn test_string_and_name_share_hashes() {
        let text = value::make_string("same");
        let name = value::make_string_name("same");
        assert_eq!(hash(&text), hash(&name));
        assert!(equals(&text, &name));
        assert!(keys_match(&text, &name));
        value::destroy_words(text);
        value::destroy_words(name);
    }

    #[test]
    fn test_unsupported_operands_are_invalid() {
        let text = value::make_string("a");
        assert!(evaluate(VariantOperator::Subtract, &text, &value::make_int(1)).is_none());
        assert!(evaluate(VariantOperator::Less, &value::NIL, &value::make_int(1)).is_none());
        value::destroy_words(text);
    }
}
