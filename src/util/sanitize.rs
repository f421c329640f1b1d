//! Coercion of untrusted JSON values into bounded simulation inputs
//!
//! Every inbound path goes through these helpers. Nothing here fails: a value
//! that cannot be interpreted collapses to a neutral default instead.

use glam::{Quat, Vec3};
use serde_json::Value;

/// Maximum display name length, in characters
pub const MAX_NAME_CHARS: usize = 24;

/// Name used when the client sends nothing printable
pub const DEFAULT_NAME: &str = "Pilot";

/// Clamp a value into `[min, max]`. Non-finite values are treated as 0.
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if !value.is_finite() {
        return 0.0_f32.clamp(min, max);
    }
    value.clamp(min, max)
}

/// Interpret a JSON value as a finite `f32`, or 0.
///
/// Numeric strings are accepted the way a browser client would coerce them.
pub fn to_finite_number(value: &Value) -> f32 {
    match to_finite_f64(value).map(|n| n as f32) {
        Some(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Full-precision variant of [`to_finite_number`], `None` when unusable.
pub fn to_finite_f64(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|n| n.is_finite())
}

/// Millisecond timestamp, `None` when missing, negative or non-finite.
pub fn to_timestamp(value: &Value) -> Option<u64> {
    to_finite_f64(value)
        .filter(|n| *n >= 0.0 && *n < u64::MAX as f64)
        .map(|n| n as u64)
}

/// Loose truthiness: anything but `null`, `false`, `0`, `""` counts as set.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0 && !n.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Read a three-element array. Missing or non-finite components become 0.
pub fn to_vec3(value: &Value) -> Option<Vec3> {
    let items = value.as_array()?;
    if items.len() < 3 {
        return None;
    }
    Some(Vec3::new(
        to_finite_number(&items[0]),
        to_finite_number(&items[1]),
        to_finite_number(&items[2]),
    ))
}

/// Read an `[x, y, z, w]` array as a unit quaternion.
pub fn to_quat(value: &Value) -> Option<Quat> {
    let items = value.as_array()?;
    if items.len() < 4 {
        return None;
    }
    let q = Quat::from_xyzw(
        to_finite_number(&items[0]),
        to_finite_number(&items[1]),
        to_finite_number(&items[2]),
        to_finite_number(&items[3]),
    );
    let len = q.length();
    if len <= f32::EPSILON || !len.is_finite() {
        return Some(Quat::IDENTITY);
    }
    Some(q / len)
}

/// Clamp every component of a vector into `[-bound, bound]`.
pub fn clamp_vec3(v: Vec3, bound: f32) -> Vec3 {
    Vec3::new(
        clamp(v.x, -bound, bound),
        clamp(v.y, -bound, bound),
        clamp(v.z, -bound, bound),
    )
}

/// Controls plus format (Cf) and filler code points that render as nothing
/// or reorder the surrounding text.
fn is_unprintable(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\u{00AD}'
                | '\u{034F}'
                | '\u{061C}'
                | '\u{0600}'..='\u{0605}'
                | '\u{06DD}'
                | '\u{070F}'
                | '\u{08E2}'
                | '\u{115F}'..='\u{1160}'
                | '\u{17B4}'..='\u{17B5}'
                | '\u{180B}'..='\u{180F}'
                | '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{206F}'
                | '\u{3164}'
                | '\u{FE00}'..='\u{FE0F}'
                | '\u{FEFF}'
                | '\u{FFA0}'
                | '\u{FFF9}'..='\u{FFFB}'
                | '\u{110BD}'
                | '\u{110CD}'
                | '\u{1BCA0}'..='\u{1BCA3}'
                | '\u{1D173}'..='\u{1D17A}'
                | '\u{E0000}'..='\u{E0FFF}'
        )
}

/// Strip unprintable characters, trim, and cap a display name.
pub fn sanitize_name(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.as_str(),
        _ => "",
    };
    let cleaned: String = raw
        .chars()
        .filter(|c| !is_unprintable(*c))
        .collect::<String>()
        .trim()
        .chars()
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_end().to_string();
    if cleaned.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_default_to_zero() {
        assert_eq!(to_finite_number(&json!(0.5)), 0.5);
        assert_eq!(to_finite_number(&json!("0.25")), 0.25);
        assert_eq!(to_finite_number(&json!(null)), 0.0);
        assert_eq!(to_finite_number(&json!("nope")), 0.0);
        assert_eq!(to_finite_number(&json!(1e300)), 0.0);
    }

    #[test]
    fn timestamps_keep_millisecond_precision() {
        assert_eq!(to_timestamp(&json!(1_700_000_000_123u64)), Some(1_700_000_000_123));
        assert_eq!(to_timestamp(&json!(-5)), None);
        assert_eq!(to_timestamp(&json!(null)), None);
        assert_eq!(to_finite_f64(&json!("12.5")), Some(12.5));
    }

    #[test]
    fn clamp_handles_non_finite() {
        assert_eq!(clamp(f32::NAN, -1.0, 1.0), 0.0);
        assert_eq!(clamp(f32::INFINITY, 0.0, 1.0), 0.0);
        assert_eq!(clamp(3.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-3.0, -1.0, 1.0), -1.0);
    }

    #[test]
    fn truthiness() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("yes")));
        assert!(truthy(&json!({})));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
    }

    #[test]
    fn vectors_and_quaternions() {
        assert_eq!(to_vec3(&json!([1, "2", null])), Some(Vec3::new(1.0, 2.0, 0.0)));
        assert_eq!(to_vec3(&json!([1, 2])), None);
        assert_eq!(to_vec3(&json!("x")), None);

        let q = to_quat(&json!([0, 0, 0, 2])).unwrap();
        assert_eq!(q, Quat::IDENTITY);
        assert_eq!(to_quat(&json!([0, 0, 0, 0])), Some(Quat::IDENTITY));
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name(&json!("  Maverick\n ")), "Maverick");
        assert_eq!(sanitize_name(&json!("")), DEFAULT_NAME);
        assert_eq!(sanitize_name(&json!(42)), DEFAULT_NAME);
        assert_eq!(sanitize_name(&json!("\u{0007}\u{0008}")), DEFAULT_NAME);
        assert_eq!(sanitize_name(&json!("Ice\u{200B}man\u{202E}")), "Iceman");
        assert_eq!(sanitize_name(&json!("\u{FEFF}\u{2066} Goose \u{2069}")), "Goose");
        assert_eq!(sanitize_name(&json!("\u{200B}\u{200D}\u{00AD}")), DEFAULT_NAME);

        let long = "x".repeat(40);
        assert_eq!(sanitize_name(&json!(long)).chars().count(), MAX_NAME_CHARS);
    }
}
