//! The standard converter pack
//!
//! Covers the bridges a schemaless store actually needs: numeric widening
//! and exact narrowing, text parsing and rendering, epoch-millisecond and
//! RFC 3339 timestamp forms, UTF-8 blobs, and the path form of keys. Text
//! parsers treat the empty string as a null representation rather than a
//! parse failure, which keeps records written before a field changed kind
//! loadable.
//!
//! Two general converters ride behind the specifics:
//! - list bridge: wraps a scalar for a list target, unwraps one-element
//!   lists for a scalar target, and reads an empty list as null
//! - text rendering: any value converts to text as a last resort

use crate::registry::{ConvertError, ConverterRegistry, GeneralOutcome};
use chrono::{TimeZone, Utc};
use graft_core::datum::{Datum, DatumKind};
use graft_core::key::Key;

/// Install the standard pack into a registry
pub fn install(registry: &mut ConverterRegistry) {
    use DatumKind as K;

    registry.append_specific(K::Int, K::Float, |d| match d {
        Datum::Int(i) => Ok(Datum::Float(i as f64)),
        other => Ok(other),
    });
    registry.append_specific(K::Float, K::Int, |d| match d {
        Datum::Float(f) => exact_int(f).map(Datum::Int),
        other => Ok(other),
    });
    registry.append_specific(K::Int, K::Text, |d| match d {
        Datum::Int(i) => Ok(Datum::Text(i.to_string())),
        other => Ok(other),
    });
    registry.append_specific(K::Text, K::Int, |d| match d {
        Datum::Text(s) => parse_text(s, K::Int, |s| s.parse().ok().map(Datum::Int)),
        other => Ok(other),
    });
    registry.append_specific(K::Float, K::Text, |d| match d {
        Datum::Float(f) => Ok(Datum::Text(format!("{f}"))),
        other => Ok(other),
    });
    registry.append_specific(K::Text, K::Float, |d| match d {
        Datum::Text(s) => parse_text(s, K::Float, |s| s.parse().ok().map(Datum::Float)),
        other => Ok(other),
    });
    registry.append_specific(K::Bool, K::Text, |d| match d {
        Datum::Bool(b) => Ok(Datum::Text(b.to_string())),
        other => Ok(other),
    });
    registry.append_specific(K::Text, K::Bool, |d| match d {
        Datum::Text(s) => parse_text(s, K::Bool, |s| match s {
            "true" => Some(Datum::Bool(true)),
            "false" => Some(Datum::Bool(false)),
            _ => None,
        }),
        other => Ok(other),
    });
    registry.append_specific(K::Bool, K::Int, |d| match d {
        Datum::Bool(b) => Ok(Datum::Int(i64::from(b))),
        other => Ok(other),
    });
    registry.append_specific(K::Int, K::Bool, |d| match d {
        Datum::Int(i) => Ok(Datum::Bool(i != 0)),
        other => Ok(other),
    });
    registry.append_specific(K::Stamp, K::Text, |d| match d {
        Datum::Stamp(t) => Ok(Datum::Text(t.to_rfc3339())),
        other => Ok(other),
    });
    registry.append_specific(K::Text, K::Stamp, |d| match d {
        Datum::Text(s) => parse_text(s, K::Stamp, |s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| Datum::Stamp(t.with_timezone(&Utc)))
        }),
        other => Ok(other),
    });
    registry.append_specific(K::Stamp, K::Int, |d| match d {
        Datum::Stamp(t) => Ok(Datum::Int(t.timestamp_millis())),
        other => Ok(other),
    });
    registry.append_specific(K::Int, K::Stamp, |d| match d {
        Datum::Int(millis) => Utc
            .timestamp_millis_opt(millis)
            .single()
            .map(Datum::Stamp)
            .ok_or(ConvertError::StampRange { millis }),
        other => Ok(other),
    });
    registry.append_specific(K::Text, K::Blob, |d| match d {
        Datum::Text(s) => Ok(Datum::Blob(s.into_bytes())),
        other => Ok(other),
    });
    registry.append_specific(K::Blob, K::Text, |d| match d {
        Datum::Blob(b) => String::from_utf8(b)
            .map(Datum::Text)
            .map_err(|source| ConvertError::BadUtf8 { source }),
        other => Ok(other),
    });
    registry.append_specific(K::Ref, K::Text, |d| match d {
        Datum::Ref(k) => Ok(Datum::Text(k.to_string())),
        other => Ok(other),
    });
    registry.append_specific(K::Text, K::Ref, |d| match d {
        Datum::Text(s) => parse_text(s, K::Ref, |s| s.parse::<Key>().ok().map(Datum::Ref)),
        other => Ok(other),
    });

    registry.append_general(list_bridge);
    registry.append_general(|_, value, target| match target {
        DatumKind::Text => GeneralOutcome::Converted(Datum::Text(render(value))),
        _ => GeneralOutcome::NoMatch,
    });
}

fn exact_int(f: f64) -> Result<i64, ConvertError> {
    // 2^63 is exactly representable; anything in [-2^63, 2^63) with no
    // fractional part casts losslessly
    let in_range = f >= -(2f64.powi(63)) && f < 2f64.powi(63);
    if f.fract() == 0.0 && in_range {
        Ok(f as i64)
    } else {
        Err(ConvertError::LossyFloat { value: f })
    }
}

fn parse_text(
    text: String,
    to: DatumKind,
    parse: impl Fn(&str) -> Option<Datum>,
) -> Result<Datum, ConvertError> {
    if text.is_empty() {
        return Ok(Datum::Null);
    }
    parse(&text).ok_or(ConvertError::Unparseable { to, text })
}

fn list_bridge(registry: &ConverterRegistry, value: &Datum, target: DatumKind) -> GeneralOutcome {
    if target == DatumKind::List {
        return GeneralOutcome::Converted(Datum::List(vec![value.clone()]));
    }
    if let Datum::List(items) = value {
        return match items.as_slice() {
            [] => GeneralOutcome::Null,
            [single] => match registry.convert(single.clone(), target) {
                Ok(converted) => GeneralOutcome::Converted(converted),
                Err(_) => GeneralOutcome::NoMatch,
            },
            _ => GeneralOutcome::NoMatch,
        };
    }
    GeneralOutcome::NoMatch
}

/// Render any datum as text, for the fallback converter and diagnostics
pub(crate) fn render(value: &Datum) -> String {
    match value {
        Datum::Null => "null".to_string(),
        Datum::Bool(b) => b.to_string(),
        Datum::Int(i) => i.to_string(),
        Datum::Float(f) => format!("{f}"),
        Datum::Text(s) => s.clone(),
        Datum::Blob(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
        Datum::Stamp(t) => t.to_rfc3339(),
        Datum::Ref(k) => k.to_string(),
        Datum::List(items) => {
            let parts: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}
