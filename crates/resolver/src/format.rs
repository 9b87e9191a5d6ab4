//! Human-readable rendering of raw history values.

use chrono::{DateTime, Utc};
use confmacro_core::{ItemMeta, ValueType};

const BINARY_PLACEHOLDER: &str = "binary value";

/// Render `raw` for display according to the item's value type, units and
/// value map.
///
/// - numeric: value-mapped as `mapped (raw)`, else `raw units`
///   (`unixtime` renders as a UTC timestamp)
/// - character: value-mapped, else passed through
/// - log/text: cut to `trim_length` characters plus `...`
/// - binary: a fixed placeholder
pub fn format_history_value(raw: &str, item: &ItemMeta, trim_length: usize) -> String {
    match item.value_type {
        ValueType::Float | ValueType::Uint64 => {
            if let Some(mapped) = mapped_value(raw, item) {
                return mapped;
            }
            format_numeric(raw, &item.units)
        }
        ValueType::Str => mapped_value(raw, item).unwrap_or_else(|| trim(raw, trim_length)),
        ValueType::Log | ValueType::Text => trim(raw, trim_length),
        ValueType::Binary => BINARY_PLACEHOLDER.to_string(),
    }
}

fn mapped_value(raw: &str, item: &ItemMeta) -> Option<String> {
    if item.valuemap_id == 0 {
        return None;
    }
    let map = item.value_map.as_ref()?;
    map.mappings
        .get(raw)
        .map(|mapped| format!("{mapped} ({raw})"))
}

fn format_numeric(raw: &str, units: &str) -> String {
    match units {
        "" => raw.to_string(),
        "unixtime" => raw
            .parse::<f64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| raw.to_string()),
        units => format!("{raw} {units}"),
    }
}

fn trim(raw: &str, limit: usize) -> String {
    if raw.chars().count() > limit {
        let cut: String = raw.chars().take(limit).collect();
        format!("{cut}...")
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confmacro_core::ValueMap;

    fn item(value_type: ValueType, units: &str) -> ItemMeta {
        ItemMeta {
            item_id: "1".into(),
            host: "web01".into(),
            key: "k".into(),
            name: "k".into(),
            value_type,
            units: units.into(),
            valuemap_id: 0,
            value_map: None,
        }
    }

    #[test]
    fn numeric_appends_units() {
        assert_eq!(format_history_value("42", &item(ValueType::Uint64, "B"), 20), "42 B");
        assert_eq!(format_history_value("0.5", &item(ValueType::Float, ""), 20), "0.5");
    }

    #[test]
    fn value_map_wraps_raw() {
        let mut it = item(ValueType::Uint64, "");
        it.valuemap_id = 7;
        it.value_map = Some(ValueMap {
            id: 7,
            mappings: [("1".to_string(), "Up".to_string())].into_iter().collect(),
        });
        assert_eq!(format_history_value("1", &it, 20), "Up (1)");
        assert_eq!(format_history_value("0", &it, 20), "0");
    }

    #[test]
    fn value_map_ignored_when_id_is_zero() {
        let mut it = item(ValueType::Uint64, "");
        it.value_map = Some(ValueMap {
            id: 7,
            mappings: [("1".to_string(), "Up".to_string())].into_iter().collect(),
        });
        assert_eq!(format_history_value("1", &it, 20), "1");
    }

    #[test]
    fn long_text_is_trimmed() {
        let raw = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(
            format_history_value(raw, &item(ValueType::Text, ""), 20),
            "abcdefghijklmnopqrst..."
        );
        assert_eq!(format_history_value("short", &item(ValueType::Log, ""), 20), "short");
    }

    #[test]
    fn binary_is_placeholder() {
        assert_eq!(
            format_history_value("\u{0}\u{1}", &item(ValueType::Binary, ""), 20),
            "binary value"
        );
    }

    #[test]
    fn unixtime_renders_utc() {
        assert_eq!(
            format_history_value("0", &item(ValueType::Uint64, "unixtime"), 20),
            "1970-01-01 00:00:00"
        );
    }
}
