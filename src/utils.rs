use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize a serde-backed enum into its wire name (e.g. "wired-t1", "FAILURE").
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// Inverse of [`serde_enum_name`]: parse a stored text column back into its enum.
/// Aliases declared on the enum are honoured.
pub fn parse_serde_enum<T: DeserializeOwned>(name: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
}

/// Render a text column value for an enum, falling back to the Debug form when
/// the enum does not serialize to a plain string.
pub fn enum_text<T: Serialize + core::fmt::Debug>(val: &T) -> String {
    serde_enum_name(val).unwrap_or_else(|| format!("{:?}", val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::site::{MeasurementKind, Sector, Status};

    #[test]
    fn enum_names_round_trip_through_text_columns() {
        assert_eq!(serde_enum_name(&MeasurementKind::WiredT1).as_deref(), Some("wired-t1"));
        assert_eq!(parse_serde_enum::<MeasurementKind>("fiber"), Some(MeasurementKind::Fiber));
        assert_eq!(enum_text(&Status::Failure), "FAILURE");
        assert_eq!(parse_serde_enum::<Sector>("Poniente"), Some(Sector::Poniente));
    }

    #[test]
    fn legacy_aliases_parse() {
        assert_eq!(parse_serde_enum::<MeasurementKind>("fibra"), Some(MeasurementKind::Fiber));
        assert_eq!(parse_serde_enum::<Status>("FALLA"), Some(Status::Failure));
        assert_eq!(parse_serde_enum::<Status>("bogus"), None);
    }
}
