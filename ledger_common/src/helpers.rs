use std::str::FromStr;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse an optional setting, distinguishing between "not set" (`Ok(None)`) and "set, but invalid" (`Err`).
/// Blank values count as not set.
pub fn parse_optional<T: FromStr>(value: Option<String>) -> Result<Option<T>, T::Err> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn optional_values() {
        assert_eq!(parse_optional::<u32>(None).unwrap(), None);
        assert_eq!(parse_optional::<u32>(Some("  ".into())).unwrap(), None);
        assert_eq!(parse_optional::<u32>(Some(" 24 ".into())).unwrap(), Some(24));
        assert!(parse_optional::<u32>(Some("a day".into())).is_err());
    }
}
