use gdal::vector::FieldValue;

/// 属性値を数値に変換する。変換できない値は `None`。
pub fn numeric_value(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::IntegerValue(v) => Some(f64::from(*v)),
        FieldValue::Integer64Value(v) => Some(*v as f64),
        FieldValue::RealValue(v) => Some(*v),
        FieldValue::StringValue(s) => parse_number(s),
        _ => None,
    }
}

/// 前後の空白を除いた文字列を浮動小数点数として解釈する。
///
/// 数字の間の区切り `_`（`1_000` など）は読み飛ばす。
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.contains('_') {
        return trimmed.parse::<f64>().ok();
    }

    let bytes = trimmed.as_bytes();
    let separators_ok = bytes.iter().enumerate().all(|(i, &b)| {
        b != b'_'
            || (i > 0
                && i + 1 < bytes.len()
                && bytes[i - 1].is_ascii_digit()
                && bytes[i + 1].is_ascii_digit())
    });
    if !separators_ok {
        return None;
    }
    trimmed.replace('_', "").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("125"), Some(125.0));
        assert_eq!(parse_number("  87.5 "), Some(87.5));
        assert_eq!(parse_number("-12.25"), Some(-12.25));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("   "), None);
        assert_eq!(parse_number("12,5"), None);
        assert_eq!(parse_number("yok"), None);
    }

    #[test]
    fn test_numeric_value_variants() {
        assert_eq!(numeric_value(&FieldValue::IntegerValue(40)), Some(40.0));
        assert_eq!(
            numeric_value(&FieldValue::Integer64Value(1_250)),
            Some(1250.0)
        );
        assert_eq!(numeric_value(&FieldValue::RealValue(12.5)), Some(12.5));
        assert_eq!(
            numeric_value(&FieldValue::StringValue("310".to_string())),
            Some(310.0)
        );
        assert_eq!(
            numeric_value(&FieldValue::StringValue("n/a".to_string())),
            None
        );
        assert_eq!(
            numeric_value(&FieldValue::RealListValue(vec![1.0, 2.0])),
            None
        );
    }

    #[test]
    fn test_parse_number_digit_separators() {
        assert_eq!(parse_number("1_000"), Some(1000.0));
        assert_eq!(parse_number(" 1_250.5 "), Some(1250.5));
        assert_eq!(parse_number("_100"), None);
        assert_eq!(parse_number("100_"), None);
        assert_eq!(parse_number("1__000"), None);
        assert_eq!(parse_number("1_.5"), None);
    }
}
