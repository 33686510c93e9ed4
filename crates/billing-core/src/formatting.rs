//! Plain-text number formatting for the summary output.

use crate::models::Breakdown;

/// Format `value` with thousands separators and exactly `decimals` places.
///
/// # Examples
///
/// ```
/// use billing_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5, 1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::with_capacity(fixed.len() + fixed.len() / 3 + 1);
    // Zero after rounding never carries a minus sign.
    if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Format a billed amount with two decimals. No currency symbol is attached
/// since exports are currency-agnostic.
pub fn format_amount(amount: f64) -> String {
    format_number(amount, 2)
}

/// Format a value according to the active breakdown metric.
///
/// Costs always show two decimals; quantities drop the fraction when it is
/// zero.
pub fn format_metric(value: f64, breakdown: Breakdown) -> String {
    match breakdown {
        Breakdown::Cost => format_amount(value),
        Breakdown::Quantity if value.fract() == 0.0 => format_number(value, 0),
        Breakdown::Quantity => format_number(value, 2),
    }
}

/// `(part / whole) * 100` rounded to `decimal_places`; `0.0` when `whole` is zero.
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let factor = 10_f64.powi(decimal_places as i32);
    ((part / whole) * 100.0 * factor).round() / factor
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
