use chrono::{Days, NaiveDate};

/// Format a number with two decimals, a space as thousands separator and a
/// comma as decimal separator.
///
/// # Examples
///
/// ```
/// use meter_report::formatting::pretty_float;
///
/// assert_eq!(pretty_float(1234.5), "1 234,50");
/// assert_eq!(pretty_float(-1234567.891), "-1 234 567,89");
/// assert_eq!(pretty_float(0.0), "0,00");
/// ```
pub fn pretty_float(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (integer, fraction) = digits.split_once('.').unwrap_or((digits, "00"));

    format!("{}{},{}", sign, group_thousands(integer), fraction)
}

/// Reading date as shown in report tables, e.g. `01. 02. 2023`.
pub fn date_to_string(date: NaiveDate) -> String {
    date.format("%d. %m. %Y").to_string()
}

/// Month label, e.g. `02.2023`.
pub fn month_to_string(date: NaiveDate) -> String {
    date.format("%m.%Y").to_string()
}

/// Label of the month whose consumption ends at the `boundary` month start.
///
/// A delta dated 1 March covers February, so it is labelled `02.2023`.
pub fn consumption_month_label(boundary: NaiveDate) -> String {
    let inside = boundary.checked_sub_days(Days::new(1)).unwrap_or(boundary);
    month_to_string(inside)
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }

    out
}
