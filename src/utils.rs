use statrs::statistics::Statistics;

/// Log at info level, keeping ANSI colours only when `$colorful` is set.
#[macro_export]
macro_rules! cinfo {
    ($colorful:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        if $colorful {
            log::info!("{}", message);
        } else {
            log::info!("{}", $crate::utils::strip_ansi(&message));
        }
    }};
}

/// Remove `ESC [ ... <letter>` colour sequences from a message.
pub fn strip_ansi(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Write a float the way pandas does in TSV output: integral values keep a
/// trailing `.0`, missing values are empty.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.is_infinite() {
        if value > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Parse a TSV cell, reading the usual missing-value markers as NaN.
pub fn parse_float(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    match cell {
        "" | "NA" | "NaN" | "nan" | "null" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => cell.parse::<f64>().ok(),
    }
}

/// Mean and population standard deviation (ddof = 0) of the finite values.
pub fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = finite.iter().mean();
    let std = finite.iter().population_std_dev();
    (mean, std)
}

/// Sample standard deviation (ddof = 1), skipping NaN like pandas does.
pub fn sample_std(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).std_dev()
}
