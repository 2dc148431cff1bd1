// Bit-rate formatting for the per-second report
// (c) 2024 Ross Younger

const UNITS: [&str; 4] = ["bit/s", "kbit/s", "mbit/s", "gbit/s"];

/// Significant digits in the rendered magnitude
const SIGNIFICANT_DIGITS: usize = 4;

/// Converts a byte count (per second) into a bit rate string.
///
/// The largest unit is chosen that keeps the magnitude at or below 1024,
/// stopping at gbit/s however large the value gets.
/// The number is rendered like C's `%.4g`.
///
/// ```
/// assert_eq!(quicperf::harness::format_size(192.), "1.5 kbit/s");
/// assert_eq!(quicperf::harness::format_size(125_000_000.), "953.7 mbit/s");
/// ```
#[must_use]
pub fn format_size(bytes: f64) -> String {
    let mut magnitude = bytes * 8.;
    let mut unit = 0;
    while unit < UNITS.len() - 1 && magnitude > 1024. {
        magnitude /= 1024.;
        unit += 1;
    }
    format!("{} {}", general_format(magnitude), UNITS[unit])
}

/// `%.4g`: fixed or exponent notation depending on the decimal exponent, trailing zeros removed.
fn general_format(value: f64) -> String {
    if value == 0. {
        return "0".into();
    }
    // Let the formatter do the rounding; the exponent it reports already accounts for carries (9999.9 -> 1.000e4).
    let sci = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let precision = SIGNIFICANT_DIGITS as i32;
    if exponent < -4 || exponent >= precision {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        #[allow(clippy::cast_sign_loss)]
        let decimals = (precision - 1 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
