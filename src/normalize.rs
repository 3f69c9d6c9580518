//! Raw register units to display units.
//!
//! Downstream consumers treat these values as final display state, so every
//! rounding step is done here and nowhere else.

const KELVIN_OFFSET: f64 = 273.15;

/// mV to V, mA to A, mAh to Ah.
pub const MILLI: f64 = 0.001;
/// 10 mA to A, 10 mAh to Ah.
pub const CENTI: f64 = 0.01;
/// 0.1 °C to °C.
pub const DECI: f64 = 0.1;
/// mW to kW.
pub const MICRO: f64 = 0.000_001;
pub const UNIT: f64 = 1.0;

/// Rounds to `decimals` places, exact ties to the even neighbour.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

/// Applies a unit factor to an already sign-extended raw value.
///
/// Fractional factors divide by their integral inverse, so `53125` mV is
/// exactly `53.125` V before rounding.
pub fn scale(raw: i64, factor: f64, decimals: u32) -> f64 {
    let value = if factor < 1.0 {
        raw as f64 / (1.0 / factor).round()
    } else {
        raw as f64 * factor
    };
    round_to(value, decimals)
}

/// Tenths of a Kelvin to degree Celsius with two decimals.
pub fn decikelvin_to_celsius(raw: u16) -> f64 {
    round_to(raw as f64 / 10.0 - KELVIN_OFFSET, 2)
}

/// Pack power in kW from volts and amps.
pub fn power_kw(voltage: f64, current: f64) -> f64 {
    round_to(voltage * current / 1000.0, 4)
}

/// Energy in Wh moved by `power_kw` over `seconds`.
pub fn energy_wh(power_kw: f64, seconds: f64) -> f64 {
    power_kw.abs() * seconds / 3600.0 * 1000.0
}

/// `part / whole * 100`, zero when `whole` is not positive.
pub fn percentage(part: f64, whole: f64, decimals: u32) -> f64 {
    if whole > 0.0 {
        round_to(part / whole * 100.0, decimals)
    } else {
        0.0
    }
}

/// Mean of `values` rounded to `decimals`, zero for an empty slice.
pub fn mean(values: impl ExactSizeIterator<Item = f64>, decimals: u32) -> f64 {
    let count = values.len();
    if count == 0 {
        return 0.0;
    }
    round_to(values.sum::<f64>() / count as f64, decimals)
}

/// ASCII text with non-printable characters dropped and surrounding
/// whitespace trimmed. Nothing left reads as `"Unknown"`.
pub fn printable_text(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|b| char::from(*b))
        .collect();
    match text.trim() {
        "" => String::from("Unknown"),
        trimmed => trimmed.to_string(),
    }
}
