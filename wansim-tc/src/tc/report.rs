//! Parsing the output of `tc qdisc show`.
//!
//! A report for all interfaces has one record per line, for example:
//!
//! ```text
//! qdisc noqueue 0: dev lo root refcnt 2
//! qdisc netem 8001: dev left1 root refcnt 2 limit 1000 delay 50ms loss 10%
//! ```
//!
//! The report for a single interface is treated as one record. The inspector only cares about
//! the values following the `loss` and `delay` keywords.

use crate::iface::{is_excluded, Interface};

/// Position of the device name within a record of the all-interfaces report.
const NAME_TOKEN_INDEX: usize = 4;

/// A report that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectionError {
    /// A keyword ends the record.
    #[error("missing value after {keyword:?}")]
    MissingValue {
        /// `loss` or `delay`.
        keyword: &'static str,
    },
    /// The value after a keyword does not parse.
    #[error("invalid {keyword} value {value:?}")]
    InvalidValue {
        /// `loss` or `delay`.
        keyword: &'static str,
        /// The offending token.
        value: String,
    },
    /// A record of the all-interfaces report is too short to carry a name.
    #[error("record has no interface name at token {NAME_TOKEN_INDEX}: {record:?}")]
    MissingName {
        /// The offending line.
        record: String,
    },
}

/// Result of parsing a report.
pub type Result<T> = std::result::Result<T, InspectionError>;

/// Parses the report of `tc qdisc show dev <name>`.
pub fn parse_one(name: &str, report: &str) -> Result<Interface> {
    let tokens: Vec<&str> = report.split_whitespace().collect();
    parse_record(name, &tokens)
}

/// Parses the report of `tc qdisc show`, skipping excluded interfaces.
pub fn parse_all(report: &str) -> Result<Vec<Interface>> {
    let mut interfaces = Vec::new();

    for line in report.lines().filter(|l| !l.trim().is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let name = tokens
            .get(NAME_TOKEN_INDEX)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| InspectionError::MissingName { record: line.to_string() })?;

        if is_excluded(name) {
            continue;
        }

        interfaces.push(parse_record(name, &tokens)?);
    }

    Ok(interfaces)
}

fn parse_record(name: &str, tokens: &[&str]) -> Result<Interface> {
    let mut iface = Interface::new(name);

    if let Some(value) = value_after(tokens, "loss")? {
        iface.loss = Some(parse_loss(value)?);
    }
    if let Some(value) = value_after(tokens, "delay")? {
        iface.delay = Some(parse_delay(value)?);
    }

    Ok(iface)
}

/// Returns the token following the first occurrence of `keyword`.
fn value_after<'a>(tokens: &[&'a str], keyword: &'static str) -> Result<Option<&'a str>> {
    match tokens.iter().position(|t| *t == keyword) {
        Some(i) => tokens.get(i + 1).copied().map(Some).ok_or(InspectionError::MissingValue { keyword }),
        None => Ok(None),
    }
}

/// Parses `10%` into `10`.
fn parse_loss(value: &str) -> Result<u32> {
    value
        .strip_suffix('%')
        .unwrap_or(value)
        .parse()
        .map_err(|_| InspectionError::InvalidValue { keyword: "loss", value: value.to_string() })
}

/// Parses a delay into whole milliseconds, truncating.
///
/// `tc` picks the unit itself: `50ms`, `50.5ms`, `1s`, `2.5s` or `500us`. It prints three
/// significant digits, so from one second on the value read back is only accurate to 10ms: a
/// 1234ms delay reads back as 1230ms, 2999ms as 3000ms.
fn parse_delay(value: &str) -> Result<u32> {
    let invalid = || InspectionError::InvalidValue { keyword: "delay", value: value.to_string() };

    let (number, scale) = if let Some(n) = value.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("us") {
        (n, 1e-3)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1e3)
    } else {
        return Err(invalid());
    };

    let ms = number.parse::<f64>().map_err(|_| invalid())? * scale;
    if !ms.is_finite() || ms < 0.0 {
        return Err(invalid());
    }

    // Round away float noise like 2.3 * 1000 = 2299.9999999999995 before truncating.
    Ok((ms + 1e-6).trunc() as u32)
}
