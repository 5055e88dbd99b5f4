//! Custom template filters for notification messages

use minijinja::value::Value;
use minijinja::{Error, ErrorKind, State};
use std::fmt::Write;

/// Register all custom filters with a minijinja Environment
pub fn register_filters(env: &mut minijinja::Environment) {
    env.add_filter("default", filter_default);
    env.add_filter("join", filter_join);
    env.add_filter("currency", filter_currency);
    env.add_filter("strftime", filter_strftime);
}

/// Return a default value if the input is undefined/empty
fn filter_default(_state: &State, value: Value, default: Value) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        Ok(default)
    } else if value.as_str().is_some_and(str::is_empty) {
        Ok(default)
    } else {
        Ok(value)
    }
}

/// Join a sequence with a separator
fn filter_join(_state: &State, value: Value, sep: Option<Value>) -> Result<Value, Error> {
    let separator = sep.as_ref().and_then(|v| v.as_str()).unwrap_or(", ");

    if value.is_undefined() || value.is_none() {
        return Ok(Value::from(""));
    }

    match value.try_iter() {
        Ok(iter) => {
            let parts: Vec<String> = iter.map(|v| v.to_string()).collect();
            Ok(Value::from(parts.join(separator)))
        }
        Err(_) => Ok(Value::from(value.to_string())),
    }
}

/// Format a number as money with two decimals
///
/// Example: `{{ amount | currency }}` → `$150.00`, `{{ amount | currency("€") }}` → `€150.00`
fn filter_currency(_state: &State, value: Value, symbol: Option<Value>) -> Result<Value, Error> {
    let symbol = symbol.as_ref().and_then(|v| v.as_str()).unwrap_or("$");

    let amount = f64::try_from(value.clone())
        .ok()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("currency filter requires a number, got {}", value.kind()),
            )
        })?;

    let sign = if amount < 0.0 { "-" } else { "" };
    Ok(Value::from(format!("{}{}{:.2}", sign, symbol, amount.abs())))
}

/// Format a timestamp using a strftime format string
///
/// Accepts `"now"` or an RFC3339 timestamp.
///
/// Example: `{{ appointment_at | strftime("%b %d at %H:%M") }}`
fn filter_strftime(_state: &State, value: Value, format: Value) -> Result<Value, Error> {
    let format_str = format.as_str().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            "strftime filter requires format string as argument",
        )
    })?;

    let datetime = match value.as_str() {
        Some("now") => chrono::Utc::now(),
        Some(s) => chrono::DateTime::parse_from_rfc3339(s)
            .map_err(|e| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("Failed to parse datetime: {}", e),
                )
            })?
            .with_timezone(&chrono::Utc),
        None => {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "strftime filter requires string input (\"now\" or RFC3339 timestamp)",
            ));
        }
    };

    // Unknown specifiers surface as fmt::Error rather than a panic
    let mut rendered = String::new();
    write!(rendered, "{}", datetime.format(format_str)).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("strftime filter got an invalid format string '{}'", format_str),
        )
    })?;
    Ok(Value::from(rendered))
}
