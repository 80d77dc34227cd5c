use crate::schema::Currency;

/// Renders a monetary amount in the display currency with zero fractional
/// digits.
///
/// USD and EUR use the currency symbol plus a thousands-separated integer
/// rounded to the nearest whole unit. THB abbreviates: amounts of a million
/// or more become `฿<n>M`, a thousand or more become `฿<n>K`, smaller amounts
/// `฿<n>`, always rounded *up* (ceiling), matching how the dashboard has
/// always shown baht.
pub fn format_currency(amount: f64, currency: Currency) -> String {
    match currency {
        Currency::Thb => format_thb(amount),
        Currency::Usd => format_symbol(amount, "$"),
        Currency::Eur => format_symbol(amount, "€"),
    }
}

fn format_thb(amount: f64) -> String {
    if amount >= 1_000_000.0 {
        format!("฿{}M", group_thousands((amount / 1_000_000.0).ceil() as i64))
    } else if amount >= 1_000.0 {
        format!("฿{}K", group_thousands((amount / 1_000.0).ceil() as i64))
    } else {
        format!("฿{}", group_thousands(amount.ceil() as i64))
    }
}

fn format_symbol(amount: f64, symbol: &str) -> String {
    let rounded = amount.round() as i64;
    if rounded < 0 {
        format!("-{}{}", symbol, group_thousands(-rounded))
    } else {
        format!("{}{}", symbol, group_thousands(rounded))
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
