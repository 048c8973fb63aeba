// Per-provider extraction of ride options from raw provider blocks

use crate::category::CategoryClassifier;
use crate::config::{EtaPolicy, PriceBand, ProviderConfig};
use crate::raw_response::{RawOption, RawPrice, RawProviderBlock};
use crate::ride::{live_ride_id, RideOption, RideSource};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extraction {
    pub options: Vec<RideOption>,
    pub had_data: bool,
}

/// Extracts the usable options of one provider.
///
/// Entries without a fleet label or without a resolvable price are skipped.
/// `had_data` is true iff at least one option survived.
pub fn extract(
    provider: &ProviderConfig,
    block: &RawProviderBlock<'_>,
    classifier: &CategoryClassifier,
) -> Extraction {
    let raw_options = match block {
        RawProviderBlock::Options(options) => options,
        RawProviderBlock::Failed { error } => {
            debug!(provider = %provider.name, error = %error, "provider reported an error");
            return Extraction::default();
        }
        RawProviderBlock::Empty => {
            debug!(provider = %provider.name, "no options in provider block");
            return Extraction::default();
        }
    };

    let options: Vec<RideOption> = raw_options
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| extract_option(provider, index, raw, classifier))
        .collect();

    debug!(
        provider = %provider.name,
        raw = raw_options.len(),
        extracted = options.len(),
        "provider options extracted"
    );

    Extraction {
        had_data: !options.is_empty(),
        options,
    }
}

fn extract_option(
    provider: &ProviderConfig,
    index: usize,
    raw: &RawOption<'_>,
    classifier: &CategoryClassifier,
) -> Option<RideOption> {
    let Some(fleet) = raw.fleet() else {
        debug!(provider = %provider.name, index, "skipping option without fleet label");
        return None;
    };
    let Some(price) = raw.price(&provider.price_keys) else {
        debug!(provider = %provider.name, index, fleet, "skipping option without price");
        return None;
    };

    Some(RideOption {
        id: live_ride_id(&provider.name, index),
        company: provider.name.clone(),
        fleet_type: fleet.to_string(),
        eta: resolve_eta(&provider.eta_policy, raw.eta()),
        price: display_price(price, provider),
        category: classifier.classify(fleet).to_string(),
        source: RideSource::Live,
    })
}

pub fn resolve_eta(policy: &EtaPolicy, raw_eta: Option<&str>) -> String {
    match policy {
        EtaPolicy::Passthrough => raw_eta.unwrap_or_default().to_string(),
        EtaPolicy::Placeholder(text) => text.clone(),
        EtaPolicy::Empty => String::new(),
    }
}

fn display_price(price: RawPrice<'_>, provider: &ProviderConfig) -> String {
    let symbol = provider.currency_symbol.as_str();
    match (price, &provider.price_band) {
        (RawPrice::Amount(amount), Some(band)) => price_band(amount, band, symbol),
        (RawPrice::Amount(amount), None) => format!("{}{}", symbol, format_amount(amount)),
        (RawPrice::Text(text), Some(band)) => match numbers_in(text).as_slice() {
            [point] => price_band(*point, band, symbol),
            _ => text.to_string(),
        },
        (RawPrice::Text(text), None) => text.to_string(),
    }
}

/// Display range around a point estimate: `point ∓ delta`, floored and ceiled
/// to whole units, lower bound clamped at zero.
pub fn price_band(point: f64, band: &PriceBand, symbol: &str) -> String {
    let low = (point - band.delta).floor().max(0.0);
    let high = (point + band.delta).ceil().max(low);
    format!(
        "{symbol}{:.0}{}{symbol}{:.0}",
        low,
        band.separator,
        high,
        symbol = symbol
    )
}

fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{:.0}", amount)
    } else {
        format!("{:.2}", amount)
    }
}

// Numbers appearing in a price string; `,` inside digit runs is a thousands separator
pub fn numbers_in(text: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let next_is_digit = chars.peek().map_or(false, |n| n.is_ascii_digit());
        match c {
            '0'..='9' => current.push(c),
            '.' if !current.is_empty() && !current.contains('.') && next_is_digit => current.push(c),
            ',' if !current.is_empty() && next_is_digit => {}
            _ => {
                if let Ok(number) = current.parse() {
                    numbers.push(number);
                }
                current.clear();
            }
        }
    }
    if let Ok(number) = current.parse() {
        numbers.push(number);
    }

    numbers
}
