// Loosely-typed aggregate responses from the ride-price backend
//
// Nothing in here fails: a shape that is not understood simply carries no
// data for any provider.

use serde_json::{Map, Value};
use tracing::debug;

// Keys tried for the fleet label of a raw option, in order
pub const FLEET_KEYS: [&str; 4] = ["fleet", "fleet_type", "fleetType", "name"];
pub const ETA_KEYS: [&str; 2] = ["eta", "eta_text"];

/// Top-level shape of an aggregate response once envelopes are removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestedResponse<'a> {
    ProviderMap(&'a Map<String, Value>),
    FlatList(&'a [Value]),
    Unrecognized,
}

// Answers whether a top-level key names a configured provider
pub type ProviderKeys<'p> = &'p dyn Fn(&str) -> bool;

// A pure predicate plus transform; detectors are tried in order until one matches
struct ShapeDetector {
    name: &'static str,
    matches: fn(&Value, ProviderKeys<'_>) -> bool,
    apply: for<'a, 'p> fn(&'a Value, ProviderKeys<'p>) -> IngestedResponse<'a>,
}

const DETECTORS: [ShapeDetector; 3] = [
    ShapeDetector {
        name: "data-envelope",
        matches: is_data_envelope,
        apply: unwrap_data_envelope,
    },
    ShapeDetector {
        name: "flat-list",
        matches: |value, _| value.is_array(),
        apply: as_flat_list,
    },
    ShapeDetector {
        name: "provider-map",
        matches: |value, _| value.is_object(),
        apply: as_provider_map,
    },
];

// `data` is an envelope when it holds a list or a provider map, or when the
// outer object has no provider keys of its own
fn is_data_envelope(value: &Value, is_provider: ProviderKeys<'_>) -> bool {
    let Some(outer) = value.as_object() else {
        return false;
    };
    match outer.get("data") {
        Some(Value::Array(_)) => true,
        Some(Value::Object(inner)) => {
            inner.keys().any(|key| is_provider(key.as_str()))
                || !outer.keys().any(|key| is_provider(key.as_str()))
        }
        _ => false,
    }
}

// Unwraps exactly one level: the inner value only sees the detectors after this one
fn unwrap_data_envelope<'a>(value: &'a Value, is_provider: ProviderKeys<'_>) -> IngestedResponse<'a> {
    match value.get("data") {
        Some(inner) => detect(inner, &DETECTORS[1..], is_provider),
        None => IngestedResponse::Unrecognized,
    }
}

fn as_flat_list<'a>(value: &'a Value, _: ProviderKeys<'_>) -> IngestedResponse<'a> {
    match value {
        Value::Array(items) => IngestedResponse::FlatList(items),
        _ => IngestedResponse::Unrecognized,
    }
}

fn as_provider_map<'a>(value: &'a Value, _: ProviderKeys<'_>) -> IngestedResponse<'a> {
    match value {
        Value::Object(map) => IngestedResponse::ProviderMap(map),
        _ => IngestedResponse::Unrecognized,
    }
}

fn detect<'a>(
    value: &'a Value,
    detectors: &[ShapeDetector],
    is_provider: ProviderKeys<'_>,
) -> IngestedResponse<'a> {
    for detector in detectors {
        if (detector.matches)(value, is_provider) {
            debug!(shape = detector.name, "aggregate response shape detected");
            return (detector.apply)(value, is_provider);
        }
    }
    debug!("aggregate response shape not recognized");
    IngestedResponse::Unrecognized
}

pub fn ingest<'a>(response: &'a Value, is_provider: ProviderKeys<'_>) -> IngestedResponse<'a> {
    detect(response, &DETECTORS, is_provider)
}

/// One provider's block of the aggregate response.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProviderBlock<'a> {
    Options(Vec<RawOption<'a>>),
    Failed { error: &'a str },
    Empty,
}

impl<'a> RawProviderBlock<'a> {
    // An `options` sequence wins over `error`/`success`; a bare array is the options list itself
    pub fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => Self::from_items(items),
            Value::Object(map) => match map.get("options") {
                Some(Value::Array(items)) => Self::from_items(items),
                _ => match map.get("error").and_then(Value::as_str) {
                    Some(error) => RawProviderBlock::Failed { error },
                    None => RawProviderBlock::Empty,
                },
            },
            _ => RawProviderBlock::Empty,
        }
    }

    fn from_items(items: &'a [Value]) -> Self {
        RawProviderBlock::Options(items.iter().map(RawOption::new).collect())
    }

    pub fn options(&self) -> &[RawOption<'a>] {
        match self {
            RawProviderBlock::Options(options) => options,
            _ => &[],
        }
    }
}

// A price as found in the raw option, before display formatting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawPrice<'a> {
    Text(&'a str),
    Amount(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawOption<'a> {
    entry: &'a Value,
}

impl<'a> RawOption<'a> {
    pub fn new(entry: &'a Value) -> Self {
        Self { entry }
    }

    fn text(&self, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .filter_map(|key| self.entry.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|text| !text.is_empty())
    }

    pub fn fleet(&self) -> Option<&'a str> {
        self.text(&FLEET_KEYS)
    }

    pub fn eta(&self) -> Option<&'a str> {
        self.text(&ETA_KEYS)
    }

    /// First resolvable price among `keys`.
    ///
    /// Text must carry at least one digit, so scraper placeholders such as
    /// `"N/A"` or `"Select Time"` do not count as a price.
    pub fn price(&self, keys: &[String]) -> Option<RawPrice<'a>> {
        keys.iter().find_map(|key| match self.entry.get(key.as_str())? {
            Value::String(text) => {
                let text = text.trim();
                text.chars()
                    .any(|c| c.is_ascii_digit())
                    .then_some(RawPrice::Text(text))
            }
            Value::Number(number) => number
                .as_f64()
                .filter(|amount| amount.is_finite())
                .map(RawPrice::Amount),
            _ => None,
        })
    }

    // Provider attribution for flat-list items
    pub fn service(&self) -> Option<&'a str> {
        self.text(&["service", "company", "provider"])
    }

    pub fn value(&self) -> &'a Value {
        self.entry
    }
}
