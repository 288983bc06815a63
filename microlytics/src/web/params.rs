//! Query parameter parsing.

use url::Url;

use crate::database::{Params, Property, TimeRange};

use super::error::RequestError;

/// Friendly property names exposed over HTTP, mapped onto the store's
/// column whitelist.
pub fn property_from(name: &str) -> Result<Property, RequestError> {
    let column = match name {
        "countries" => "countryCode",
        "platforms" => "platform",
        "domains" => "refererDomain",
        "events" => "event",
        _ => return Err(RequestError::InvalidProperty),
    };

    Property::from_column(column).ok_or(RequestError::InvalidProperty)
}

/// Resolve a request URL into driver parameters.
pub fn parse(db_name: &str, url: &Url) -> Result<Params, RequestError> {
    let get = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    let time_range = TimeRange::parse(get("start").as_deref(), get("end").as_deref())?;

    let interval = match get("interval") {
        None => 86400,
        Some(raw) => match raw.parse::<i64>() {
            Ok(interval) if interval > 0 => interval,
            _ => return Err(RequestError::InvalidInterval),
        },
    };

    let unique = matches!(get("unique").as_deref(), Some("true") | Some("1"));
    let cache = get("cache").is_some();

    Ok(Params {
        db_name: db_name.into(),
        time_range,
        interval,
        property: None,
        unique,
        cache,
        url: url.clone(),
    })
}
