use crate::cms::CmsItem;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const NAME_KEYS: &[&str] = &["name", "hotel-name", "title"];
pub const SLUG_KEYS: &[&str] = &["slug"];
pub const REGION_KEYS: &[&str] = &["region", "location", "destination", "region-name", "city"];
pub const DESCRIPTION_KEYS: &[&str] = &[
    "description",
    "short-description",
    "summary",
    "excerpt",
    "intro",
];
pub const LATITUDE_KEYS: &[&str] = &["latitude", "lat", "geo-lat"];
pub const LONGITUDE_KEYS: &[&str] = &["longitude", "lng", "lon", "geo-lng"];
pub const IMAGE_KEYS: &[&str] = &[
    "image-url",
    "main-image",
    "featured-image",
    "image",
    "thumbnail",
    "hero-image",
];
pub const BOOKING_KEYS: &[&str] = &["booking-url", "booking-link", "website", "url"];
pub const ROOM_COUNT_KEYS: &[&str] = &["room-count", "rooms", "number-of-rooms"];

pub const HIDDEN_FLAGS: &[&str] = &["archived", "is-closed"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelRecord {
    pub name: String,
    pub slug: String,
    pub region: String,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub booking_url: Option<String>,
    pub room_count: Option<u32>,
}

// Region item id -> display name.
#[derive(Debug, Clone, Default)]
pub struct RegionIndex {
    names: HashMap<String, String>,
}

impl RegionIndex {
    pub fn from_items(regions: &[CmsItem]) -> Self {
        let names = regions
            .iter()
            .filter_map(|item| {
                first_text(item, NAME_KEYS).map(|name| (item.id.clone(), name))
            })
            .collect();
        Self { names }
    }

    pub fn resolve<'a>(&'a self, value: &'a str) -> &'a str {
        self.names.get(value).map(String::as_str).unwrap_or(value)
    }
}

pub fn to_hotel_record(item: &CmsItem, regions: &RegionIndex) -> HotelRecord {
    let region = first_text(item, REGION_KEYS)
        .map(|value| regions.resolve(&value).to_string())
        .unwrap_or_default();

    HotelRecord {
        name: first_text(item, NAME_KEYS).unwrap_or_default(),
        slug: first_text(item, SLUG_KEYS).unwrap_or_else(|| item.id.clone()),
        region,
        description: first_text(item, DESCRIPTION_KEYS).unwrap_or_default(),
        latitude: first_number(item, LATITUDE_KEYS),
        longitude: first_number(item, LONGITUDE_KEYS),
        image_url: first_text(item, IMAGE_KEYS),
        booking_url: first_text(item, BOOKING_KEYS),
        room_count: first_count(item, ROOM_COUNT_KEYS),
    }
}

pub fn is_hidden(item: &CmsItem) -> bool {
    item.is_archived
        || HIDDEN_FLAGS
            .iter()
            .any(|flag| item.field_data.get(*flag).is_some_and(is_truthy))
}

pub fn visible_hotels(items: &[CmsItem], regions: &RegionIndex) -> Vec<HotelRecord> {
    items
        .iter()
        .filter(|item| !is_hidden(item))
        .map(|item| to_hotel_record(item, regions))
        .collect()
}

fn first_text(item: &CmsItem, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| item.field_data.get(*key))
        .find_map(text_value)
}

fn first_number(item: &CmsItem, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| item.field_data.get(*key))
        .find(|value| !is_empty(value))
        .and_then(number_value)
}

fn first_count(item: &CmsItem, keys: &[&str]) -> Option<u32> {
    first_number(item, keys)
        .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("url").and_then(text_value),
        _ => None,
    }
}

fn number_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) fn item(id: &str, field_data: Value) -> CmsItem {
    CmsItem {
        id: id.to_string(),
        is_archived: false,
        field_data: field_data.as_object().cloned().unwrap_or_default(),
    }
}
