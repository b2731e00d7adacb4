use crate::normalize::HotelRecord;
use std::fmt::Write;

pub const MAX_PROMPT_HOTELS: usize = 100;

pub struct GazetteerEntry {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
}

pub const GAZETTEER: &[GazetteerEntry] = &[
    GazetteerEntry { name: "Portugal", lat: 39.5, lng: -8.0, zoom: 6.0 },
    GazetteerEntry { name: "Lisbon", lat: 38.7223, lng: -9.1393, zoom: 12.0 },
    GazetteerEntry { name: "Sintra", lat: 38.8029, lng: -9.3817, zoom: 12.0 },
    GazetteerEntry { name: "Porto", lat: 41.1579, lng: -8.6291, zoom: 12.0 },
    GazetteerEntry { name: "Douro Valley", lat: 41.1621, lng: -7.7887, zoom: 10.0 },
    GazetteerEntry { name: "Comporta", lat: 38.38, lng: -8.786, zoom: 11.0 },
    GazetteerEntry { name: "Alentejo", lat: 38.5667, lng: -7.9, zoom: 8.0 },
    GazetteerEntry { name: "Algarve", lat: 37.0179, lng: -7.9304, zoom: 9.0 },
    GazetteerEntry { name: "Madeira", lat: 32.7607, lng: -16.9595, zoom: 10.0 },
    GazetteerEntry { name: "Azores", lat: 37.7412, lng: -25.6756, zoom: 8.0 },
];

const BRAND_VOICE: &str = concat!(
    "You are the concierge for a collection of independent boutique hotels. ",
    "Speak warmly and concisely, like a well-travelled friend who knows every property personally. ",
    "Recommend only hotels from the list below and refer to them by their exact name. ",
    "Keep answers under 120 words, avoid prices and availability promises, ",
    "and point guests to the booking page when they are ready to reserve.",
);

const REPLY_FORMAT: &str = concat!(
    "Always answer with a single JSON object and nothing else:\n",
    "{\"message\": \"<your reply to the guest>\", ",
    "\"hotels\": [\"<slug>\", ...], ",
    "\"mapAction\": {\"type\": \"flyTo\", \"lat\": <number>, \"lng\": <number>, \"zoom\": <number>} or null}\n",
    "Use only slugs from the hotel list. Use region coordinates from the region list for mapAction.",
);

// Same hotels in, byte-identical prompt out.
pub fn build_system_prompt(hotels: &[HotelRecord]) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(BRAND_VOICE);

    prompt.push_str("\n\n## Regions\n");
    for region in GAZETTEER {
        let _ = writeln!(
            prompt,
            "- {}: lat {}, lng {}, zoom {}",
            region.name, region.lat, region.lng, region.zoom
        );
    }

    let shown = hotels.len().min(MAX_PROMPT_HOTELS);
    let _ = write!(
        prompt,
        "\n## Hotels ({shown} of {})\nname | region | slug\n",
        hotels.len()
    );
    for hotel in hotels.iter().take(MAX_PROMPT_HOTELS) {
        let _ = writeln!(prompt, "{} | {} | {}", hotel.name, hotel.region, hotel.slug);
    }

    prompt.push_str("\n## Reply format\n");
    prompt.push_str(REPLY_FORMAT);
    prompt
}
