use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fake::Fake;
use fake::faker::address::en::{BuildingNumber, CityName, StateAbbr, StreetName, ZipCode};
use fake::faker::phone_number::en::PhoneNumber;
use rand::{Rng, RngCore};
use rand_chacha::ChaCha8Rng;
use serde_json::{Value, json};

use crate::catalog::Coding;

pub(crate) const UCUM: &str = "http://unitsofmeasure.org";

pub(crate) fn random_uuid(rng: &mut ChaCha8Rng) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).to_string()
}

pub(crate) fn coding(item: &Coding) -> Value {
    json!({"system": item.system, "code": item.code, "display": item.display})
}

pub(crate) fn concept(item: &Coding) -> Value {
    json!({"coding": [coding(item)], "text": item.display})
}

pub(crate) fn fixed_concept(system: &str, code: &str, display: &str) -> Value {
    json!({"coding": [{"system": system, "code": code, "display": display}], "text": display})
}

pub(crate) fn text_concept(text: &str) -> Value {
    json!({"text": text})
}

/// Day within the `days` preceding `reference`, inclusive.
pub(crate) fn date_within(rng: &mut ChaCha8Rng, reference: NaiveDate, days: i64) -> NaiveDate {
    reference - Duration::days(rng.random_range(0..=days))
}

/// Instant within the `days` preceding `reference`, during office hours.
pub(crate) fn instant_within(
    rng: &mut ChaCha8Rng,
    reference: NaiveDate,
    days: i64,
) -> NaiveDateTime {
    let day = date_within(rng, reference, days);
    let seconds = rng.random_range(8 * 3600..18 * 3600);
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default();
    day.and_time(time)
}

pub(crate) fn instant(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub(crate) fn pick<'a>(rng: &mut ChaCha8Rng, options: &[&'a str]) -> &'a str {
    options[rng.random_range(0..options.len())]
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn phone(rng: &mut ChaCha8Rng) -> Value {
    let number: String = PhoneNumber().fake_with_rng(rng);
    json!([{"system": "phone", "value": number, "use": "work"}])
}

pub(crate) fn address(rng: &mut ChaCha8Rng) -> Value {
    let number: String = BuildingNumber().fake_with_rng(rng);
    let street: String = StreetName().fake_with_rng(rng);
    let city: String = CityName().fake_with_rng(rng);
    let state: String = StateAbbr().fake_with_rng(rng);
    let zip: String = ZipCode().fake_with_rng(rng);
    json!([{
        "line": [format!("{number} {street}")],
        "city": city,
        "state": state,
        "postalCode": zip,
        "country": "US"
    }])
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn uuids_are_v4_and_seeded() {
        let mut a = ChaCha8Rng::seed_from_u64(4);
        let mut b = ChaCha8Rng::seed_from_u64(4);
        let first = random_uuid(&mut a);
        assert_eq!(first, random_uuid(&mut b));
        let parsed = uuid::Uuid::parse_str(&first).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(first, random_uuid(&mut a));
    }

    #[test]
    fn dates_stay_before_reference() {
        let reference = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..500 {
            let day = date_within(&mut rng, reference, 30);
            assert!(day <= reference);
            assert!(day >= reference - Duration::days(30));
        }
        assert_eq!(
            instant(reference.and_hms_opt(9, 5, 0).unwrap()),
            "2025-01-01T09:05:00Z"
        );
    }
}
