//! Seeds as JSON strings.
//!
//! A full 64-bit seed does not survive tooling that reads JSON numbers as
//! doubles, so the engine config writes the seed as a decimal string and
//! accepts either form on the way back in.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Value(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text.parse::<u64>().map_err(D::Error::custom),
        Raw::Value(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Keyed {
        #[serde(with = "super")]
        seed: u64,
    }

    #[test]
    fn large_seed_survives_a_json_round_trip() {
        let original = Keyed { seed: u64::MAX };
        let raw = serde_json::to_string(&original).expect("serialize");
        assert_eq!(raw, format!(r#"{{"seed":"{}"}}"#, u64::MAX));
        let back: Keyed = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back, original);
    }

    #[test]
    fn plain_number_still_parses() {
        let parsed: Keyed = serde_json::from_str(r#"{"seed":1337}"#).expect("numeric seed");
        assert_eq!(parsed.seed, 1337);
    }

    #[test]
    fn non_numeric_seed_is_rejected() {
        assert!(serde_json::from_str::<Keyed>(r#"{"seed":"a-word"}"#).is_err());
    }
}
