//! Serde adapter encoding `u64` values as decimal strings so that
//! 64-bit seeds survive JSON consumers that truncate large integers.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum U64Input {
        String(String),
        Number(u64),
    }

    match U64Input::deserialize(deserializer)? {
        U64Input::String(raw) => raw.parse::<u64>().map_err(D::Error::custom),
        U64Input::Number(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Seeded {
        #[serde(with = "super")]
        seed: u64,
    }

    #[test]
    fn serializes_as_decimal_string() {
        let encoded = serde_json::to_string(&Seeded { seed: 42 }).expect("serialize");
        assert_eq!(encoded, r#"{"seed":"42"}"#);
    }

    #[test]
    fn deserialize_accepts_string() {
        let parsed: Seeded = serde_json::from_str(r#"{"seed":"1337"}"#).expect("string seed");
        assert_eq!(parsed.seed, 1337);
    }

    #[test]
    fn deserialize_accepts_number() {
        let parsed: Seeded = serde_json::from_str(r#"{"seed":1337}"#).expect("numeric seed");
        assert_eq!(parsed.seed, 1337);
    }
}
