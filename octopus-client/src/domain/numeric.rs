//! Numeric coercion for API values that arrive either as JSON numbers or as
//! numeric strings (GraphQL decimals, some REST payloads).

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn coerce<E: de::Error>(self) -> Result<f64, E> {
        match self {
            Self::Number(v) => Ok(v),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a numeric value, got {s:?}"))),
        }
    }
}

pub fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Numeric::deserialize(deserializer)?.coerce()
}

pub fn opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Numeric>::deserialize(deserializer)?
        .map(Numeric::coerce)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "f64_lenient")]
        value: f64,
        #[serde(default, deserialize_with = "opt_f64_lenient")]
        maybe: Option<f64>,
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let p: Sample = serde_json::from_str(r#"{"value": 28.5, "maybe": "45.0"}"#).unwrap();
        assert_eq!(p.value, 28.5);
        assert_eq!(p.maybe, Some(45.0));

        let p: Sample = serde_json::from_str(r#"{"value": " 3 "}"#).unwrap();
        assert_eq!(p.value, 3.0);
        assert_eq!(p.maybe, None);
    }

    #[test]
    fn integers_coerce_to_float() {
        let p: Sample = serde_json::from_str(r#"{"value": 12, "maybe": null}"#).unwrap();
        assert_eq!(p.value, 12.0);
        assert_eq!(p.maybe, None);
    }

    #[test]
    fn rejects_non_numeric_strings() {
        let err = serde_json::from_str::<Sample>(r#"{"value": "n/a"}"#)
            .err()
            .expect("non-numeric string must fail");
        assert!(err.to_string().contains("expected a numeric value"));
    }
}
