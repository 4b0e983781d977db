//! Float leaves in human-readable encodings.
//!
//! JSON has no number for infinity or NaN, so those values are written as the
//! strings `"inf"`, `"-inf"` and `"nan"`. Binary encodings keep native floats.

use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub(crate) trait Float: Copy + Serialize + for<'de> Deserialize<'de> {
    fn spelled(self) -> Option<&'static str>;
    fn parse(text: &str) -> Option<Self>;
}

macro_rules! impl_float {
    ($($t:ident),*) => {$(
        impl Float for $t {
            fn spelled(self) -> Option<&'static str> {
                if self.is_nan() {
                    Some("nan")
                } else if self == $t::INFINITY {
                    Some("inf")
                } else if self == $t::NEG_INFINITY {
                    Some("-inf")
                } else {
                    None
                }
            }

            fn parse(text: &str) -> Option<Self> {
                match text {
                    "nan" => Some($t::NAN),
                    "inf" => Some($t::INFINITY),
                    "-inf" => Some($t::NEG_INFINITY),
                    _ => None,
                }
            }
        }
    )*};
}

impl_float!(f32, f64);

struct Repr<T>(T);

impl<T: Float> Serialize for Repr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.spelled() {
            Some(text) if serializer.is_human_readable() => serializer.serialize_str(text),
            _ => self.0.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire<T> {
    Number(T),
    Text(String),
}

impl<'de, T: Float> Deserialize<'de> for Repr<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Wire::<T>::deserialize(deserializer)? {
            Wire::Number(value) => Ok(Repr(value)),
            Wire::Text(text) => T::parse(&text)
                .map(Repr)
                .ok_or_else(|| D::Error::custom(format!("invalid float `{text}`"))),
        }
    }
}

pub(crate) fn serialize<T: Float, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    Repr(*value).serialize(serializer)
}

pub(crate) fn deserialize<'de, T: Float, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
    Repr::deserialize(deserializer).map(|repr| repr.0)
}

/// Fixed-size float arrays (vectors and quaternions).
pub(crate) mod array {
    use super::*;
    use serde::de::Error as _;

    pub(crate) fn serialize<S: Serializer, const N: usize>(
        values: &[f32; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(N)?;
        for value in values {
            tuple.serialize_element(&Repr(*value))?;
        }
        tuple.end()
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[f32; N], D::Error> {
        let values: Vec<Repr<f32>> = Vec::deserialize(deserializer)?;
        let len = values.len();
        let values: Vec<f32> = values.into_iter().map(|repr| repr.0).collect();
        values
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &format!("{N} floats").as_str()))
    }
}
