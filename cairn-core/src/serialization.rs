//! Canonical JSON encoding of manifest payloads.
//!
//! `serde_json` writes NaN and infinities as `null`; payloads carrying them are
//! rejected up front so a stored manifest never differs from what was put.

use std::fmt;

use serde::{de::DeserializeOwned, ser, Serialize};

use crate::error::{Error, Result};

/// Serialize a caller value into its canonical payload form
#[inline]
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value> {
    let payload = serde_json::to_value(value).map_err(|e| Error::Marshal {
        message: e.to_string(),
    })?;
    value.serialize(FiniteFloats).map_err(|e| Error::Marshal {
        message: e.to_string(),
    })?;
    Ok(payload)
}

/// Deserialize a stored payload into the caller's requested shape
#[inline]
pub fn from_payload<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| Error::Marshal {
        message: e.to_string(),
    })
}

#[derive(Debug)]
struct NonFinite(String);

impl fmt::Display for NonFinite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NonFinite {}

impl ser::Error for NonFinite {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        NonFinite(msg.to_string())
    }
}

/// Serializer that only visits a value, failing on non-finite floats
#[derive(Clone, Copy)]
struct FiniteFloats;

type Visit = std::result::Result<(), NonFinite>;

fn check_float(value: f64) -> Visit {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NonFinite(format!("{} cannot be represented in JSON", value)))
    }
}

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Visit {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Visit {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Visit {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Visit {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Visit {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Visit {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Visit {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Visit {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Visit {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Visit {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Visit {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Visit {
        check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Visit {
        check_float(v)
    }

    fn serialize_char(self, _: char) -> Visit {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Visit {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Visit {
        Ok(())
    }

    fn serialize_none(self) -> Visit {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Visit {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Visit {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Visit {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Visit {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Visit {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Visit {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Visit {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Visit {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Visit {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Visit {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Visit {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Visit {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Visit {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Visit {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Visit {
        key.serialize(FiniteFloats)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Visit {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Visit {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Visit {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Visit {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Visit {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Visit {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_roundtrip() {
        let mut item = HashMap::new();
        item.insert("foo".to_string(), 1);
        item.insert("bar".to_string(), 2);

        let payload = to_payload(&item).unwrap();
        let back: HashMap<String, i32> = from_payload(&payload).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_non_string_keys_fail() {
        let mut item = HashMap::new();
        item.insert((1, 2), "pair");

        let err = to_payload(&item).unwrap_err();
        assert!(err.to_string().contains("marshal error"), "{}", err);
    }

    #[test]
    fn test_non_finite_floats_fail() {
        let cases: Vec<Result<serde_json::Value>> = vec![
            to_payload(&f64::NAN),
            to_payload(&f32::INFINITY),
            to_payload(&vec![1.0, f64::NEG_INFINITY]),
            to_payload(&Some(HashMap::from([("ratio".to_string(), f64::NAN)]))),
        ];

        for result in cases {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::Marshal { .. }), "{}", err);
        }

        let payload = to_payload(&HashMap::from([("ratio".to_string(), 0.5)])).unwrap();
        assert_eq!(payload, serde_json::json!({"ratio": 0.5}));
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let payload = serde_json::json!({"foo": "not a number"});
        let err = from_payload::<HashMap<String, i32>>(&payload).unwrap_err();
        assert!(matches!(err, Error::Marshal { .. }));
    }
}
