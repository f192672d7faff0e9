//! Leaf value conversion.

use std::any::Any;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use entmap_types::{Dynamic, RawKey, Scalar};

use crate::error::FieldError;

/// Converts one Rust type to and from a scalar.
///
/// Implement this and register it with [`crate::ValueFactory`] to teach the
/// engine a new leaf type.
pub trait ValueConverter: Send + Sync + 'static {
    type Value: Any + Send;

    fn save_value(&self, value: &Self::Value) -> Result<Scalar, FieldError>;

    fn load_value(&self, scalar: &Scalar) -> Result<Self::Value, FieldError>;
}

/// Type-erased [`ValueConverter`].
pub trait ValueCodec: Send + Sync {
    fn save(&self, value: &dyn Any) -> Result<Scalar, FieldError>;

    fn load(&self, scalar: &Scalar) -> Result<Dynamic, FieldError>;
}

impl<C: ValueConverter> ValueCodec for C {
    fn save(&self, value: &dyn Any) -> Result<Scalar, FieldError> {
        let value = value
            .downcast_ref::<C::Value>()
            .ok_or_else(FieldError::access::<C::Value>)?;
        self.save_value(value)
    }

    fn load(&self, scalar: &Scalar) -> Result<Dynamic, FieldError> {
        self.load_value(scalar).map(|v| Box::new(v) as Dynamic)
    }
}

// ---------------------------------------------------------------------------
// Built-in scalars
// ---------------------------------------------------------------------------

/// A Rust type with a canonical scalar representation.
pub trait ScalarValue: Any + Send + Sized {
    fn to_scalar(&self) -> Scalar;

    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError>;
}

/// Converter for any [`ScalarValue`].
pub struct ScalarConverter<T>(PhantomData<fn() -> T>);

impl<T> ScalarConverter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ScalarConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ScalarValue> ValueConverter for ScalarConverter<T> {
    type Value = T;

    fn save_value(&self, value: &T) -> Result<Scalar, FieldError> {
        Ok(value.to_scalar())
    }

    fn load_value(&self, scalar: &Scalar) -> Result<T, FieldError> {
        T::from_scalar(scalar)
    }
}

impl ScalarValue for bool {
    fn to_scalar(&self) -> Scalar {
        Scalar::Bool(*self)
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
        match scalar {
            Scalar::Bool(b) => Ok(*b),
            other => Err(FieldError::unexpected_scalar("bool", other)),
        }
    }
}

impl ScalarValue for i64 {
    fn to_scalar(&self) -> Scalar {
        Scalar::Integer(*self)
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
        match scalar {
            Scalar::Integer(i) => Ok(*i),
            other => Err(FieldError::unexpected_scalar("integer", other)),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),*) => {
        $(impl ScalarValue for $ty {
            fn to_scalar(&self) -> Scalar {
                Scalar::Integer(i64::from(*self))
            }

            fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
                let wide = i64::from_scalar(scalar)?;
                <$ty>::try_from(wide).map_err(|_| FieldError::Conversion {
                    target: stringify!($ty),
                    reason: format!("{wide} is out of range"),
                })
            }
        })*
    };
}

narrow_integer!(i8, i16, i32, u8, u16, u32);

impl ScalarValue for f64 {
    fn to_scalar(&self) -> Scalar {
        Scalar::Float(*self)
    }

    /// Integers widen to floats; the reverse is refused.
    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
        match scalar {
            Scalar::Float(f) => Ok(*f),
            Scalar::Integer(i) => Ok(*i as f64),
            other => Err(FieldError::unexpected_scalar("float", other)),
        }
    }
}

impl ScalarValue for f32 {
    fn to_scalar(&self) -> Scalar {
        Scalar::Float(f64::from(*self))
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
        f64::from_scalar(scalar).map(|f| f as f32)
    }
}

impl ScalarValue for String {
    fn to_scalar(&self) -> Scalar {
        Scalar::Text(self.clone())
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
        match scalar {
            Scalar::Text(s) => Ok(s.clone()),
            other => Err(FieldError::unexpected_scalar("text", other)),
        }
    }
}

impl ScalarValue for DateTime<Utc> {
    fn to_scalar(&self) -> Scalar {
        Scalar::Timestamp(*self)
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
        match scalar {
            Scalar::Timestamp(t) => Ok(*t),
            other => Err(FieldError::unexpected_scalar("timestamp", other)),
        }
    }
}

impl ScalarValue for RawKey {
    fn to_scalar(&self) -> Scalar {
        Scalar::Key(self.clone())
    }

    fn from_scalar(scalar: &Scalar) -> Result<Self, FieldError> {
        match scalar {
            Scalar::Key(k) => Ok(k.clone()),
            other => Err(FieldError::unexpected_scalar("key", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Time zones
// ---------------------------------------------------------------------------

/// Stores a time zone as its IANA identifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeZoneConverter;

impl ValueConverter for TimeZoneConverter {
    type Value = Tz;

    fn save_value(&self, value: &Tz) -> Result<Scalar, FieldError> {
        Ok(Scalar::Text(value.name().to_string()))
    }

    fn load_value(&self, scalar: &Scalar) -> Result<Tz, FieldError> {
        match scalar {
            Scalar::Text(id) => id.parse::<Tz>().map_err(|_| FieldError::Conversion {
                target: "time zone",
                reason: format!("unknown time zone id '{id}'"),
            }),
            other => Err(FieldError::unexpected_scalar("text", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_integers_check_range() {
        let c = ScalarConverter::<u8>::new();
        assert_eq!(c.load_value(&Scalar::Integer(200)).unwrap(), 200u8);
        let err = c.load_value(&Scalar::Integer(300)).unwrap_err();
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn floats_accept_integers() {
        let c = ScalarConverter::<f64>::new();
        assert_eq!(c.load_value(&Scalar::Integer(3)).unwrap(), 3.0);
        assert!(ScalarConverter::<i64>::new()
            .load_value(&Scalar::Float(3.0))
            .is_err());
    }

    #[test]
    fn wrong_scalar_names_both_sides() {
        let err = ScalarConverter::<String>::new()
            .load_value(&Scalar::Bool(true))
            .unwrap_err();
        assert_eq!(err.to_string(), "expected text scalar, found bool");
    }

    #[test]
    fn time_zone_round_trips_by_id() {
        let c = TimeZoneConverter;
        let tz: Tz = "America/New_York".parse().unwrap();
        let scalar = c.save_value(&tz).unwrap();
        assert_eq!(scalar, Scalar::Text("America/New_York".into()));
        assert_eq!(c.load_value(&scalar).unwrap(), tz);
        assert!(c.load_value(&Scalar::Text("Mars/Olympus".into())).is_err());
    }

    #[test]
    fn erased_codec_rejects_other_types() {
        let codec: &dyn ValueCodec = &ScalarConverter::<i64>::new();
        assert!(codec.save(&"x".to_string()).is_err());
        assert_eq!(codec.save(&5i64).unwrap(), Scalar::Integer(5));
        let back = codec.load(&Scalar::Integer(5)).unwrap();
        assert_eq!(*back.downcast::<i64>().unwrap(), 5);
    }
}
