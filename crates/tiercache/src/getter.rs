//! Typed accessor contract
//!
//! [`Getter`] is the single untyped read primitive a cache level provides.
//! [`TypedGetter`] derives every typed accessor from it and is implemented
//! for all getters. Each type comes in three flavours:
//!
//! - `has_get_*` returns `Option<T>`
//! - `get_*` returns `T`, falling back to `T::default()`
//! - `get_*_or` returns `T`, falling back to the supplied value
//!
//! Typed accessors never fail: a missing key, a value of the wrong shape and
//! a backend error all read as "not found" (backend errors are logged).
//! Use [`Getter::get_value`] or [`TypedGetter::try_get`] to see errors.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Untyped read primitive
#[async_trait]
pub trait Getter: Send + Sync {
    /// Whether `key` is present
    async fn has(&self, key: &str) -> Result<bool>;

    /// Stored value of `key`
    async fn get_value(&self, key: &str) -> Result<Option<Value>>;
}

async fn probe<G: Getter + ?Sized>(getter: &G, key: &str) -> Option<Value> {
    match getter.get_value(key).await {
        Ok(value) => value,
        Err(e) => {
            warn!(key = %key, error = %e, "cache read failed");
            None
        }
    }
}

macro_rules! typed_accessors {
    ($($ty:ty => $has_get:ident, $get:ident, $get_or:ident, $coerce:expr;)*) => {
        $(
            #[doc = concat!("Read `key` as `", stringify!($ty), "`")]
            fn $has_get(&self, key: &str) -> impl Future<Output = Option<$ty>> + Send {
                async move { probe(self, key).await.as_ref().and_then($coerce) }
            }

            #[doc = concat!("Read `key` as `", stringify!($ty), "`, or its default")]
            fn $get(&self, key: &str) -> impl Future<Output = $ty> + Send {
                async move { self.$has_get(key).await.unwrap_or_default() }
            }

            #[doc = concat!("Read `key` as `", stringify!($ty), "`, or `default`")]
            fn $get_or(&self, key: &str, default: $ty) -> impl Future<Output = $ty> + Send {
                async move { self.$has_get(key).await.unwrap_or(default) }
            }
        )*
    };
}

/// Typed reads derived from [`Getter`]
pub trait TypedGetter: Getter {
    /// Deserialize `key` into `T`, propagating errors
    fn try_get<T>(&self, key: &str) -> impl Future<Output = Result<Option<T>>> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move {
            match self.get_value(key).await? {
                Some(value) => Ok(Some(serde_json::from_value(value)?)),
                None => Ok(None),
            }
        }
    }

    /// Deserialize `key` into `T`
    fn has_get<T>(&self, key: &str) -> impl Future<Output = Option<T>> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move {
            match self.try_get(key).await {
                Ok(value) => value,
                Err(Error::Codec(e)) => {
                    debug!(key = %key, error = %e, "cached value has a different shape");
                    None
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "cache read failed");
                    None
                }
            }
        }
    }

    /// Deserialize `key` into `T`, or `T::default()`
    fn get<T>(&self, key: &str) -> impl Future<Output = T> + Send
    where
        T: DeserializeOwned + Default + Send,
    {
        async move { self.has_get(key).await.unwrap_or_default() }
    }

    /// Deserialize `key` into `T`, or `default`
    fn get_or<T>(&self, key: &str, default: T) -> impl Future<Output = T> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move { self.has_get(key).await.unwrap_or(default) }
    }

    typed_accessors! {
        i8 => has_get_i8, get_i8, get_i8_or, |v: &Value| coerce_i64(v).map(|n| n as i8);
        i16 => has_get_i16, get_i16, get_i16_or, |v: &Value| coerce_i64(v).map(|n| n as i16);
        i32 => has_get_i32, get_i32, get_i32_or, |v: &Value| coerce_i64(v).map(|n| n as i32);
        i64 => has_get_i64, get_i64, get_i64_or, coerce_i64;
        isize => has_get_isize, get_isize, get_isize_or, |v: &Value| coerce_i64(v).map(|n| n as isize);
        u8 => has_get_u8, get_u8, get_u8_or, |v: &Value| coerce_i64(v).map(|n| n as u8);
        u16 => has_get_u16, get_u16, get_u16_or, |v: &Value| coerce_i64(v).map(|n| n as u16);
        u32 => has_get_u32, get_u32, get_u32_or, |v: &Value| coerce_i64(v).map(|n| n as u32);
        u64 => has_get_u64, get_u64, get_u64_or, coerce_u64;
        usize => has_get_usize, get_usize, get_usize_or, |v: &Value| coerce_u64(v).map(|n| n as usize);
        f32 => has_get_f32, get_f32, get_f32_or, |v: &Value| coerce_f64(v).map(|n| n as f32);
        f64 => has_get_f64, get_f64, get_f64_or, coerce_f64;
        String => has_get_string, get_string, get_string_or, coerce_string;
        bool => has_get_bool, get_bool, get_bool_or, coerce_bool;
        DateTime<Utc> => has_get_time, get_time, get_time_or, coerce_time;
    }
}

impl<G: Getter + ?Sized> TypedGetter for G {}

/// Any JSON number as `i64`; floats truncate toward zero
pub fn coerce_i64(value: &Value) -> Option<i64> {
    let n = value.as_number()?;
    n.as_i64()
        .or_else(|| n.as_u64().map(|u| u as i64))
        .or_else(|| n.as_f64().map(|f| f as i64))
}

/// Any JSON number as `u64`; floats truncate toward zero
pub fn coerce_u64(value: &Value) -> Option<u64> {
    let n = value.as_number()?;
    n.as_u64()
        .or_else(|| n.as_i64().map(|i| i as u64))
        .or_else(|| n.as_f64().map(|f| f as u64))
}

/// Any JSON number as `f64`
pub fn coerce_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Strings verbatim, scalars formatted, arrays and objects as compact JSON
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// JSON booleans only
pub fn coerce_bool(value: &Value) -> Option<bool> {
    value.as_bool()
}

/// RFC 3339 strings
pub fn coerce_time(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
