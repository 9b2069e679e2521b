//! Case-insensitive, order-preserving header storage.
//!
//! Names are stored lower-cased and rendered with every hyphen-delimited
//! segment capitalized (`content-type` becomes `Content-Type`). Each name maps
//! to a non-empty list of values; setting an empty list removes the name.

use std::fmt;

use http::{HeaderName, HeaderValue};

use super::{MessageError, Result};

/// Ordered header storage keyed by lower-cased field name.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// The values stored for `name`, empty when the header is absent.
    pub fn get(&self, name: &str) -> &[String] {
        self.position(name).map_or(&[], |index| self.entries[index].1.as_slice())
    }

    /// The values of `name` joined with commas, empty when the header is absent.
    pub fn get_line(&self, name: &str) -> String {
        self.get(name).join(",")
    }

    /// Replaces all values of `name`.
    pub fn set<V: IntoHeaderValues>(&mut self, name: &str, values: V) -> Result<()> {
        let key = validate_name(name)?;
        let values = validate_values(values.into_header_values())?;
        match (self.position(&key), values.is_empty()) {
            (Some(index), true) => {
                self.entries.remove(index);
            }
            (Some(index), false) => self.entries[index].1 = values,
            (None, true) => {}
            (None, false) => self.entries.push((key, values)),
        }
        Ok(())
    }

    /// Appends values to `name`, creating the header when absent.
    pub fn append<V: IntoHeaderValues>(&mut self, name: &str, values: V) -> Result<()> {
        let key = validate_name(name)?;
        let values = validate_values(values.into_header_values())?;
        self.append_unchecked(key, values);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|index| self.entries.remove(index).1)
    }

    /// Copies every header of `other` into this map, replacing names both define.
    pub fn merge(&mut self, other: HeaderMap) {
        for (key, values) in other.entries {
            match self.position(&key) {
                Some(index) => self.entries[index].1 = values,
                None => self.entries.push((key, values)),
            }
        }
    }

    /// Iterates over lower-cased names and their values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Appends a header read off the wire, without validation.
    pub(crate) fn append_unchecked(&mut self, key: String, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        let key = key.to_ascii_lowercase();
        match self.position(&key) {
            Some(index) => self.entries[index].1.extend(values),
            None => self.entries.push((key, values)),
        }
    }

    /// Replaces a header with trusted values.
    pub(crate) fn set_unchecked(&mut self, key: &str, values: Vec<String>) {
        match self.position(key) {
            Some(index) => self.entries[index].1 = values,
            None => self.entries.push((key.to_ascii_lowercase(), values)),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a [String]);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Renders a lower-cased field name in its wire form, `x-forwarded-for` as `X-Forwarded-For`.
pub fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    HeaderName::from_bytes(name.as_bytes())
        .map(|name| name.as_str().to_string())
        .map_err(|e| MessageError::invalid_argument(format!("invalid header name {name:?}: {e}")))
}

fn validate_values(values: Vec<String>) -> Result<Vec<String>> {
    values
        .into_iter()
        .map(|value| {
            let value = value.trim().to_string();
            HeaderValue::from_bytes(value.as_bytes())
                .map(|_| value.clone())
                .map_err(|e| MessageError::invalid_argument(format!("invalid header value {value:?}: {e}")))
        })
        .collect()
}

/// Types accepted as the value side of a header mutation.
pub trait IntoHeaderValues {
    fn into_header_values(self) -> Vec<String>;
}

impl IntoHeaderValues for &str {
    fn into_header_values(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoHeaderValues for String {
    fn into_header_values(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoHeaderValues for &String {
    fn into_header_values(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoHeaderValues for Vec<String> {
    fn into_header_values(self) -> Vec<String> {
        self
    }
}

impl IntoHeaderValues for Vec<&str> {
    fn into_header_values(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoHeaderValues for &[&str] {
    fn into_header_values(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_string()).collect()
    }
}

impl<const N: usize> IntoHeaderValues for [&str; N] {
    fn into_header_values(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_string()).collect()
    }
}

macro_rules! numeric_header_values {
    ($($ty:ty),*) => {
        $(
            impl IntoHeaderValues for $ty {
                fn into_header_values(self) -> Vec<String> {
                    vec![self.to_string()]
                }
            }
        )*
    };
}

numeric_header_values!(u16, u32, u64, usize, i32, i64);
