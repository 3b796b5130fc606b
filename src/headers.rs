use std::borrow::Cow;

use http::HeaderMap;

use crate::error::Error;
use crate::util::{parse_header_name, parse_header_value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

impl HeaderEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn value(&self) -> Cow<'_, str> {
        match self.values.as_slice() {
            [single] => Cow::Borrowed(single.as_str()),
            values => Cow::Owned(values.join(", ")),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct HeaderCollection {
    entries: Vec<HeaderEntry>,
}

impl HeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.matches(name))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set_values(name, [value])
    }

    pub fn set_values<I, V>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.remove(&name);
            return self;
        }
        match self.position(&name) {
            Some(index) => self.entries[index].values = values,
            None => self.entries.push(HeaderEntry { name, values }),
        }
        self
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index].values.push(value),
            None => self.entries.push(HeaderEntry {
                name,
                values: vec![value],
            }),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        self.entry(name).map(HeaderEntry::value)
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.entry(name).map(HeaderEntry::values).unwrap_or_default()
    }

    pub fn entry(&self, name: &str) -> Option<&HeaderEntry> {
        self.entries.iter().find(|entry| entry.matches(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderEntry> {
        let index = self.position(name)?;
        Some(self.entries.remove(index))
    }

    pub fn names(&self) -> HeaderNames<'_> {
        HeaderNames {
            inner: self.entries.iter(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderEntry> {
        self.entries.iter()
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, Error> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = parse_header_name(&entry.name)?;
            for value in &entry.values {
                map.append(name.clone(), parse_header_value(&entry.name, value)?);
            }
        }
        Ok(map)
    }

    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            headers.add(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        headers
    }
}

impl PartialEq for HeaderCollection {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|entry| other.values(&entry.name) == entry.values.as_slice())
    }
}

impl Eq for HeaderCollection {}

impl<K, V> FromIterator<(K, V)> for HeaderCollection
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        headers.extend(iter);
        headers
    }
}

impl<K, V> Extend<(K, V)> for HeaderCollection
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.add(name, value);
        }
    }
}

impl<'a> IntoIterator for &'a HeaderCollection {
    type Item = &'a HeaderEntry;
    type IntoIter = std::slice::Iter<'a, HeaderEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderNames<'a> {
    inner: std::slice::Iter<'a, HeaderEntry>,
}

impl<'a> Iterator for HeaderNames<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(HeaderEntry::name)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for HeaderNames<'_> {}
