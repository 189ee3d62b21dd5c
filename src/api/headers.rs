use std::collections::BTreeMap;

/// Header map with case-insensitive names.
///
/// Names are stored lowercased; the last insert for a name wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    inner: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.inner.insert(name.to_ascii_lowercase(), value.into())
    }

    /// Inserts only when `name` is not already present.
    pub fn insert_default(&mut self, name: &str, value: impl Into<String>) {
        self.inner
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn from_response(response: &ureq::Response) -> Self {
        let mut headers = Self::new();
        for name in response.headers_names() {
            if let Some(value) = response.header(&name) {
                headers.insert(&name, value);
            }
        }
        headers
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}
