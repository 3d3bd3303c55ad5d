use serde::{Deserialize, Serialize};

/// An ordered multimap-free tag collection. OSM tags are unique by key, and
/// their file order is preserved because hstore / json column renderings are
/// required to be deterministic for identical inputs.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct TagMap(Vec<(String, String)>);

impl TagMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace a tag, keeping first-insertion order on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a JSON object. serde_json orders object keys, so identical
    /// tag sets render identically regardless of input order.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

#[cfg(test)]
mod test {
    use super::TagMap;

    #[test]
    fn insertion_order_is_preserved_and_keys_are_unique() {
        let mut tags = TagMap::new();
        tags.insert("highway", "primary");
        tags.insert("name", "Broad Street");
        tags.insert("highway", "secondary");

        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("highway"), Some("secondary"));
        assert_eq!(
            tags.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["highway", "name"],
        );
        assert!(!tags.contains("oneway"));
    }

    #[test]
    fn json_rendering_is_input_order_independent() {
        let tags: TagMap = [("b", "2"), ("a", "1")].into_iter().collect();
        let flipped: TagMap = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&tags.to_json()).unwrap(),
            serde_json::to_string(&flipped.to_json()).unwrap(),
        );
        assert_eq!(
            serde_json::to_string(&tags.to_json()).unwrap(),
            r#"{"a":"1","b":"2"}"#,
        );
    }
}
