#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
    components: Vec<(String, Option<String>)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn replace(&mut self, name: String, value: Option<String>) -> &mut Self {
        match self.components.iter().position(|(key, _)| *key == name) {
            Some(index) => {
                self.components[index].1 = value;
                let mut position = 0;
                self.components.retain(|(key, _)| {
                    let keep = position <= index || *key != name;
                    position += 1;
                    keep
                });
            }
            None => self.components.push((name, value)),
        }
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.replace(name.into(), Some(value.into()))
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.components.push((name.into(), Some(value.into())));
        self
    }

    pub fn set_flag(&mut self, name: impl Into<String>) -> &mut Self {
        self.replace(name.into(), None)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.components
            .iter()
            .filter(|(key, _)| key == name)
            .find_map(|(_, value)| value.as_deref())
    }

    pub fn values(&self, name: &str) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(key, _)| key == name)
            .filter_map(|(_, value)| value.as_deref())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.iter().any(|(key, _)| key == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.components
            .iter()
            .enumerate()
            .filter(|(index, (name, _))| {
                !self.components[..*index].iter().any(|(key, _)| key == name)
            })
            .map(|(_, (name, _))| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.components
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn parse(raw: &str) -> Self {
        let components = raw
            .split('&')
            .filter(|component| !component.is_empty())
            .map(|component| match component.split_once('=') {
                Some((name, value)) => (name.to_owned(), Some(value.to_owned())),
                None => (component.to_owned(), None),
            })
            .collect();
        Self { components }
    }

    pub fn to_query_string(&self) -> String {
        self.components
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{name}={value}"),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.add(name, value);
        }
        params
    }
}
