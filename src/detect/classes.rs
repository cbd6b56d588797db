use std::collections::HashMap;

/// Maps numeric class ids to names.
///
/// Built from either a list (index = id) or an explicit id → name table.
/// Ids without an entry resolve to their decimal string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassNameResolver {
    names: HashMap<u32, String>,
}

impl ClassNameResolver {
    pub fn from_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(id, name)| (id as u32, name.into()))
                .collect(),
        }
    }

    pub fn from_map<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(id, name)| (id, name.into()))
                .collect(),
        }
    }

    pub fn resolve(&self, class_id: u32) -> String {
        match self.names.get(&class_id) {
            Some(name) => name.clone(),
            None => class_id.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
