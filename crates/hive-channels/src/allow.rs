use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Who may talk to a channel adapter. An empty list lets everyone in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ids.is_empty()
    }

    /// Either the sender or the chat being listed is enough
    pub fn permits(&self, user_id: &str, chat_id: &str) -> bool {
        self.is_open() || self.ids.contains(user_id) || self.ids.contains(chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_allows_everyone() {
        let list = AllowList::default();
        assert!(list.is_open());
        assert!(list.permits("42", "-100"));
    }

    #[test]
    fn test_user_or_chat_match() {
        let list = AllowList::new(["42", "-100"]);
        assert!(list.permits("42", "7"));
        assert!(list.permits("9", "-100"));
        assert!(!list.permits("9", "7"));
    }

    #[test]
    fn test_deserializes_from_plain_array() {
        let list: AllowList = serde_json::from_str(r#"["1","2"]"#).unwrap();
        assert!(list.permits("2", "x"));
    }
}
