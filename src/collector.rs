//! 分页去重收集器
//!
//! 翻页抓取时同一条记录可能在不同页以不同的 key 出现：按 key 或值判重，
//! 值已存在但 key 不同时把新 key 记为别名，后续再遇到直接判为重复。

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct DedupCollector<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
    alias_keys: HashSet<String>,
}

impl<V> Default for DedupCollector<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            alias_keys: HashSet::new(),
        }
    }
}

impl<V: PartialEq> DedupCollector<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加记录；key 已存在时替换值并保持原顺序
    pub fn append(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&idx) => self.entries[idx].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// key 或其别名是否已存在
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key) || self.alias_keys.contains(key)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.entries.iter().any(|(_, v)| v == value)
    }

    /// key 已存在返回 true；值已存在于其他 key 下时把 key 记为别名并返回 true；否则 false
    pub fn contains_either_and_alias(&mut self, key: &str, value: &V) -> bool {
        if self.contains_key(key) {
            return true;
        }
        if self.contains_value(value) {
            self.alias_keys.insert(key.to_string());
            return true;
        }
        false
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn into_values(self) -> Vec<V> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.alias_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_same_key_keeps_count() {
        let mut c = DedupCollector::new();
        c.append("k", 1);
        c.append("k", 2);
        assert_eq!(c.count(), 1);
        assert!(c.contains_key("k"));
        assert_eq!(c.values().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_same_value_under_new_key_becomes_alias() {
        let mut c = DedupCollector::new();
        c.append("k1", "v");
        assert!(c.contains_either_and_alias("k2", &"v"));
        assert_eq!(c.count(), 1);
        // 别名记住后只按 key 也能判重
        assert!(c.contains_key("k2"));
    }

    #[test]
    fn test_unknown_key_and_value() {
        let mut c = DedupCollector::new();
        c.append("k1", "v1");
        assert!(!c.contains_either_and_alias("k2", &"v2"));
        assert!(!c.contains_key("k2"));
    }

    #[test]
    fn test_reset_clears_aliases() {
        let mut c = DedupCollector::new();
        c.append("k1", 10);
        assert!(c.contains_either_and_alias("alias", &10));
        c.reset();
        assert!(c.is_empty());
        assert!(!c.contains_key("alias"));
        assert!(!c.contains_key("k1"));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut c = DedupCollector::new();
        c.append("b", 2);
        c.append("a", 1);
        c.append("c", 3);
        assert_eq!(c.into_values(), vec![2, 1, 3]);
    }
}
