use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::TaskKey;

/// 任务参数值
///
/// 任务存储只支持原始类型的键值参数，结构化数据（如重试策略）需先扁平化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum DataValue {
    String(String),
    Int(i32),
    Long(i64),
    Double(f64),
}

impl DataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 整数读取，字符串形式的数字同样接受
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Int(v) => Some(i64::from(*v)),
            DataValue::Long(v) => Some(*v),
            DataValue::Double(_) => None,
            DataValue::String(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Int(v) => Some(f64::from(*v)),
            DataValue::Long(v) => Some(*v as f64),
            DataValue::Double(v) => Some(*v),
            DataValue::String(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::String(v) => write!(f, "{v}"),
            DataValue::Int(v) => write!(f, "{v}"),
            DataValue::Long(v) => write!(f, "{v}"),
            DataValue::Double(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::String(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::String(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Long(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Double(value)
    }
}

/// 任务参数表，按键有序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDataMap(BTreeMap<String, DataValue>);

impl JobDataMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<DataValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(DataValue::as_str)
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(DataValue::as_i64)
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(DataValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataValue)> {
        self.0.iter()
    }

    /// 以 `other` 覆盖当前参数，返回合并后的新参数表
    pub fn merged_with(&self, other: &JobDataMap) -> JobDataMap {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// 参数的展示形式，键有序
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl FromIterator<(String, DataValue)> for JobDataMap {
    fn from_iter<I: IntoIterator<Item = (String, DataValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 存储中的任务定义
///
/// `task_class` 是执行时用于解析任务实现的名称。任务是持久的：
/// 最后一个触发器完成后任务本身仍保留，直到被显式删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub key: TaskKey,
    pub description: Option<String>,
    pub task_class: String,
    pub data: JobDataMap,
}

impl JobDetail {
    pub fn new(key: TaskKey, task_class: impl Into<String>) -> Self {
        Self {
            key,
            description: None,
            task_class: task_class.into(),
            data: JobDataMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, data: JobDataMap) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_numeric_reads() {
        let mut map = JobDataMap::new();
        map.put("a", 3);
        map.put("b", 4_i64);
        map.put("c", "5");
        map.put("d", 1.5);

        assert_eq!(map.get_long("a"), Some(3));
        assert_eq!(map.get_long("b"), Some(4));
        assert_eq!(map.get_long("c"), Some(5));
        assert_eq!(map.get_long("d"), None);
        assert_eq!(map.get_double("a"), Some(3.0));
        assert_eq!(map.get_double("d"), Some(1.5));
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = JobDataMap::new();
        base.put("k", 1);
        base.put("only_base", "x");
        let mut over = JobDataMap::new();
        over.put("k", 2);

        let merged = base.merged_with(&over);
        assert_eq!(merged.get_long("k"), Some(2));
        assert_eq!(merged.get_string("only_base"), Some("x"));
        assert_eq!(base.get_long("k"), Some(1));
    }

    #[test]
    fn test_display_map_is_sorted() {
        let mut map = JobDataMap::new();
        map.put("zeta", 1);
        map.put("alpha", "a");
        let keys: Vec<_> = map.to_display_map().into_keys().collect();
        assert_eq!(keys, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_json_shape() {
        let mut map = JobDataMap::new();
        map.put("n", 7_i64);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"n":{"type":"Long","value":7}}"#);
        let back: JobDataMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
