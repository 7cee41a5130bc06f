use serde::{Deserialize, Serialize};
use std::fmt;

/// 任务在存储中的唯一标识
///
/// `group` 是业务分组（租户/所属实体ID），`name` 是分组内唯一的任务ID。
/// 创建后不可变，任务删除时随之删除。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub name: String,
    pub group: String,
}

impl TaskKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// 触发器在存储中的唯一标识，与任务键处于不同的命名空间
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    pub name: String,
    pub group: String,
}

impl TriggerKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// 分组匹配器
///
/// 分组名按大小写敏感的精确匹配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMatcher {
    Equals(String),
    Any,
}

impl GroupMatcher {
    pub fn group_equals(group: impl Into<String>) -> Self {
        GroupMatcher::Equals(group.into())
    }

    pub fn any_group() -> Self {
        GroupMatcher::Any
    }

    pub fn matches(&self, group: &str) -> bool {
        match self {
            GroupMatcher::Equals(expected) => expected == group,
            GroupMatcher::Any => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_matcher_is_case_sensitive() {
        let matcher = GroupMatcher::group_equals("Tenant-1");
        assert!(matcher.matches("Tenant-1"));
        assert!(!matcher.matches("tenant-1"));
        assert!(!matcher.matches("Tenant-10"));
        assert!(GroupMatcher::any_group().matches("whatever"));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(TaskKey::new("job", "g1").to_string(), "g1.job");
        assert_eq!(TriggerKey::new("job-retry-1", "g1").to_string(), "g1.job-retry-1");
    }
}
