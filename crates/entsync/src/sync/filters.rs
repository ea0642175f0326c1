//! 过滤串规范化 - 集合去重的键
//!
//! 规则：键按字典序排序，拼接 `key=value`，对子之间以 `;` 连接。
//! 两个语义相同的过滤集合必然得到同一个串。
//!
//! 已知缺陷（沿用原有语义，未经确认不擅自修正）：
//! 键或值本身含 `=` 或 `;` 时可能与另一组过滤碰撞。

pub use crate::storage::entities::FilterSet;

/// 规范化过滤串：排序键 + `key=value` 拼接
pub fn filters_hash(filters: &FilterSet) -> String {
    // BTreeMap 迭代天然按键字典序
    filters
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(pairs: &[(&str, &str)]) -> FilterSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn keys_are_sorted_lexicographically() {
        let set = filters(&[("status", "open"), ("kind", "bug"), ("assignee", "u7")]);
        assert_eq!(filters_hash(&set), "assignee=u7;kind=bug;status=open");
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = filters(&[("b", "2"), ("a", "1")]);
        let b = filters(&[("a", "1"), ("b", "2")]);
        assert_eq!(filters_hash(&a), filters_hash(&b));
    }

    #[test]
    fn empty_filters_hash_to_empty_string() {
        assert_eq!(filters_hash(&FilterSet::new()), "");
    }
}
