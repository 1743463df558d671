use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort by a named entity field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// A comparable field value extracted from an entity
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Text(String),
    Number(f64),
    Time(DateTime<Utc>),
    Flag(bool),
    /// Absent optional field; sorts before any present value
    Empty,
}

impl SortValue {
    pub fn compare(&self, other: &SortValue) -> Ordering {
        use SortValue::*;
        match (self, other) {
            (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Number(a), Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Time(a), Time(b)) => a.cmp(b),
            (Flag(a), Flag(b)) => a.cmp(b),
            (Empty, Empty) => Ordering::Equal,
            (Empty, _) => Ordering::Less,
            (_, Empty) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

/// Entities that expose named fields for sorting.
/// Unknown field names return `None`.
pub trait Sortable {
    fn sort_value(&self, field: &str) -> Option<SortValue>;
}

pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Optional predicate filter plus optional named-field sort
pub struct Query<T> {
    pub filter: Option<Predicate<T>>,
    pub sort: Option<SortSpec>,
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
        }
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter.as_ref().map(|_| "<predicate>"))
            .field("sort", &self.sort)
            .finish()
    }
}

impl<T: Sortable + Clone> Query<T> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            filter: Some(Arc::new(predicate)),
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Copy out the matching items, sorted if requested.
    /// The sort is stable; a field no item knows leaves the order untouched.
    pub fn apply(&self, items: &[T]) -> Vec<T> {
        let mut out: Vec<T> = match &self.filter {
            Some(pred) => items.iter().filter(|item| pred(item)).cloned().collect(),
            None => items.to_vec(),
        };

        if let Some(sort) = &self.sort {
            let known = out.iter().any(|item| item.sort_value(&sort.field).is_some());
            if known {
                out.sort_by(|a, b| {
                    let (va, vb) = (a.sort_value(&sort.field), b.sort_value(&sort.field));
                    let ord = match (va, vb) {
                        (Some(x), Some(y)) => x.compare(&y),
                        _ => Ordering::Equal,
                    };
                    match sort.order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    }
                });
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        score: f64,
    }

    impl Sortable for Item {
        fn sort_value(&self, field: &str) -> Option<SortValue> {
            match field {
                "name" => Some(SortValue::Text(self.name.to_string())),
                "score" => Some(SortValue::Number(self.score)),
                _ => None,
            }
        }
    }

    fn items() -> Vec<Item> {
        vec![
            Item { name: "charlie", score: 2.0 },
            Item { name: "Alpha", score: 3.0 },
            Item { name: "bravo", score: 2.0 },
        ]
    }

    fn names(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|i| i.name).collect()
    }

    #[test]
    fn test_sort_text_case_insensitive() {
        let out = Query::all().sorted(SortSpec::asc("name")).apply(&items());
        assert_eq!(names(&out), vec!["Alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_sort_desc_is_stable_for_ties() {
        let out = Query::all().sorted(SortSpec::desc("score")).apply(&items());
        assert_eq!(names(&out), vec!["Alpha", "charlie", "bravo"]);
    }

    #[test]
    fn test_unknown_sort_field_keeps_order() {
        let out = Query::all().sorted(SortSpec::asc("missing")).apply(&items());
        assert_eq!(names(&out), vec!["charlie", "Alpha", "bravo"]);
    }

    #[test]
    fn test_filter_then_sort() {
        let out = Query::filtered(|i: &Item| i.score < 3.0)
            .sorted(SortSpec::asc("name"))
            .apply(&items());
        assert_eq!(names(&out), vec!["bravo", "charlie"]);
    }

    #[test]
    fn test_apply_returns_copy() {
        let source = items();
        let mut out = Query::all().apply(&source);
        out[0].score = 99.0;
        assert_eq!(source[0].score, 2.0);
    }

    #[test]
    fn test_sort_order_serde() {
        let spec: SortSpec = serde_json::from_str(r#"{"field":"title","order":"desc"}"#).unwrap();
        assert_eq!(spec, SortSpec::desc("title"));
        let spec: SortSpec = serde_json::from_str(r#"{"field":"title"}"#).unwrap();
        assert_eq!(spec.order, SortOrder::Asc);
    }
}
