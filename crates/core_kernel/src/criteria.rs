//! Filter and ordering criteria for composed queries
//!
//! Both types wrap shareable closures so a query can be cloned and re-run.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// A boolean filter over entities
pub struct Filter<T> {
    predicate: Predicate<T>,
}

impl<T> Filter<T> {
    /// Wraps a predicate
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// A filter that matches every entity
    pub fn all() -> Self
    where
        T: 'static,
    {
        Self::new(|_| true)
    }

    /// Evaluates the filter
    pub fn matches(&self, entity: &T) -> bool {
        (self.predicate)(entity)
    }

    /// Both filters must match
    pub fn and(self, other: Filter<T>) -> Self
    where
        T: 'static,
    {
        let (left, right) = (self.predicate, other.predicate);
        Self::new(move |e| left(e) && right(e))
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

/// A stable, multi-key ordering over entities
pub struct OrderBy<T> {
    comparators: Vec<Comparator<T>>,
}

impl<T: 'static> OrderBy<T> {
    /// Orders ascending by `key`
    pub fn asc<K: PartialOrd>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self {
            comparators: vec![ascending(key)],
        }
    }

    /// Orders descending by `key`
    pub fn desc<K: PartialOrd>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self {
            comparators: vec![descending(key)],
        }
    }

    /// Breaks ties ascending by `key`
    pub fn then_by<K: PartialOrd>(mut self, key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        self.comparators.push(ascending(key));
        self
    }

    /// Breaks ties descending by `key`
    pub fn then_by_descending<K: PartialOrd>(
        mut self,
        key: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> Self {
        self.comparators.push(descending(key));
        self
    }
}

impl<T> OrderBy<T> {
    /// Compares two entities by every key in turn
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        for comparator in &self.comparators {
            match comparator(a, b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Sorts `items` in place; equal items keep their relative order
    pub fn sort(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }

    /// Sorts items by the entity part of each pair
    pub fn sort_by_entity<X>(&self, items: &mut [(T, X)]) {
        items.sort_by(|a, b| self.compare(&a.0, &b.0));
    }
}

fn ascending<T, K: PartialOrd>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Comparator<T> {
    Arc::new(move |a, b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal))
}

fn descending<T, K: PartialOrd>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Comparator<T> {
    Arc::new(move |a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal))
}

impl<T> Clone for OrderBy<T> {
    fn clone(&self) -> Self {
        Self {
            comparators: self.comparators.clone(),
        }
    }
}

impl<T> fmt::Debug for OrderBy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderBy({} keys)", self.comparators.len())
    }
}
