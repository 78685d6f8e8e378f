//! Built-in iterator plugins: `product`, `zip`, `chain`.

use super::{PayloadIterator, PayloadSource, PluginRegistry};
use crate::result::PayloadValue;

pub(super) fn register(registry: &mut PluginRegistry) {
    registry.register_iterator("product", |dicts| {
        Ok(Box::new(ProductIterator::new(dicts)) as Box<dyn PayloadIterator>)
    });
    registry.register_iterator("zip", |dicts| {
        Ok(Box::new(ZipIterator::new(dicts)) as Box<dyn PayloadIterator>)
    });
    registry.register_iterator("chain", |dicts| {
        Ok(Box::new(ChainIterator::new(dicts)) as Box<dyn PayloadIterator>)
    });
}

/// Cartesian product. Inputs are materialised on first use; an unbounded
/// source therefore cannot be combined under `product`.
pub struct ProductIterator {
    pending: Option<Vec<Box<dyn PayloadSource>>>,
    tables: Vec<Vec<PayloadValue>>,
    indices: Vec<usize>,
    done: bool,
    total: Option<u64>,
}

impl ProductIterator {
    pub fn new(dicts: Vec<Box<dyn PayloadSource>>) -> Self {
        let total = dicts
            .iter()
            .map(|d| d.count())
            .try_fold(1u64, |acc, c| c.map(|c| acc * c));
        Self {
            pending: Some(dicts),
            tables: Vec::new(),
            indices: Vec::new(),
            done: false,
            total,
        }
    }

    fn materialize(&mut self) {
        if let Some(dicts) = self.pending.take() {
            for mut dict in dicts {
                let mut table = Vec::new();
                while let Some(v) = dict.next_value() {
                    table.push(v);
                }
                if table.is_empty() {
                    self.done = true;
                }
                self.tables.push(table);
            }
            self.indices = vec![0; self.tables.len()];
        }
    }
}

impl PayloadIterator for ProductIterator {
    fn count(&self) -> Option<u64> {
        self.total
    }

    fn next_tuple(&mut self) -> Option<Vec<PayloadValue>> {
        self.materialize();
        if self.done {
            return None;
        }
        let tuple: Vec<PayloadValue> = self
            .indices
            .iter()
            .zip(&self.tables)
            .map(|(&i, table)| table[i].clone())
            .collect();

        // Odometer increment, rightmost digit fastest.
        for pos in (0..self.indices.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.tables[pos].len() {
                return Some(tuple);
            }
            self.indices[pos] = 0;
        }
        self.done = true;
        Some(tuple)
    }
}

/// Pairwise combination; stops when the shortest input runs out.
pub struct ZipIterator {
    dicts: Vec<Box<dyn PayloadSource>>,
    total: Option<u64>,
}

impl ZipIterator {
    pub fn new(dicts: Vec<Box<dyn PayloadSource>>) -> Self {
        let total = dicts
            .iter()
            .map(|d| d.count())
            .try_fold(u64::MAX, |acc, c| c.map(|c| acc.min(c)));
        Self { dicts, total }
    }
}

impl PayloadIterator for ZipIterator {
    fn count(&self) -> Option<u64> {
        self.total
    }

    fn next_tuple(&mut self) -> Option<Vec<PayloadValue>> {
        self.dicts
            .iter_mut()
            .map(|d| d.next_value())
            .collect::<Option<Vec<_>>>()
    }
}

/// Sequential concatenation; yields 1-tuples from each input in turn.
pub struct ChainIterator {
    dicts: std::collections::VecDeque<Box<dyn PayloadSource>>,
    total: Option<u64>,
}

impl ChainIterator {
    pub fn new(dicts: Vec<Box<dyn PayloadSource>>) -> Self {
        let total = dicts
            .iter()
            .map(|d| d.count())
            .try_fold(0u64, |acc, c| c.map(|c| acc + c));
        Self {
            dicts: dicts.into(),
            total,
        }
    }
}

impl PayloadIterator for ChainIterator {
    fn count(&self) -> Option<u64> {
        self.total
    }

    fn next_tuple(&mut self) -> Option<Vec<PayloadValue>> {
        loop {
            let front = self.dicts.front_mut()?;
            match front.next_value() {
                Some(v) => return Some(vec![v]),
                None => {
                    self.dicts.pop_front();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::payloads::WordlistPayload;

    fn words(items: &[&str]) -> Box<dyn PayloadSource> {
        Box::new(WordlistPayload::new(
            items.iter().map(|s| s.to_string()).collect(),
        ))
    }

    fn drain(mut it: impl PayloadIterator) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        while let Some(tuple) = it.next_tuple() {
            out.push(tuple.iter().map(|v| v.render()).collect());
        }
        out
    }

    #[test]
    fn test_product_order_and_count() {
        let it = ProductIterator::new(vec![words(&["a", "b"]), words(&["1", "2", "3"])]);
        assert_eq!(it.count(), Some(6));
        let tuples = drain(it);
        assert_eq!(tuples.len(), 6);
        assert_eq!(tuples[0], vec!["a", "1"]);
        assert_eq!(tuples[1], vec!["a", "2"]);
        assert_eq!(tuples[5], vec!["b", "3"]);
    }

    #[test]
    fn test_product_empty_input() {
        let it = ProductIterator::new(vec![words(&["a"]), words(&[])]);
        assert_eq!(it.count(), Some(0));
        assert!(drain(it).is_empty());
    }

    #[test]
    fn test_zip_stops_at_shortest() {
        let it = ZipIterator::new(vec![words(&["u1", "u2", "u3"]), words(&["p1", "p2"])]);
        assert_eq!(it.count(), Some(2));
        let tuples = drain(it);
        assert_eq!(tuples, vec![vec!["u1", "p1"], vec!["u2", "p2"]]);
    }

    #[test]
    fn test_chain_concatenates() {
        let it = ChainIterator::new(vec![words(&["a", "b"]), words(&["c"])]);
        assert_eq!(it.count(), Some(3));
        let tuples = drain(it);
        assert_eq!(tuples, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }
}
