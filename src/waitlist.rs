//! Waitlists: the exploration order of the abstractor.
//!
//! Algorithms do not hold a waitlist but a [`WaitlistSupplier`], so that each search
//! starts from a fresh, empty one.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;

pub trait Waitlist<T> {
    fn add(&mut self, item: T);

    fn add_all(&mut self, items: Vec<T>) {
        for item in items {
            self.add(item);
        }
    }

    fn remove(&mut self) -> Option<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

pub type WaitlistSupplier<T> = Rc<dyn Fn() -> Box<dyn Waitlist<T>>>;

/// Breadth-first order.
#[derive(Debug)]
pub struct FifoWaitlist<T> {
    items: VecDeque<T>,
}

impl<T> Default for FifoWaitlist<T> {
    fn default() -> Self {
        Self { items: VecDeque::new() }
    }
}

impl<T: 'static> FifoWaitlist<T> {
    pub fn supplier() -> WaitlistSupplier<T> {
        Rc::new(|| Box::new(FifoWaitlist::default()))
    }
}

impl<T> Waitlist<T> for FifoWaitlist<T> {
    fn add(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn remove(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) {
        self.items.clear();
    }
}

/// Depth-first order.
#[derive(Debug)]
pub struct LifoWaitlist<T> {
    items: Vec<T>,
}

impl<T> Default for LifoWaitlist<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: 'static> LifoWaitlist<T> {
    pub fn supplier() -> WaitlistSupplier<T> {
        Rc::new(|| Box::new(LifoWaitlist::default()))
    }
}

impl<T> Waitlist<T> for LifoWaitlist<T> {
    /// Batches are reversed, so that the first item of a batch is removed first.
    fn add_all(&mut self, items: Vec<T>) {
        self.items.extend(items.into_iter().rev());
    }

    fn add(&mut self, item: T) {
        self.items.push(item);
    }

    fn remove(&mut self) -> Option<T> {
        self.items.pop()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) {
        self.items.clear();
    }
}

type Comparator<T> = Rc<dyn Fn(&T, &T) -> Ordering>;

struct Entry<T> {
    item: T,
    seq: u64,
    cmp: Comparator<T>,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // BinaryHeap is a max-heap: the smallest item (then the oldest) must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cmp)(&other.item, &self.item).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Removes the smallest item under a comparator first; equal items leave in insertion
/// order.
pub struct PriorityWaitlist<T> {
    heap: BinaryHeap<Entry<T>>,
    cmp: Comparator<T>,
    seq: u64,
}

impl<T> PriorityWaitlist<T> {
    pub fn new(cmp: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
        Self {
            heap: BinaryHeap::new(),
            cmp: Rc::new(cmp),
            seq: 0,
        }
    }
}

impl<T: 'static> PriorityWaitlist<T> {
    pub fn supplier(cmp: impl Fn(&T, &T) -> Ordering + 'static) -> WaitlistSupplier<T> {
        let cmp: Comparator<T> = Rc::new(cmp);
        Rc::new(move || {
            let cmp = cmp.clone();
            Box::new(PriorityWaitlist {
                heap: BinaryHeap::new(),
                cmp,
                seq: 0,
            })
        })
    }
}

impl<T> Waitlist<T> for PriorityWaitlist<T> {
    fn add(&mut self, item: T) {
        self.heap.push(Entry {
            item,
            seq: self.seq,
            cmp: self.cmp.clone(),
        });
        self.seq += 1;
    }

    fn remove(&mut self) -> Option<T> {
        self.heap.pop().map(|e| e.item)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn drain(waitlist: &mut dyn Waitlist<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(item) = waitlist.remove() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_fifo() {
        let mut waitlist = (FifoWaitlist::supplier())();
        waitlist.add_all(vec![1, 2]);
        waitlist.add(3);
        assert_eq!(waitlist.len(), 3);
        assert_eq!(drain(waitlist.as_mut()), vec![1, 2, 3]);
        assert!(waitlist.is_empty());
    }

    #[test]
    fn test_lifo() {
        let mut waitlist = (LifoWaitlist::supplier())();
        waitlist.add(0);
        waitlist.add_all(vec![1, 2, 3]);
        assert_eq!(drain(waitlist.as_mut()), vec![1, 2, 3, 0]);
        waitlist.add(4);
        waitlist.clear();
        assert!(waitlist.is_empty());
    }

    #[test]
    fn test_priority_ties_are_fifo() {
        // Order by parity only: evens first, ties in insertion order.
        let mut waitlist = PriorityWaitlist::new(|a: &u32, b: &u32| (a % 2).cmp(&(b % 2)));
        waitlist.add_all(vec![5, 2, 3, 8, 1, 4]);
        assert_eq!(drain(&mut waitlist), vec![2, 8, 4, 5, 3, 1]);
    }

    #[test]
    fn test_suppliers_are_fresh() {
        let supplier = PriorityWaitlist::supplier(|a: &u32, b: &u32| a.cmp(b));
        let mut first = supplier();
        first.add_all(vec![3, 1, 2]);
        let second = supplier();
        assert!(second.is_empty());
        assert_eq!(drain(first.as_mut()), vec![1, 2, 3]);
    }
}
