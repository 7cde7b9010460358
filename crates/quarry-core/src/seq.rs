// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A doubly linked, token-addressable ordered sequence.
//!
//! [`OrderedSeq`] backs both the scheduler's pending queue and the cache's
//! LRU list. It supports O(1) append, removal, and repositioning (to the
//! front, to the back, or adjacent to another element) without invalidating
//! the tokens of other elements. Storage is a slab of slots linked by
//! indices; removed slots go on a free list and are reused, with a
//! per-slot stamp so that a stale token never silently aliases a new
//! element.

/// A stable handle to one element of an [`OrderedSeq`].
///
/// Tokens remain valid across any mutation of the sequence except the
/// removal of the element they refer to. A token held past that removal is
/// *stale*: every accessor detects it and returns `None` (or `false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqToken {
    index: u32,
    stamp: u32,
}

/// Index link used inside slots. `None` marks the end of a chain.
type Link = Option<u32>;

#[derive(Debug)]
enum Slot<T> {
    Occupied {
        value: T,
        stamp: u32,
        prev: Link,
        next: Link,
    },
    Free {
        /// Stamp the slot will carry when next occupied.
        stamp: u32,
        next_free: Link,
    },
}

/// A doubly linked sequence addressed by stable [`SeqToken`]s.
///
/// Order is explicit: the *front* is one end, the *back* the other, and the
/// callers of this container assign them meaning (the cache keeps its
/// least-recently-used element at the front; the scheduler keeps the next
/// task to dispatch at the front).
#[derive(Debug)]
pub struct OrderedSeq<T> {
    slots: Vec<Slot<T>>,
    head: Link,
    tail: Link,
    free: Link,
    len: usize,
}

impl<T> Default for OrderedSeq<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedSeq<T> {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
            free: None,
            len: 0,
        }
    }

    /// Number of elements currently in the sequence.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the sequence holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Token of the front element, if any.
    pub fn front(&self) -> Option<SeqToken> {
        self.head.map(|i| self.token_at(i))
    }

    /// Token of the back element, if any.
    pub fn back(&self) -> Option<SeqToken> {
        self.tail.map(|i| self.token_at(i))
    }

    /// Appends `value` at the back and returns its token.
    pub fn push_back(&mut self, value: T) -> SeqToken {
        let index = self.alloc(value);
        self.link_at_tail(index);
        self.len += 1;
        self.token_at(index)
    }

    /// Removes the element behind `token` and returns its value.
    ///
    /// Returns `None` if the token is stale. All other tokens remain valid.
    pub fn remove(&mut self, token: SeqToken) -> Option<T> {
        if !self.contains(token) {
            return None;
        }
        self.unlink(token.index);
        self.len -= 1;
        Some(self.release(token.index))
    }

    /// `true` if `token` still refers to a live element.
    pub fn contains(&self, token: SeqToken) -> bool {
        match self.slots.get(token.index as usize) {
            Some(Slot::Occupied { stamp, .. }) => *stamp == token.stamp,
            _ => false,
        }
    }

    /// Borrows the element behind `token`, or `None` if the token is stale.
    pub fn get(&self, token: SeqToken) -> Option<&T> {
        match self.slots.get(token.index as usize) {
            Some(Slot::Occupied { value, stamp, .. }) if *stamp == token.stamp => Some(value),
            _ => None,
        }
    }

    /// Mutably borrows the element behind `token`.
    pub fn get_mut(&mut self, token: SeqToken) -> Option<&mut T> {
        match self.slots.get_mut(token.index as usize) {
            Some(Slot::Occupied { value, stamp, .. }) if *stamp == token.stamp => Some(value),
            _ => None,
        }
    }

    /// Token of the element after `token`, front-to-back.
    pub fn next(&self, token: SeqToken) -> Option<SeqToken> {
        if !self.contains(token) {
            return None;
        }
        self.next_of(token.index).map(|i| self.token_at(i))
    }

    /// Token of the element before `token`, front-to-back.
    pub fn prev(&self, token: SeqToken) -> Option<SeqToken> {
        if !self.contains(token) {
            return None;
        }
        self.prev_of(token.index).map(|i| self.token_at(i))
    }

    /// Moves the element behind `token` to the front. Returns `false` on a
    /// stale token.
    pub fn move_to_front(&mut self, token: SeqToken) -> bool {
        if !self.contains(token) {
            return false;
        }
        if self.head == Some(token.index) {
            return true;
        }
        self.unlink(token.index);
        self.link_at_head(token.index);
        true
    }

    /// Moves the element behind `token` to the back. Returns `false` on a
    /// stale token.
    pub fn move_to_back(&mut self, token: SeqToken) -> bool {
        if !self.contains(token) {
            return false;
        }
        if self.tail == Some(token.index) {
            return true;
        }
        self.unlink(token.index);
        self.link_at_tail(token.index);
        true
    }

    /// Repositions `token` immediately before `anchor` (front side).
    ///
    /// Returns `false` if either token is stale; moving a token before
    /// itself is a no-op.
    pub fn move_before(&mut self, token: SeqToken, anchor: SeqToken) -> bool {
        if !self.contains(token) || !self.contains(anchor) {
            return false;
        }
        if token == anchor {
            return true;
        }
        self.unlink(token.index);
        let anchor_prev = self.prev_of(anchor.index);
        self.link_between(token.index, anchor_prev, Some(anchor.index));
        true
    }

    /// Repositions `token` immediately after `anchor` (back side).
    pub fn move_after(&mut self, token: SeqToken, anchor: SeqToken) -> bool {
        if !self.contains(token) || !self.contains(anchor) {
            return false;
        }
        if token == anchor {
            return true;
        }
        self.unlink(token.index);
        let anchor_next = self.next_of(anchor.index);
        self.link_between(token.index, Some(anchor.index), anchor_next);
        true
    }

    /// Iterates front-to-back over `(token, &value)` pairs.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            seq: self,
            cursor: self.head,
        }
    }

    /// Iterates back-to-front over `(token, &value)` pairs.
    pub fn iter_rev(&self) -> IterRev<'_, T> {
        IterRev {
            seq: self,
            cursor: self.tail,
        }
    }

    // --- slot plumbing ---

    fn token_at(&self, index: u32) -> SeqToken {
        let stamp = match &self.slots[index as usize] {
            Slot::Occupied { stamp, .. } => *stamp,
            Slot::Free { .. } => unreachable!("token_at on a free slot"),
        };
        SeqToken { index, stamp }
    }

    fn alloc(&mut self, value: T) -> u32 {
        match self.free {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let (stamp, next_free) = match slot {
                    Slot::Free { stamp, next_free } => (*stamp, *next_free),
                    Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
                };
                self.free = next_free;
                *slot = Slot::Occupied {
                    value,
                    stamp,
                    prev: None,
                    next: None,
                };
                index
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("sequence slot overflow");
                self.slots.push(Slot::Occupied {
                    value,
                    stamp: 0,
                    prev: None,
                    next: None,
                });
                index
            }
        }
    }

    /// Puts a detached occupied slot back on the free list, bumping its
    /// stamp so outstanding tokens for it go stale.
    fn release(&mut self, index: u32) -> T {
        let slot = std::mem::replace(
            &mut self.slots[index as usize],
            Slot::Free {
                stamp: 0,
                next_free: self.free,
            },
        );
        match slot {
            Slot::Occupied { value, stamp, .. } => {
                self.slots[index as usize] = Slot::Free {
                    stamp: stamp.wrapping_add(1),
                    next_free: self.free,
                };
                self.free = Some(index);
                value
            }
            Slot::Free { .. } => unreachable!("release on a free slot"),
        }
    }

    fn prev_of(&self, index: u32) -> Link {
        match &self.slots[index as usize] {
            Slot::Occupied { prev, .. } => *prev,
            Slot::Free { .. } => unreachable!("link query on a free slot"),
        }
    }

    fn next_of(&self, index: u32) -> Link {
        match &self.slots[index as usize] {
            Slot::Occupied { next, .. } => *next,
            Slot::Free { .. } => unreachable!("link query on a free slot"),
        }
    }

    fn set_links(&mut self, index: u32, new_prev: Link, new_next: Link) {
        match &mut self.slots[index as usize] {
            Slot::Occupied { prev, next, .. } => {
                *prev = new_prev;
                *next = new_next;
            }
            Slot::Free { .. } => unreachable!("link update on a free slot"),
        }
    }

    fn set_next(&mut self, index: u32, new_next: Link) {
        match &mut self.slots[index as usize] {
            Slot::Occupied { next, .. } => *next = new_next,
            Slot::Free { .. } => unreachable!("link update on a free slot"),
        }
    }

    fn set_prev(&mut self, index: u32, new_prev: Link) {
        match &mut self.slots[index as usize] {
            Slot::Occupied { prev, .. } => *prev = new_prev,
            Slot::Free { .. } => unreachable!("link update on a free slot"),
        }
    }

    /// Detaches `index` from the chain without touching its slot storage.
    fn unlink(&mut self, index: u32) {
        let prev = self.prev_of(index);
        let next = self.next_of(index);
        match prev {
            Some(p) => self.set_next(p, next),
            None => self.head = next,
        }
        match next {
            Some(n) => self.set_prev(n, prev),
            None => self.tail = prev,
        }
        self.set_links(index, None, None);
    }

    fn link_at_head(&mut self, index: u32) {
        let old_head = self.head;
        self.set_links(index, None, old_head);
        match old_head {
            Some(h) => self.set_prev(h, Some(index)),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn link_at_tail(&mut self, index: u32) {
        let old_tail = self.tail;
        self.set_links(index, old_tail, None);
        match old_tail {
            Some(t) => self.set_next(t, Some(index)),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }

    /// Splices `index` between `before` and `after`, either of which may be
    /// a chain end.
    fn link_between(&mut self, index: u32, before: Link, after: Link) {
        self.set_links(index, before, after);
        match before {
            Some(b) => self.set_next(b, Some(index)),
            None => self.head = Some(index),
        }
        match after {
            Some(a) => self.set_prev(a, Some(index)),
            None => self.tail = Some(index),
        }
    }
}

/// Front-to-back iterator over an [`OrderedSeq`].
pub struct Iter<'a, T> {
    seq: &'a OrderedSeq<T>,
    cursor: Link,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (SeqToken, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        match &self.seq.slots[index as usize] {
            Slot::Occupied {
                value, stamp, next, ..
            } => {
                self.cursor = *next;
                Some((SeqToken { index, stamp: *stamp }, value))
            }
            Slot::Free { .. } => unreachable!("iterator reached a free slot"),
        }
    }
}

/// Back-to-front iterator over an [`OrderedSeq`].
pub struct IterRev<'a, T> {
    seq: &'a OrderedSeq<T>,
    cursor: Link,
}

impl<'a, T> Iterator for IterRev<'a, T> {
    type Item = (SeqToken, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        match &self.seq.slots[index as usize] {
            Slot::Occupied {
                value, stamp, prev, ..
            } => {
                self.cursor = *prev;
                Some((SeqToken { index, stamp: *stamp }, value))
            }
            Slot::Free { .. } => unreachable!("iterator reached a free slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<T: Copy>(seq: &OrderedSeq<T>) -> Vec<T> {
        seq.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn test_push_and_iterate_in_order() {
        let mut seq = OrderedSeq::new();
        seq.push_back(1);
        seq.push_back(2);
        seq.push_back(3);
        assert_eq!(collect(&seq), vec![1, 2, 3]);
        assert_eq!(seq.iter_rev().map(|(_, v)| *v).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn test_remove_keeps_other_tokens_valid() {
        let mut seq = OrderedSeq::new();
        let a = seq.push_back("a");
        let b = seq.push_back("b");
        let c = seq.push_back("c");

        assert_eq!(seq.remove(b), Some("b"));
        assert_eq!(seq.get(a), Some(&"a"));
        assert_eq!(seq.get(c), Some(&"c"));
        assert_eq!(collect(&seq), vec!["a", "c"]);

        // The removed token is stale, even after the slot is reused.
        assert_eq!(seq.get(b), None);
        let d = seq.push_back("d");
        assert_eq!(seq.get(b), None);
        assert!(seq.remove(b).is_none());
        assert_eq!(seq.get(d), Some(&"d"));
    }

    #[test]
    fn test_move_to_front_and_back() {
        let mut seq = OrderedSeq::new();
        let a = seq.push_back(1);
        let _b = seq.push_back(2);
        let c = seq.push_back(3);

        assert!(seq.move_to_front(c));
        assert_eq!(collect(&seq), vec![3, 1, 2]);
        assert!(seq.move_to_back(a));
        assert_eq!(collect(&seq), vec![3, 2, 1]);
        assert_eq!(seq.front(), Some(c));
        assert_eq!(seq.back(), Some(a));
    }

    #[test]
    fn test_move_adjacent() {
        let mut seq = OrderedSeq::new();
        let a = seq.push_back('a');
        let b = seq.push_back('b');
        let c = seq.push_back('c');
        let d = seq.push_back('d');

        assert!(seq.move_before(d, b));
        assert_eq!(collect(&seq), vec!['a', 'd', 'b', 'c']);
        assert!(seq.move_after(a, c));
        assert_eq!(collect(&seq), vec!['d', 'b', 'c', 'a']);
        // Self-anchored moves are no-ops.
        assert!(seq.move_before(b, b));
        assert_eq!(collect(&seq), vec!['d', 'b', 'c', 'a']);
    }

    #[test]
    fn test_single_element_edge_cases() {
        let mut seq = OrderedSeq::new();
        let only = seq.push_back(42);
        assert!(seq.move_to_front(only));
        assert!(seq.move_to_back(only));
        assert_eq!(seq.front(), Some(only));
        assert_eq!(seq.back(), Some(only));
        assert_eq!(seq.remove(only), Some(42));
        assert!(seq.is_empty());
        assert_eq!(seq.front(), None);
        assert_eq!(seq.back(), None);
    }

    #[test]
    fn test_neighbor_queries() {
        let mut seq = OrderedSeq::new();
        let a = seq.push_back(1);
        let b = seq.push_back(2);
        let c = seq.push_back(3);

        assert_eq!(seq.next(a), Some(b));
        assert_eq!(seq.prev(c), Some(b));
        assert_eq!(seq.prev(a), None);
        assert_eq!(seq.next(c), None);
    }

    #[test]
    fn test_slot_reuse_after_churn() {
        let mut seq = OrderedSeq::new();
        let mut tokens = Vec::new();
        for i in 0..8 {
            tokens.push(seq.push_back(i));
        }
        for t in tokens.drain(..) {
            assert!(seq.remove(t).is_some());
        }
        assert!(seq.is_empty());
        for i in 0..8 {
            seq.push_back(i * 10);
        }
        assert_eq!(seq.len(), 8);
        assert_eq!(collect(&seq), vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }
}
