//! Character span algebra.
//!
//! Text in the store is never held as owned strings per node. Each text run
//! is a [`Span`]: a `(source, offset, length)` triple over a shared,
//! immutable [`CharSource`]. Small edits are realized by copying into a
//! batched allocation chunk; larger ones build a lazy [`CharJoin`] so no
//! O(document) copy happens on every keystroke. Join depth is bounded: once
//! it would exceed [`MAX_DEPTH`] the result is flattened.
//!
//! All offsets and lengths count `char`s, not bytes.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Results up to this many chars are copied instead of joined.
pub const MAX_COPY: usize = 64;
/// Joins deeper than this are flattened.
pub const MAX_DEPTH: usize = 64;
/// Size in chars of an allocation chunk.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// A flat array of chars.
///
/// A buffer can be shared by many spans. The allocator only ever appends to
/// it, and only past the end of any span that references it, so a span's
/// chars never change once handed out. Slots are atomics so reading never
/// waits on an append.
#[derive(Debug, Default)]
pub struct CharBuffer {
    slots: Box<[AtomicU32]>,
    len: AtomicUsize,
}

fn decode(slot: &AtomicU32) -> char {
    char::from_u32(slot.load(Ordering::Relaxed)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

impl CharBuffer {
    fn with_capacity(capacity: usize) -> Self {
        CharBuffer {
            slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            len: AtomicUsize::new(0),
        }
    }

    fn from_chars(chars: &[char]) -> Self {
        CharBuffer {
            slots: chars.iter().map(|c| AtomicU32::new(*c as u32)).collect(),
            len: AtomicUsize::new(chars.len()),
        }
    }

    /// Number of chars written so far.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chars the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    // only the allocator appends, and only with room left
    fn append(&self, chars: &[char]) -> usize {
        let offset = self.len();
        for (slot, c) in self.slots[offset..offset + chars.len()].iter().zip(chars) {
            slot.store(*c as u32, Ordering::Relaxed);
        }
        self.len.store(offset + chars.len(), Ordering::Release);
        offset
    }

    fn char_at(&self, index: usize) -> char {
        decode(&self.slots[index])
    }

    fn copy_into(&self, off: usize, cch: usize, out: &mut Vec<char>) {
        out.extend(self.slots[off..off + cch].iter().map(decode));
    }
}

/// Lazy concatenation of two spans.
#[derive(Debug)]
pub struct CharJoin {
    left: Span,
    right: Span,
    depth: usize,
}

impl CharJoin {
    fn new(left: Span, right: Span) -> Self {
        let depth = left.depth().max(right.depth()) + 1;
        CharJoin { left, right, depth }
    }

    pub fn len(&self) -> usize {
        self.left.cch + self.right.cch
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// The backing store of a [`Span`].
#[derive(Debug, Clone, Default)]
pub enum CharSource {
    /// No chars at all.
    #[default]
    Empty,
    /// An ASCII-only string; char offsets are byte offsets.
    Str(Arc<str>),
    /// A flat char array.
    Buffer(Arc<CharBuffer>),
    /// A lazy join of two spans.
    Join(Arc<CharJoin>),
}

impl CharSource {
    /// Logical length of the whole source.
    pub fn len(&self) -> usize {
        match self {
            CharSource::Empty => 0,
            CharSource::Str(s) => s.len(),
            CharSource::Buffer(b) => b.len(),
            CharSource::Join(j) => j.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join depth; flat sources have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            CharSource::Join(j) => j.depth,
            _ => 0,
        }
    }

    fn flat_char(&self, index: usize) -> char {
        match self {
            CharSource::Str(s) => s.as_bytes()[index] as char,
            CharSource::Buffer(b) => b.char_at(index),
            CharSource::Empty | CharSource::Join(_) => {
                unreachable!("not a flat source")
            }
        }
    }
}

/// A `(source, offset, length)` descriptor of a range of chars.
#[derive(Debug, Clone, Default)]
pub struct Span {
    pub(crate) src: CharSource,
    pub(crate) off: usize,
    pub(crate) cch: usize,
}

impl Span {
    pub fn new(src: CharSource, off: usize, cch: usize) -> Self {
        let span = Span { src, off, cch };
        debug_assert!(span.is_valid());
        span
    }

    pub fn empty() -> Self {
        Span::default()
    }

    /// A span over a string without copying when it is ASCII.
    pub fn from_str(s: &str) -> Self {
        if s.is_empty() {
            Span::empty()
        } else if s.is_ascii() {
            Span::new(CharSource::Str(Arc::from(s)), 0, s.len())
        } else {
            let chars: Vec<char> = s.chars().collect();
            let cch = chars.len();
            Span::new(
                CharSource::Buffer(Arc::new(CharBuffer::from_chars(&chars))),
                0,
                cch,
            )
        }
    }

    pub fn source(&self) -> &CharSource {
        &self.src
    }

    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn len(&self) -> usize {
        self.cch
    }

    pub fn is_empty(&self) -> bool {
        self.cch == 0
    }

    pub fn depth(&self) -> usize {
        self.src.depth()
    }

    pub fn is_join(&self) -> bool {
        matches!(self.src, CharSource::Join(_))
    }

    /// Does the descriptor stay within its source?
    pub fn is_valid(&self) -> bool {
        match self.src {
            CharSource::Empty => self.off == 0 && self.cch == 0,
            _ => self.off + self.cch <= self.src.len(),
        }
    }

    /// A sub-range of this span.
    pub fn sub(&self, off: usize, cch: usize) -> Span {
        assert!(off + cch <= self.cch, "sub-span out of range");
        if cch == 0 {
            return Span::empty();
        }
        Span {
            src: self.src.clone(),
            off: self.off + off,
            cch,
        }
    }

    pub fn char_at(&self, index: usize) -> char {
        assert!(index < self.cch, "char index out of range");
        let mut src = &self.src;
        let mut index = self.off + index;
        loop {
            match src {
                CharSource::Join(join) => {
                    if index < join.left.cch {
                        index += join.left.off;
                        src = &join.left.src;
                    } else {
                        index = index - join.left.cch + join.right.off;
                        src = &join.right.src;
                    }
                }
                flat => return flat.flat_char(index),
            }
        }
    }

    /// Append the chars of this span to `out`.
    pub fn get_chars(&self, out: &mut Vec<char>) {
        if self.cch == 0 {
            return;
        }
        match &self.src {
            CharSource::Empty => {}
            CharSource::Str(s) => out.extend(s[self.off..self.off + self.cch].chars()),
            CharSource::Buffer(b) => b.copy_into(self.off, self.cch, out),
            CharSource::Join(join) => {
                let (left, right) = join.split(self.off, self.cch);
                left.get_chars(out);
                right.get_chars(out);
            }
        }
    }

    pub fn to_chars(&self) -> Vec<char> {
        let mut chars = Vec::with_capacity(self.cch);
        self.get_chars(&mut chars);
        chars
    }

    pub fn get_string(&self) -> String {
        match &self.src {
            CharSource::Str(s) => s[self.off..self.off + self.cch].to_string(),
            _ => self.to_chars().into_iter().collect(),
        }
    }

    pub fn iter(&self) -> CharIterator {
        CharIterator::new(self.clone())
    }

    /// True if every char is a space, tab, newline or carriage return.
    pub fn is_white_space(&self) -> bool {
        self.iter().all(is_white_space)
    }

    /// The span with leading whitespace excluded.
    pub fn strip_left(&self) -> Span {
        let n = self.iter().take_while(|c| is_white_space(*c)).count();
        self.sub(n, self.cch - n)
    }

    /// The span with trailing whitespace excluded.
    pub fn strip_right(&self) -> Span {
        let mut iter = self.iter();
        iter.move_to(self.cch);
        let mut n = 0;
        while iter.has_prev() {
            if !is_white_space(iter.prev_char()) {
                break;
            }
            n += 1;
        }
        self.sub(0, self.cch - n)
    }
}

impl CharJoin {
    // split a range of the join's content into the part taken from the left
    // span and the part taken from the right span
    fn split(&self, off: usize, cch: usize) -> (Span, Span) {
        let left_cch = self.left.cch;
        if off >= left_cch {
            return (Span::empty(), self.right.sub(off - left_cch, cch));
        }
        let take_left = cch.min(left_cch - off);
        (
            self.left.sub(off, take_left),
            self.right.sub(0, cch - take_left),
        )
    }
}

pub(crate) fn is_white_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Per-locale span allocator.
///
/// Small edit results are copied into a shared chunk to bound join depth.
/// It is not synchronized: it belongs to one [`Locale`](crate::Locale).
#[derive(Debug)]
pub struct CharUtil {
    current: Option<Arc<CharBuffer>>,
    current_offset: usize,
    buffer_size: usize,
}

impl Default for CharUtil {
    fn default() -> Self {
        Self::new()
    }
}

impl CharUtil {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        CharUtil {
            current: None,
            current_offset: 0,
            buffer_size,
        }
    }

    fn can_allocate(&self, cch: usize) -> bool {
        self.current.is_none() || self.buffer_size - self.current_offset >= cch
    }

    fn allocate(&mut self, chars: &[char]) -> Span {
        if chars.is_empty() {
            return Span::empty();
        }
        if chars.len() > self.buffer_size {
            let buffer = CharBuffer::from_chars(chars);
            return Span::new(CharSource::Buffer(Arc::new(buffer)), 0, chars.len());
        }
        if self.current.is_none() || !self.can_allocate(chars.len()) {
            self.current = Some(Arc::new(CharBuffer::with_capacity(self.buffer_size)));
            self.current_offset = 0;
        }
        let Some(current) = &self.current else {
            unreachable!("allocation chunk was just created");
        };
        let off = current.append(chars);
        debug_assert_eq!(off, self.current_offset);
        self.current_offset += chars.len();
        Span::new(CharSource::Buffer(current.clone()), off, chars.len())
    }

    /// Copy a span into flat storage.
    pub fn save_chars(&mut self, span: &Span) -> Span {
        self.allocate(&span.to_chars())
    }

    /// Store freshly loaded text. Short text is batched into the current
    /// chunk, longer ASCII text is referenced as a string.
    pub fn save_str(&mut self, s: &str) -> Span {
        if s.len() <= MAX_COPY || !s.is_ascii() {
            let chars: Vec<char> = s.chars().collect();
            self.allocate(&chars)
        } else {
            Span::from_str(s)
        }
    }

    fn is_current_tail(&self, span: &Span) -> bool {
        match (&span.src, &self.current) {
            (CharSource::Buffer(b), Some(current)) => {
                Arc::ptr_eq(b, current) && span.off + span.cch == self.current_offset
            }
            _ => false,
        }
    }

    fn join(&mut self, left: Span, right: Span) -> Span {
        let cch = left.cch + right.cch;
        let join = CharJoin::new(left, right);
        let span = Span::new(CharSource::Join(Arc::new(join)), 0, cch);
        if span.depth() > MAX_DEPTH {
            tracing::trace!(cch, "flattening char join");
            return self.save_chars(&span);
        }
        span
    }

    /// Insert `insert` into `src` at char position `pos`.
    pub fn insert_chars(&mut self, pos: usize, insert: &Span, src: &Span) -> Span {
        assert!(pos <= src.cch, "insert position out of range");
        if insert.cch == 0 {
            return src.clone();
        }
        if src.cch == 0 {
            return insert.clone();
        }
        let total = src.cch + insert.cch;

        // appending to the most recent allocation extends it in place
        if pos == src.cch && self.is_current_tail(src) && self.can_allocate(insert.cch) {
            let tail = insert.to_chars();
            let extended = self.allocate(&tail);
            debug_assert_eq!(extended.off, src.off + src.cch);
            return Span {
                src: src.src.clone(),
                off: src.off,
                cch: total,
            };
        }

        if total <= MAX_COPY && self.can_allocate(total) {
            let mut chars = Vec::with_capacity(total);
            src.sub(0, pos).get_chars(&mut chars);
            insert.get_chars(&mut chars);
            src.sub(pos, src.cch - pos).get_chars(&mut chars);
            return self.allocate(&chars);
        }

        if pos == 0 {
            self.join(insert.clone(), src.clone())
        } else if pos == src.cch {
            self.join(src.clone(), insert.clone())
        } else {
            let left = self.join(src.sub(0, pos), insert.clone());
            self.join(left, src.sub(pos, src.cch - pos))
        }
    }

    /// Remove `cch` chars at position `pos` from `src`.
    pub fn remove_chars(&mut self, pos: usize, cch: usize, src: &Span) -> Span {
        assert!(pos + cch <= src.cch, "remove range out of range");
        if cch == 0 {
            return src.clone();
        }
        if cch == src.cch {
            return Span::empty();
        }
        if pos == 0 {
            return src.sub(cch, src.cch - cch);
        }
        if pos + cch == src.cch {
            return src.sub(0, pos);
        }
        let remaining = src.cch - cch;
        let right = src.sub(pos + cch, src.cch - pos - cch);
        if remaining <= MAX_COPY && self.can_allocate(remaining) {
            let mut chars = Vec::with_capacity(remaining);
            src.sub(0, pos).get_chars(&mut chars);
            right.get_chars(&mut chars);
            return self.allocate(&chars);
        }
        self.join(src.sub(0, pos), right)
    }
}

// one ancestor join of the iterator position; `base` maps the join's own
// coordinates to root coordinates, `lo..hi` is the root range it covers
#[derive(Debug, Clone)]
struct Frame {
    join: Arc<CharJoin>,
    base: isize,
    lo: usize,
    hi: usize,
}

#[derive(Debug, Clone)]
struct Leaf {
    src: CharSource,
    base: isize,
    lo: usize,
    hi: usize,
}

/// Char cursor over a span of arbitrarily nested joins.
///
/// Keeps an explicit stack of ancestor joins so that stepping forward or
/// backward costs amortized constant time instead of a descent from the root
/// per char.
#[derive(Debug, Clone)]
pub struct CharIterator {
    root: Span,
    pos: usize,
    stack: Vec<Frame>,
    leaf: Option<Leaf>,
}

impl CharIterator {
    pub fn new(span: Span) -> Self {
        CharIterator {
            root: span,
            pos: 0,
            stack: Vec::new(),
            leaf: None,
        }
    }

    /// Position in the span, `0..=len`.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn move_to(&mut self, pos: usize) {
        assert!(pos <= self.root.cch, "iterator position out of range");
        self.pos = pos;
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.root.cch
    }

    pub fn has_prev(&self) -> bool {
        self.pos > 0
    }

    pub fn next_char(&mut self) -> char {
        assert!(self.has_next());
        let c = self.char_at_abs(self.root.off + self.pos);
        self.pos += 1;
        c
    }

    pub fn prev_char(&mut self) -> char {
        assert!(self.has_prev());
        self.pos -= 1;
        self.char_at_abs(self.root.off + self.pos)
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    fn char_at_abs(&mut self, abs: usize) -> char {
        self.seek(abs);
        let Some(leaf) = &self.leaf else {
            unreachable!("seek always ends on a leaf");
        };
        leaf.src.flat_char((abs as isize - leaf.base) as usize)
    }

    fn seek(&mut self, abs: usize) {
        if let Some(leaf) = &self.leaf {
            if leaf.lo <= abs && abs < leaf.hi {
                return;
            }
        }
        self.leaf = None;
        while let Some(top) = self.stack.last() {
            if top.lo <= abs && abs < top.hi {
                break;
            }
            self.stack.pop();
        }
        let (lo, hi) = (self.root.off, self.root.off + self.root.cch);
        if self.stack.is_empty() {
            match &self.root.src {
                CharSource::Join(join) => self.stack.push(Frame {
                    join: join.clone(),
                    base: 0,
                    lo,
                    hi,
                }),
                flat => {
                    self.leaf = Some(Leaf {
                        src: flat.clone(),
                        base: 0,
                        lo,
                        hi,
                    });
                    return;
                }
            }
        }
        loop {
            let Some(top) = self.stack.last() else {
                unreachable!("descent starts from a frame");
            };
            let c = (abs as isize - top.base) as usize;
            let left_cch = top.join.left.cch;
            let (child, child_lo) = if c < left_cch {
                (&top.join.left, top.base)
            } else {
                (&top.join.right, top.base + left_cch as isize)
            };
            let child_base = child_lo - child.off as isize;
            let lo = child_lo.max(top.lo as isize) as usize;
            let hi = (child_lo + child.cch as isize).min(top.hi as isize) as usize;
            let src = child.src.clone();
            match src {
                CharSource::Join(join) => self.stack.push(Frame {
                    join,
                    base: child_base,
                    lo,
                    hi,
                }),
                flat => {
                    self.leaf = Some(Leaf {
                        src: flat,
                        base: child_base,
                        lo,
                        hi,
                    });
                    return;
                }
            }
        }
    }
}

impl Iterator for CharIterator {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        if self.has_next() {
            Some(self.next_char())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(s: &str) -> Span {
        let chars: Vec<char> = s.chars().collect();
        let cch = chars.len();
        Span::new(
            CharSource::Buffer(Arc::new(CharBuffer::from_chars(&chars))),
            0,
            cch,
        )
    }

    #[test]
    fn test_strip() {
        let span = Span::from_str("  hello  ");
        let left = span.strip_left();
        assert_eq!((left.offset(), left.len()), (2, 7));
        assert_eq!(left.get_string(), "hello  ");
        let right = left.strip_right();
        assert_eq!((right.offset(), right.len()), (2, 5));
        assert_eq!(right.get_string(), "hello");
    }

    #[test]
    fn test_strip_all_whitespace() {
        let span = Span::from_str(" \t\r\n");
        assert!(span.is_white_space());
        assert!(span.strip_left().is_empty());
        assert!(span.strip_right().is_empty());
    }

    #[test]
    fn test_is_white_space() {
        assert!(Span::empty().is_white_space());
        assert!(!Span::from_str(" a ").is_white_space());
    }

    #[test]
    fn test_small_insert_stays_flat() {
        let mut util = CharUtil::new();
        let src = flat("0123456789");
        let result = util.insert_chars(5, &Span::from_str("abc"), &src);
        assert!(matches!(result.source(), CharSource::Buffer(_)));
        assert_eq!(result.get_string(), "01234abc56789");
    }

    #[test]
    fn test_large_insert_joins() {
        let mut util = CharUtil::new();
        let src = Span::from_str(&"x".repeat(100));
        let result = util.insert_chars(50, &Span::from_str("abc"), &src);
        assert!(result.is_join());
        assert_eq!(result.len(), 103);
        assert_eq!(result.get_string(), format!("{}abc{}", "x".repeat(50), "x".repeat(50)));
    }

    #[test]
    fn test_append_extends_current_chunk() {
        let mut util = CharUtil::new();
        let first = util.insert_chars(0, &Span::from_str("ab"), &Span::empty());
        let first = util.save_chars(&first);
        let second = util.insert_chars(2, &Span::from_str("cd"), &first);
        assert_eq!(second.offset(), first.offset());
        assert_eq!(second.get_string(), "abcd");
        // the original span is unaffected
        assert_eq!(first.get_string(), "ab");
    }

    #[test]
    fn test_deep_join_flattens() {
        // inserts longer than the chunk can't be copied, so every append joins
        let mut util = CharUtil::with_buffer_size(16);
        let piece = "p".repeat(MAX_COPY + 1);
        let mut expected = "y".repeat(100);
        let mut span = Span::from_str(&expected);
        for i in 1..=MAX_DEPTH {
            let insert = util.save_str(&piece);
            span = util.insert_chars(span.len(), &insert, &span);
            expected.push_str(&piece);
            assert!(span.is_join());
            assert_eq!(span.depth(), i);
        }
        let insert = util.save_str(&piece);
        span = util.insert_chars(span.len(), &insert, &span);
        expected.push_str(&piece);
        assert!(matches!(span.source(), CharSource::Buffer(_)));
        assert_eq!(span.depth(), 0);
        assert_eq!(span.get_string(), expected);

        // and joining starts over from the flat result
        let insert = util.save_str(&piece);
        span = util.insert_chars(0, &insert, &span);
        assert_eq!(span.depth(), 1);
    }

    #[test]
    fn test_shared_chunk_reads_while_appending() {
        let mut util = CharUtil::with_buffer_size(32);
        let first = util.save_str("abc");
        let second = util.save_str("d\u{e9}f");
        let CharSource::Buffer(chunk) = first.source() else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.capacity(), 32);
        assert_eq!(chunk.len(), 6);
        assert_eq!(second.offset(), 3);
        assert_eq!(first.get_string(), "abc");
        assert_eq!(second.char_at(1), '\u{e9}');
    }

    #[test]
    fn test_remove_chars() {
        let mut util = CharUtil::new();
        let src = Span::from_str("hello world");
        assert_eq!(util.remove_chars(0, 6, &src).get_string(), "world");
        assert_eq!(util.remove_chars(5, 6, &src).get_string(), "hello");
        assert_eq!(util.remove_chars(2, 3, &src).get_string(), "he world");
        assert!(util.remove_chars(0, 11, &src).is_empty());
    }

    #[test]
    fn test_remove_large_joins() {
        let mut util = CharUtil::new();
        let text = "z".repeat(80) + "0123456789" + &"w".repeat(80);
        let src = Span::from_str(&text);
        let result = util.remove_chars(80, 10, &src);
        assert!(result.is_join());
        assert_eq!(result.get_string(), "z".repeat(80) + &"w".repeat(80));
    }

    #[test]
    fn test_non_ascii() {
        let span = Span::from_str("héllo wörld");
        assert_eq!(span.len(), 11);
        assert_eq!(span.char_at(1), 'é');
        assert_eq!(span.sub(6, 5).get_string(), "wörld");
    }

    #[test]
    fn test_iterator_over_nested_joins() {
        let mut util = CharUtil::with_buffer_size(8);
        let mut span = Span::from_str(&"-".repeat(70));
        span = util.insert_chars(10, &Span::from_str(&"a".repeat(70)), &span);
        span = util.insert_chars(100, &Span::from_str(&"b".repeat(70)), &span);
        let expected = span.get_string();

        let collected: String = span.iter().collect();
        assert_eq!(collected, expected);

        let mut iter = span.iter();
        iter.move_to(span.len());
        let mut reversed = Vec::new();
        while iter.has_prev() {
            reversed.push(iter.prev_char());
        }
        reversed.reverse();
        assert_eq!(reversed.into_iter().collect::<String>(), expected);
        assert!(iter.depth() <= MAX_DEPTH);
    }

    #[test]
    fn test_iterator_on_sub_span() {
        let mut util = CharUtil::new();
        let span = util.insert_chars(
            40,
            &Span::from_str(&"b".repeat(40)),
            &Span::from_str(&"a".repeat(80)),
        );
        let sub = span.sub(35, 10);
        assert_eq!(sub.iter().collect::<String>(), "aaaaabbbbb");
        assert_eq!(sub.char_at(5), 'b');
    }

    #[test]
    fn test_validity() {
        let span = Span::from_str("abc");
        assert!(span.is_valid());
        assert!(span.sub(1, 2).is_valid());
        assert!(Span::empty().is_valid());
    }
}
