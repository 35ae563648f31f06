//! Cursor over the blocks of a sequence of books

use serde::{Deserialize, Serialize};

use crate::block::{Block, MultiBlockQuote};
use crate::book::BookScript;
use crate::error::{Error, Result};

/// Position of a block (or a run of blocks) among several books
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookBlockIndices {
    pub book_index: usize,
    pub block_index: usize,
    /// Number of blocks in a multi-block quote selection, 0 for a single block
    #[serde(default)]
    pub multi_block_count: usize,
}

impl BookBlockIndices {
    pub fn new(book_index: usize, block_index: usize) -> Self {
        Self {
            book_index,
            block_index,
            multi_block_count: 0,
        }
    }

    pub fn with_multi_block_count(mut self, count: usize) -> Self {
        self.multi_block_count = count;
        self
    }

    pub fn is_multi_block(&self) -> bool {
        self.multi_block_count > 1
    }

    /// Index of the last block covered by these indices
    pub fn effective_final_block_index(&self) -> usize {
        self.block_index + self.multi_block_count.max(1) - 1
    }
}

/// A position in `books` that can be moved block by block
#[derive(Debug, Clone)]
pub struct BlockNavigator<'a> {
    books: &'a [BookScript],
    current: BookBlockIndices,
}

impl<'a> BlockNavigator<'a> {
    /// Start at the first block of the first non-empty book
    pub fn new(books: &'a [BookScript]) -> Self {
        let mut navigator = Self {
            books,
            current: BookBlockIndices::default(),
        };
        navigator.go_to_first();
        navigator
    }

    pub fn indices(&self) -> BookBlockIndices {
        self.current
    }

    pub fn set_indices(&mut self, indices: BookBlockIndices) -> Result<()> {
        let book = self
            .books
            .get(indices.book_index)
            .ok_or_else(|| Error::index_out_of_range(indices.book_index, self.books.len()))?;
        let last = indices.effective_final_block_index();
        if last >= book.len() {
            return Err(Error::index_out_of_range(last, book.len()));
        }
        self.current = indices;
        Ok(())
    }

    pub fn current_book(&self) -> Option<&'a BookScript> {
        self.books.get(self.current.book_index)
    }

    pub fn current_block(&self) -> Option<&'a Block> {
        self.block_at(self.current)
    }

    pub fn block_at(&self, indices: BookBlockIndices) -> Option<&'a Block> {
        self.books.get(indices.book_index)?.block(indices.block_index)
    }

    pub fn go_to_first(&mut self) {
        if let Some(book_index) = self.books.iter().position(|b| !b.is_empty()) {
            self.current = BookBlockIndices::new(book_index, 0);
        }
    }

    pub fn go_to_last(&mut self) {
        if let Some(book_index) = self.books.iter().rposition(|b| !b.is_empty()) {
            self.current = BookBlockIndices::new(book_index, self.books[book_index].len() - 1);
        }
    }

    pub fn is_first_block(&self) -> bool {
        self.previous_indices(self.current).is_none()
    }

    pub fn is_last_block(&self) -> bool {
        self.next_indices(self.current).is_none()
    }

    pub fn is_first_block_in_book(&self) -> bool {
        self.current.block_index == 0
    }

    pub fn is_last_block_in_book(&self) -> bool {
        self.current_book()
            .is_some_and(|book| self.current.effective_final_block_index() + 1 >= book.len())
    }

    /// The block after `from` (after its whole span), crossing into the
    /// next non-empty book at a book's end
    pub fn next_indices(&self, from: BookBlockIndices) -> Option<BookBlockIndices> {
        let next = from.effective_final_block_index() + 1;
        let book = self.books.get(from.book_index)?;
        if next < book.len() {
            return Some(BookBlockIndices::new(from.book_index, next));
        }
        let book_index = (from.book_index + 1..self.books.len()).find(|&i| !self.books[i].is_empty())?;
        Some(BookBlockIndices::new(book_index, 0))
    }

    pub fn previous_indices(&self, from: BookBlockIndices) -> Option<BookBlockIndices> {
        if from.block_index > 0 {
            return Some(BookBlockIndices::new(from.book_index, from.block_index - 1));
        }
        let book_index = (0..from.book_index).rev().find(|&i| !self.books[i].is_empty())?;
        Some(BookBlockIndices::new(book_index, self.books[book_index].len() - 1))
    }

    pub fn peek_next_block(&self) -> Option<&'a Block> {
        self.next_indices(self.current).and_then(|i| self.block_at(i))
    }

    pub fn peek_previous_block(&self) -> Option<&'a Block> {
        self.previous_indices(self.current).and_then(|i| self.block_at(i))
    }

    /// Move to the next block and return it
    pub fn next_block(&mut self) -> Option<&'a Block> {
        let next = self.next_indices(self.current)?;
        self.current = next;
        self.current_block()
    }

    /// Move to the previous block and return it
    pub fn previous_block(&mut self) -> Option<&'a Block> {
        let previous = self.previous_indices(self.current)?;
        self.current = previous;
        self.current_block()
    }

    /// The block `n` places after the current one, without leaving the book
    pub fn nth_next_block_within_book(&self, n: usize) -> Option<&'a Block> {
        self.current_book()?.block(self.current.block_index + n)
    }

    pub fn nth_previous_block_within_book(&self, n: usize) -> Option<&'a Block> {
        self.current_book()?.block(self.current.block_index.checked_sub(n)?)
    }

    /// Up to `n` blocks following the current selection in the same book
    pub fn following_blocks_within_book(&self, n: usize) -> &'a [Block] {
        let Some(book) = self.current_book() else {
            return &[];
        };
        let start = (self.current.effective_final_block_index() + 1).min(book.len());
        &book.blocks()[start..(start + n).min(book.len())]
    }

    /// Up to `n` blocks preceding the current selection in the same book
    pub fn preceding_blocks_within_book(&self, n: usize) -> &'a [Block] {
        let Some(book) = self.current_book() else {
            return &[];
        };
        let end = self.current.block_index.min(book.len());
        &book.blocks()[end.saturating_sub(n)..end]
    }

    /// The block at `indices` plus every continuation block that follows it
    /// when it starts a multi-block quote
    pub fn quote_blocks_starting_at(&self, indices: BookBlockIndices) -> &'a [Block] {
        let Some(book) = self.books.get(indices.book_index) else {
            return &[];
        };
        let blocks = book.blocks();
        let Some(block) = blocks.get(indices.block_index) else {
            return &[];
        };
        if block.multi_block_quote != MultiBlockQuote::Start {
            return &blocks[indices.block_index..=indices.block_index];
        }
        let end = (indices.block_index + 1..blocks.len())
            .find(|&i| blocks[i].multi_block_quote != MultiBlockQuote::Continuation)
            .unwrap_or(blocks.len());
        &blocks[indices.block_index..end]
    }

    /// Indices of the start of the quote containing `indices`, spanning the
    /// whole chain
    pub fn indices_of_quote_start(&self, indices: BookBlockIndices) -> Option<BookBlockIndices> {
        let book = self.books.get(indices.book_index)?;
        let blocks = book.blocks();
        blocks.get(indices.block_index)?;
        let mut start = indices.block_index;
        while start > 0 && blocks[start].multi_block_quote == MultiBlockQuote::Continuation {
            start -= 1;
        }
        let start_indices = BookBlockIndices::new(indices.book_index, start);
        let count = self.quote_blocks_starting_at(start_indices).len();
        Some(start_indices.with_multi_block_count(if count > 1 { count } else { 0 }))
    }

    /// Locate `block` (by identity) in book `book_index`
    pub fn indices_of_block(&self, book_index: usize, block: &Block) -> Option<BookBlockIndices> {
        let book = self.books.get(book_index)?;
        book.blocks()
            .iter()
            .position(|b| std::ptr::eq(b, block))
            .map(|i| BookBlockIndices::new(book_index, i))
    }
}
