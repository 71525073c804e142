//! Windowed rows: a bounded cache over a list that is fetched on demand.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{DeltaError, DeltaResult, check_index, check_range, moved_index};

/// Sparse cache of rows in `[0, row_count)`.
///
/// The cache holds at most `cache_size` rows between operations. Eviction drops
/// whichever end of the cached range is farther from the most recent access.
#[derive(Debug)]
pub(crate) struct WindowedRows {
	row_count: usize,
	rows: BTreeMap<usize, Value>,
	batch_size: usize,
	cache_size: usize,
	hint: usize,
}

impl WindowedRows {
	pub fn new(batch_size: usize, cache_size: usize) -> Self {
		let batch_size = batch_size.max(1);
		Self {
			row_count: 0,
			rows: BTreeMap::new(),
			batch_size,
			cache_size: cache_size.max(batch_size),
			hint: 0,
		}
	}

	pub fn row_count(&self) -> usize {
		self.row_count
	}

	pub fn get(&self, row: usize) -> Option<&Value> {
		self.rows.get(&row)
	}

	pub fn cached_rows(&self) -> Vec<usize> {
		self.rows.keys().copied().collect()
	}

	pub fn hint(&self) -> usize {
		self.hint
	}

	pub fn set_batch_size(&mut self, batch_size: usize) {
		self.batch_size = batch_size.max(1);
		self.cache_size = self.cache_size.max(self.batch_size);
	}

	/// Records an access to `row`.
	pub fn touch(&mut self, row: usize) {
		self.hint = row;
	}

	/// Replaces everything with `rows` followed by `more` unfetched rows.
	pub fn reset(&mut self, rows: Vec<Value>, more: usize) {
		self.row_count = rows.len() + more;
		self.rows = rows.into_iter().enumerate().collect();
		self.hint = 0;
		self.clean(0);
	}

	/// Inserts `rows` at `start`, followed by `more` unfetched rows.
	///
	/// Returns the number of rows the list grew by.
	pub fn insert(&mut self, start: usize, rows: Vec<Value>, more: usize) -> DeltaResult<usize> {
		if start > self.row_count {
			return Err(DeltaError::OutOfRange {
				row: start,
				row_count: self.row_count,
			});
		}
		let count = rows.len() + more;
		self.rekey(|row| if row >= start { row + count } else { row });
		self.rows
			.extend(rows.into_iter().enumerate().map(|(offset, data)| (start + offset, data)));
		self.row_count += count;
		if self.hint >= start {
			self.hint += count;
		}
		self.clean(self.hint);
		Ok(count)
	}

	/// Removes `start..=end`.
	pub fn remove(&mut self, start: usize, end: usize) -> DeltaResult<()> {
		check_range(start, end, self.row_count)?;
		let count = end - start + 1;
		self.rows.retain(|row, _| !(start..=end).contains(row));
		self.rekey(|row| if row > end { row - count } else { row });
		self.row_count -= count;
		if self.hint > end {
			self.hint -= count;
		} else if self.hint >= start {
			self.hint = start.min(self.row_count.saturating_sub(1));
		}
		Ok(())
	}

	/// Moves `start..=end` to `destination`. Returns false for a no-op move.
	pub fn move_rows(&mut self, start: usize, end: usize, destination: usize) -> DeltaResult<bool> {
		check_range(start, end, self.row_count)?;
		check_index(destination, self.row_count)?;
		if (start..=end).contains(&destination) {
			return Ok(false);
		}
		self.rekey(|row| moved_index(row, start, end, destination));
		self.hint = moved_index(self.hint, start, end, destination);
		Ok(true)
	}

	/// Replaces a cached row. Uncached rows stay unfetched.
	pub fn update(&mut self, row: usize, data: Value) -> DeltaResult<()> {
		check_index(row, self.row_count)?;
		if let Some(slot) = self.rows.get_mut(&row) {
			*slot = data;
		}
		Ok(())
	}

	/// Caches fetched rows starting at `start`, then trims around the current hint.
	///
	/// Returns the number of rows accepted; rows past the end are ignored.
	pub fn load(&mut self, start: usize, rows: Vec<Value>) -> usize {
		let mut loaded = 0;
		for (offset, data) in rows.into_iter().enumerate() {
			let row = start + offset;
			if row >= self.row_count {
				break;
			}
			self.rows.insert(row, data);
			loaded += 1;
		}
		self.clean(self.hint);
		loaded
	}

	/// The `(start, count)` range to request so that `row` gets cached.
	///
	/// The window is one batch centred on `row`, clipped to the gap between the
	/// nearest cached neighbours and to the list bounds.
	pub fn window_for(&self, row: usize) -> (usize, usize) {
		let lower = self
			.rows
			.range(..row)
			.next_back()
			.map_or(0, |(&cached, _)| cached + 1);
		let upper = self
			.rows
			.range(row + 1..)
			.next()
			.map_or(self.row_count, |(&cached, _)| cached);

		let start = row.saturating_sub(self.batch_size / 2).max(lower);
		let end = (start + self.batch_size).min(upper);
		// Clipped at the top: give the unused part of the batch to rows below.
		let start = end.saturating_sub(self.batch_size).max(lower).min(row);
		(start, end - start)
	}

	/// Evicts rows until the cache fits, farthest from `hint` first.
	pub fn clean(&mut self, hint: usize) {
		self.hint = hint;
		while self.rows.len() > self.cache_size {
			let (Some(&low), Some(&high)) = (self.rows.keys().next(), self.rows.keys().next_back()) else {
				break;
			};
			let victim = if hint.abs_diff(low) >= hint.abs_diff(high) {
				low
			} else {
				high
			};
			self.rows.remove(&victim);
		}
	}

	fn rekey(&mut self, map: impl Fn(usize) -> usize) {
		let rows = std::mem::take(&mut self.rows);
		self.rows = rows.into_iter().map(|(row, data)| (map(row), data)).collect();
	}
}
