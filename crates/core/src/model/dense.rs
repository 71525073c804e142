//! Fully pushed rows.

use serde_json::Value;

use super::window::WindowedRows;
use super::{DeltaError, DeltaResult, check_index, check_range};

/// Every row of the list, in order.
#[derive(Debug, Default)]
pub(crate) struct DenseRows {
	rows: Vec<Value>,
}

impl DenseRows {
	pub fn new(rows: Vec<Value>) -> Self {
		Self { rows }
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn get(&self, row: usize) -> Option<&Value> {
		self.rows.get(row)
	}

	pub fn insert(&mut self, start: usize, rows: Vec<Value>) -> DeltaResult<()> {
		if start > self.rows.len() {
			return Err(DeltaError::OutOfRange {
				row: start,
				row_count: self.rows.len(),
			});
		}
		self.rows.splice(start..start, rows);
		Ok(())
	}

	/// Removes `start..=end`.
	pub fn remove(&mut self, start: usize, end: usize) -> DeltaResult<()> {
		check_range(start, end, self.rows.len())?;
		self.rows.drain(start..=end);
		Ok(())
	}

	/// Moves `start..=end` to `destination`. Returns false for a no-op move.
	pub fn move_rows(&mut self, start: usize, end: usize, destination: usize) -> DeltaResult<bool> {
		check_range(start, end, self.rows.len())?;
		check_index(destination, self.rows.len())?;
		if (start..=end).contains(&destination) {
			return Ok(false);
		}
		let count = end - start + 1;
		let block: Vec<Value> = self.rows.drain(start..=end).collect();
		let at = if destination < start {
			destination
		} else {
			destination + 1 - count
		};
		self.rows.splice(at..at, block);
		Ok(true)
	}

	pub fn update(&mut self, row: usize, data: Value) -> DeltaResult<()> {
		check_index(row, self.rows.len())?;
		self.rows[row] = data;
		Ok(())
	}

	/// Overwrites rows starting at `start`; rows past the end are ignored.
	pub fn load(&mut self, start: usize, rows: Vec<Value>) -> usize {
		let mut loaded = 0;
		for (offset, data) in rows.into_iter().enumerate() {
			let Some(slot) = self.rows.get_mut(start + offset) else {
				break;
			};
			*slot = data;
			loaded += 1;
		}
		loaded
	}

	pub fn into_windowed(self, batch_size: usize, cache_size: usize) -> WindowedRows {
		let mut windowed = WindowedRows::new(batch_size, cache_size);
		windowed.reset(self.rows, 0);
		windowed
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn rows(count: usize) -> DenseRows {
		DenseRows::new((0..count).map(|i| json!(i)).collect())
	}

	fn values(rows: &DenseRows) -> Vec<i64> {
		(0..rows.len()).map(|i| rows.get(i).and_then(Value::as_i64).unwrap()).collect()
	}

	#[test]
	fn test_move_down() {
		let mut list = rows(10);
		assert!(list.move_rows(2, 4, 7).unwrap());
		assert_eq!(values(&list), vec![0, 1, 5, 6, 7, 2, 3, 4, 8, 9]);
	}

	#[test]
	fn test_move_up() {
		let mut list = rows(10);
		assert!(list.move_rows(5, 7, 1).unwrap());
		assert_eq!(values(&list), vec![0, 5, 6, 7, 1, 2, 3, 4, 8, 9]);
	}

	#[test]
	fn test_move_into_itself_is_noop() {
		let mut list = rows(5);
		assert!(!list.move_rows(1, 3, 2).unwrap());
		assert_eq!(values(&list), vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn test_insert_remove_update() {
		let mut list = rows(3);
		list.insert(1, vec![json!(10), json!(11)]).unwrap();
		assert_eq!(values(&list), vec![0, 10, 11, 1, 2]);

		list.remove(0, 1).unwrap();
		assert_eq!(values(&list), vec![11, 1, 2]);

		list.update(2, json!(20)).unwrap();
		assert_eq!(values(&list), vec![11, 1, 20]);
	}

	#[test]
	fn test_invalid_deltas() {
		let mut list = rows(3);
		assert!(list.insert(4, vec![json!(1)]).is_err());
		assert!(list.remove(2, 3).is_err());
		assert!(list.remove(2, 1).is_err());
		assert!(list.move_rows(0, 0, 3).is_err());
		assert!(list.update(3, json!(0)).is_err());
		assert_eq!(values(&list), vec![0, 1, 2]);
	}

	#[test]
	fn test_load_overwrites_in_range() {
		let mut list = rows(3);
		assert_eq!(list.load(2, vec![json!(7), json!(8)]), 1);
		assert_eq!(values(&list), vec![0, 1, 7]);
	}
}
