use std::io::{BufRead, Write};

use crate::error::Result;

/// A single table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Float(f64),
	Text(String),
}

impl Value {
	pub fn as_float(&self) -> Option<f64> {
		match self {
			Value::Float(v) => Some(*v),
			Value::Text(_) => None,
		}
	}
}

/// A small column-ordered table of metric rows. Appending a row with new
/// columns extends the table, back-filling earlier rows with NaN.
#[derive(Debug, Clone, Default)]
pub struct Database {
	columns: Vec<String>,
	rows: Vec<Vec<Value>>,
}

impl Database {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn n_rows(&self) -> usize {
		self.rows.len()
	}

	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	fn column_index(&mut self, name: &str) -> usize {
		if let Some(index) = self.columns.iter().position(|c| c == name) {
			return index;
		}
		self.columns.push(name.to_string());
		for row in self.rows.iter_mut() {
			row.push(Value::Float(f64::NAN));
		}
		self.columns.len() - 1
	}

	pub fn push_row(&mut self, entries: Vec<(String, Value)>) {
		let mut row = vec![Value::Float(f64::NAN); self.columns.len()];
		for (name, value) in entries {
			let index = self.column_index(&name);
			if index >= row.len() {
				row.resize(self.columns.len(), Value::Float(f64::NAN));
			}
			row[index] = value;
		}
		row.resize(self.columns.len(), Value::Float(f64::NAN));
		self.rows.push(row);
	}

	pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
		let index = self.columns.iter().position(|c| c == column)?;
		self.rows.get(row)?.get(index)
	}

	/// Row-concatenate another table into this one, unioning columns.
	pub fn append(&mut self, other: &Database) {
		for row in &other.rows {
			let entries: Vec<(String, Value)> = other
				.columns
				.iter()
				.cloned()
				.zip(row.iter().cloned())
				.collect();
			self.push_row(entries);
		}
	}

	/// NaN-ignoring per-column means of the float columns, prefixed.
	pub fn column_means(&self, prefix: &str) -> Vec<(String, Value)> {
		let mut out = Vec::new();
		for (index, column) in self.columns.iter().enumerate() {
			let mut total = 0.0;
			let mut count = 0usize;
			let mut any_float = false;
			for row in &self.rows {
				if let Some(Value::Float(v)) = row.get(index) {
					any_float = true;
					if v.is_finite() {
						total += v;
						count += 1;
					}
				}
			}
			if any_float {
				let mean = if count > 0 {
					total / count as f64
				} else {
					f64::NAN
				};
				out.push((format!("{}{}", prefix, column), Value::Float(mean)));
			}
		}
		out
	}

	pub fn to_csv<W: Write>(&self, writer: &mut W) -> Result<()> {
		writeln!(writer, "{}", self.columns.join(","))?;
		for row in &self.rows {
			let cells: Vec<String> = row
				.iter()
				.map(|value| match value {
					Value::Float(v) => format!("{}", v),
					Value::Text(s) => s.replace(',', ";"),
				})
				.collect();
			writeln!(writer, "{}", cells.join(","))?;
		}
		Ok(())
	}

	pub fn from_csv<R: BufRead>(reader: R) -> Result<Database> {
		let mut lines = reader.lines();
		let mut database = Database::new();
		let header = match lines.next() {
			Some(line) => line?,
			None => return Ok(database),
		};
		if header.is_empty() {
			return Ok(database);
		}
		database.columns = header.split(',').map(|c| c.to_string()).collect();
		for line in lines {
			let line = line?;
			if line.is_empty() {
				continue;
			}
			let row: Vec<Value> = line
				.split(',')
				.map(|cell| match cell.parse::<f64>() {
					Ok(v) => Value::Float(v),
					Err(_) => Value::Text(cell.to_string()),
				})
				.collect();
			let mut row = row;
			row.resize(database.columns.len(), Value::Float(f64::NAN));
			database.rows.push(row);
		}
		Ok(database)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_push_row_aligns_columns() {
		let mut db = Database::new();
		db.push_row(vec![
			("a".into(), Value::Float(1.0)),
			("b".into(), Value::Float(2.0)),
		]);
		db.push_row(vec![
			("b".into(), Value::Float(3.0)),
			("c".into(), Value::Float(4.0)),
		]);
		assert_eq!(2, db.n_rows());
		assert_eq!(&["a", "b", "c"][..], db.columns());
		assert_eq!(Some(&Value::Float(3.0)), db.value(1, "b"));
		assert!(db
			.value(1, "a")
			.and_then(|v| v.as_float())
			.unwrap()
			.is_nan());
	}

	#[test]
	fn test_append_concatenates() {
		let mut left = Database::new();
		left.push_row(vec![("x".into(), Value::Float(1.0))]);
		let mut right = Database::new();
		right.push_row(vec![("x".into(), Value::Float(2.0))]);
		right.push_row(vec![("x".into(), Value::Float(3.0))]);
		left.append(&right);
		assert_eq!(3, left.n_rows());
	}

	#[test]
	fn test_column_means_skip_nan() {
		let mut db = Database::new();
		db.push_row(vec![("v".into(), Value::Float(1.0))]);
		db.push_row(vec![("v".into(), Value::Float(f64::NAN))]);
		db.push_row(vec![("v".into(), Value::Float(3.0))]);
		let means = db.column_means("mean_");
		assert_eq!(1, means.len());
		assert_eq!("mean_v", means[0].0);
		assert_eq!(Some(2.0), means[0].1.as_float());
	}

	#[test]
	fn test_csv_round_trip() {
		let mut db = Database::new();
		db.push_row(vec![
			("file".into(), Value::Text("a.tif".into())),
			("score".into(), Value::Float(0.5)),
			("missing".into(), Value::Float(f64::NAN)),
		]);
		let mut buffer = Vec::new();
		db.to_csv(&mut buffer).unwrap();
		let parsed = Database::from_csv(std::io::BufReader::new(&buffer[..])).unwrap();
		assert_eq!(1, parsed.n_rows());
		assert_eq!(Some(&Value::Text("a.tif".into())), parsed.value(0, "file"));
		assert_eq!(Some(0.5), parsed.value(0, "score").and_then(|v| v.as_float()));
		assert!(parsed
			.value(0, "missing")
			.and_then(|v| v.as_float())
			.unwrap()
			.is_nan());
	}
}
