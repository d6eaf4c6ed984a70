/// A small column-oriented table: an ordered list of column names and a sequence of rows, every row
/// exactly as wide as the header.  Both the tabular command parser and the store's read path hand
/// back data in this shape.

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Table {
        Table {
            columns,
            rows: vec![],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row.  Short rows are padded with empty strings and long rows are cut, so the arity
    /// invariant holds no matter what the producer handed us.

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), "".to_string());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let ix = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[ix].as_str()).collect::<Vec<&str>>())
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let ix = self.column_index(name)?;
        self.rows.get(row).map(|r| r[ix].as_str())
    }
}

#[test]
fn test_table_arity() {
    let mut t = Table::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    t.push_row(vec!["1".to_string()]);
    t.push_row(vec![
        "1".to_string(),
        "2".to_string(),
        "3".to_string(),
        "4".to_string(),
    ]);
    assert!(t.len() == 2);
    assert!(t.rows().iter().all(|r| r.len() == 3));
    assert!(t.get(0, "c") == Some(""));
    assert!(t.get(1, "c") == Some("3"));
    assert!(t.column("b") == Some(vec!["", "2"]));
    assert!(t.column("d").is_none());
    assert!(t.get(2, "a").is_none());
}
