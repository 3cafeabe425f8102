/// Specifies the direction for sorting documents.
///
/// Used by [`crate::cursor::Cursor::sort_by`] to order results. Each sort
/// field becomes one `ORDER BY` term in the scan issued by the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Sort in ascending order (smallest to largest, A-Z)
    Ascending,
    /// Sort in descending order (largest to smallest, Z-A)
    Descending,
}

impl SortOrder {
    pub(crate) fn sql_keyword(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

impl From<i32> for SortOrder {
    /// `-1` means descending, anything else ascending.
    fn from(direction: i32) -> Self {
        if direction == -1 {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}
