use crate::codec::DocumentCodec;
use crate::collection::{Collection, QueryFilter};
use crate::common::{quote_ident, quote_literal, Document, SortOrder, CURSOR_PAGE_SIZE, DOCUMENT_KEY_FUNCTION};
use crate::cursor::{populate_documents, Populate, Projection};
use crate::database::{CriteriaRegistration, Database};
use crate::errors::{PocketError, PocketResult};
use crate::filter::Criteria;
use itertools::Itertools;
use std::collections::VecDeque;

/// A lazy, forward only view over the documents matching some criteria.
///
/// Nothing is read until the cursor is iterated. Rows are fetched in pages
/// and projected page by page. A cursor with population rules reads the rest
/// of its result in one go, so each rule issues a single lookup. Changing
/// the skip, limit, sort, projection or population rules resets the cursor.
///
/// The cursor can be driven explicitly:
///
/// ```rust,ignore
/// let mut cursor = users.find(all())?.sort_by("age", SortOrder::Descending);
/// cursor.rewind()?;
/// while cursor.valid() {
///     println!("{} {:?}", cursor.key(), cursor.current());
///     cursor.advance()?;
/// }
/// ```
///
/// or consumed as an iterator:
///
/// ```rust,ignore
/// for user in users.find(field("age").gt(20))?.limit(10) {
///     println!("{}", user?);
/// }
/// ```
pub struct Cursor {
    collection: Collection,
    criteria: Criteria,
    projection: Option<Projection>,
    sort: Vec<(String, SortOrder)>,
    skip: Option<u64>,
    limit: Option<u64>,
    populations: Vec<Populate>,
    state: ScanState,
}

#[derive(Default)]
struct ScanState {
    scan: Option<Scan>,
    buffer: VecDeque<Document>,
    fetched: u64,
    exhausted: bool,
    started: bool,
    position: usize,
    last_key: usize,
    current: Option<Document>,
    pending_error: Option<PocketError>,
}

/// A prepared scan. Holds the registrations its SQL refers to.
struct Scan {
    db: Database,
    codec: DocumentCodec,
    sql: String,
    _filter: QueryFilter,
    _sort_key: Option<CriteriaRegistration>,
}

impl Cursor {
    pub(crate) fn new(collection: Collection, criteria: Criteria) -> Cursor {
        Cursor {
            collection,
            criteria,
            projection: None,
            sort: Vec::new(),
            skip: None,
            limit: None,
            populations: Vec::new(),
            state: ScanState::default(),
        }
    }

    fn reset(mut self) -> Self {
        self.state = ScanState::default();
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self.reset()
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self.reset()
    }

    /// Adds a sort key. Keys apply in the order they were added.
    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push((field.to_string(), order));
        self.reset()
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self.reset()
    }

    /// Resolves `local_field` against the `_id` of `foreign` documents.
    pub fn populate(self, local_field: &str, foreign: &str) -> Self {
        self.populate_with(Populate::new(local_field, foreign))
    }

    /// Like [`Self::populate`], storing the result under `alias`.
    pub fn with(self, local_field: &str, foreign: &str, alias: &str) -> Self {
        self.populate_with(Populate::new(local_field, foreign).alias(alias))
    }

    pub fn populate_with(mut self, rule: Populate) -> Self {
        self.populations.push(rule);
        self.reset()
    }

    pub fn populate_many(mut self, rules: Vec<Populate>) -> Self {
        self.populations.extend(rules);
        self.reset()
    }

    /// Builds the `SELECT` shared by iteration and [`Self::to_array`].
    fn prepare(&self) -> PocketResult<Scan> {
        let db = self.collection.database()?;
        let codec = self.collection.codec_for(&db);
        let filter = self
            .collection
            .query_filter(&db, &codec, self.criteria.clone());

        let mut sort_key = None;
        let key_suffix = if !self.sort.is_empty() && codec.is_encrypted() {
            let id = match &filter.registration {
                Some(registration) => registration.id().to_string(),
                None => {
                    let registration = db.register_with_codec(Criteria::new(), codec.clone());
                    let id = registration.id().to_string();
                    sort_key = Some(registration);
                    id
                }
            };
            format!(", {}", quote_literal(&id))
        } else {
            String::new()
        };

        let order = self
            .sort
            .iter()
            .map(|(field, order)| {
                format!(
                    "{}({}, document{}) {}",
                    DOCUMENT_KEY_FUNCTION,
                    quote_literal(field),
                    key_suffix,
                    order.sql_keyword()
                )
            })
            .chain(std::iter::once("id".to_string()))
            .join(", ");

        let sql = format!(
            "SELECT document FROM {}{} ORDER BY {}",
            quote_ident(&self.collection.name()),
            filter.where_clause(),
            order
        );
        log::debug!("Cursor scan: {}", sql);
        Ok(Scan {
            db,
            codec,
            sql,
            _filter: filter,
            _sort_key: sort_key,
        })
    }

    /// Runs `scan` for up to `limit` rows after `offset`, skipping rows that
    /// do not decode.
    fn fetch(&self, scan: &Scan, limit: Option<u64>, offset: u64) -> PocketResult<(u64, Vec<Document>)> {
        let sql = format!(
            "{} LIMIT {} OFFSET {}",
            scan.sql,
            limit.map(|l| l as i64).unwrap_or(-1),
            offset
        );
        let rows: Vec<String> = scan
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?.unwrap_or_default());
                }
                Ok(out)
            })
            .map_err(|e| {
                log::error!("Scan of {} failed: {}", self.collection.name(), e);
                e
            })?;

        let count = rows.len() as u64;
        let documents = rows
            .iter()
            .filter_map(|stored| {
                let document = scan.codec.decode(stored);
                if document.is_none() {
                    log::warn!("Skipping undecodable document in {}", self.collection.name());
                }
                document
            })
            .collect();
        Ok((count, documents))
    }

    fn finish(&self, mut documents: Vec<Document>) -> PocketResult<Vec<Document>> {
        for rule in &self.populations {
            populate_documents(&self.collection, &mut documents, rule)?;
        }
        Ok(match &self.projection {
            Some(projection) => documents.into_iter().map(|d| projection.apply(d)).collect(),
            None => documents,
        })
    }

    fn fetch_page(&mut self) -> PocketResult<()> {
        let remaining = self.limit.map(|l| l.saturating_sub(self.state.fetched));
        if remaining == Some(0) {
            self.state.exhausted = true;
            return Ok(());
        }
        let page = if self.populations.is_empty() {
            Some(
                remaining
                    .map(|r| r.min(CURSOR_PAGE_SIZE as u64))
                    .unwrap_or(CURSOR_PAGE_SIZE as u64),
            )
        } else {
            remaining
        };
        let offset = self.skip.unwrap_or(0) + self.state.fetched;

        let Some(scan) = self.state.scan.as_ref() else {
            self.state.exhausted = true;
            return Ok(());
        };
        let (count, documents) = self.fetch(scan, page, offset)?;
        self.state.fetched += count;
        if page.map(|p| count < p).unwrap_or(true) {
            self.state.exhausted = true;
        }
        let documents = self.finish(documents)?;
        self.state.buffer.extend(documents);
        Ok(())
    }

    fn pull(&mut self) -> PocketResult<Option<Document>> {
        loop {
            if let Some(document) = self.state.buffer.pop_front() {
                return Ok(Some(document));
            }
            if self.state.exhausted {
                return Ok(None);
            }
            if let Err(e) = self.fetch_page() {
                self.state.exhausted = true;
                return Err(e);
            }
        }
    }

    /// Restarts the scan and loads the first document.
    pub fn rewind(&mut self) -> PocketResult<()> {
        self.state = ScanState {
            started: true,
            ..ScanState::default()
        };
        let scan = match self.prepare() {
            Ok(scan) => scan,
            Err(e) => {
                self.state.exhausted = true;
                return Err(e);
            }
        };
        self.state.scan = Some(scan);
        self.state.current = self.pull()?;
        Ok(())
    }

    /// The document at the current position. The first call on a fresh
    /// cursor rewinds it; later calls never restart the scan.
    pub fn current(&mut self) -> Option<&Document> {
        if !self.state.started {
            if let Err(e) = self.rewind() {
                log::error!("Failed to start cursor over {}: {}", self.collection.name(), e);
            }
        }
        self.state.current.as_ref()
    }

    /// Moves to the next document.
    pub fn advance(&mut self) -> PocketResult<()> {
        if !self.state.started {
            self.rewind()?;
        }
        if self.state.current.is_none() && self.state.exhausted {
            return Ok(());
        }
        self.state.position += 1;
        match self.pull() {
            Ok(Some(document)) => {
                self.state.last_key = self.state.position;
                self.state.current = Some(document);
                Ok(())
            }
            Ok(None) => {
                self.state.current = None;
                Ok(())
            }
            Err(e) => {
                self.state.current = None;
                Err(e)
            }
        }
    }

    pub fn valid(&self) -> bool {
        self.state.current.is_some()
    }

    /// Zero based position of the current document. Never exceeds the
    /// position of the last document actually fetched.
    pub fn key(&self) -> usize {
        self.state.position.min(self.state.last_key)
    }

    fn next_document(&mut self) -> Option<PocketResult<Document>> {
        if !self.state.started {
            if let Err(e) = self.rewind() {
                return Some(Err(e));
            }
        }
        if let Some(e) = self.state.pending_error.take() {
            return Some(Err(e));
        }
        let document = self.state.current.take()?;
        if let Err(e) = self.advance() {
            self.state.pending_error = Some(e);
        }
        Some(Ok(document))
    }

    /// Borrowing iterator over the remaining documents.
    pub fn iter(&mut self) -> CursorIter<'_> {
        CursorIter { cursor: self }
    }

    /// Calls `f` for every document from the start.
    pub fn each<F>(&mut self, mut f: F) -> PocketResult<()>
    where
        F: FnMut(&Document),
    {
        self.rewind()?;
        while let Some(document) = self.state.current.as_ref() {
            f(document);
            self.advance()?;
        }
        Ok(())
    }

    /// Reads every matching document at once. Each population rule issues a
    /// single lookup for the whole result.
    pub fn to_array(&self) -> PocketResult<Vec<Document>> {
        let scan = self.prepare()?;
        let (_, documents) = self.fetch(&scan, self.limit, self.skip.unwrap_or(0))?;
        self.finish(documents)
    }

    /// Counts the matching rows with a `COUNT` query honoring skip and limit.
    /// Returns 0 when the query fails.
    pub fn count(&self) -> usize {
        match self.try_count() {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Count over {} failed: {}", self.collection.name(), e);
                0
            }
        }
    }

    fn try_count(&self) -> PocketResult<usize> {
        let db = self.collection.database()?;
        let codec = self.collection.codec_for(&db);
        let filter = self
            .collection
            .query_filter(&db, &codec, self.criteria.clone());
        let table = quote_ident(&self.collection.name());

        let sql = if self.skip.is_none() && self.limit.is_none() {
            format!("SELECT COUNT(*) FROM {}{}", table, filter.where_clause())
        } else {
            format!(
                "SELECT COUNT(*) FROM (SELECT id FROM {}{} LIMIT {} OFFSET {})",
                table,
                filter.where_clause(),
                self.limit.map(|l| l as i64).unwrap_or(-1),
                self.skip.unwrap_or(0)
            )
        };
        let count = db.with_connection(|conn| Ok(conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?))?;
        Ok(count.max(0) as usize)
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection.name())
            .field("criteria", &self.criteria)
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .finish()
    }
}

/// Iterator borrowing a [`Cursor`].
pub struct CursorIter<'a> {
    cursor: &'a mut Cursor,
}

impl Iterator for CursorIter<'_> {
    type Item = PocketResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_document()
    }
}

/// Iterator owning a [`Cursor`].
pub struct CursorIntoIter {
    cursor: Cursor,
}

impl Iterator for CursorIntoIter {
    type Item = PocketResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_document()
    }
}

impl IntoIterator for Cursor {
    type Item = PocketResult<Document>;
    type IntoIter = CursorIntoIter;

    fn into_iter(self) -> Self::IntoIter {
        CursorIntoIter { cursor: self }
    }
}

impl<'a> IntoIterator for &'a mut Cursor {
    type Item = PocketResult<Document>;
    type IntoIter = CursorIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
