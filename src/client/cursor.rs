//! Lazy paging cursor
//!
//! A cursor fetches nothing until it is first advanced, then issues one
//! command per page boundary. Items keep the server's order within and
//! across pages. The cursor is exhausted when a page arrives without a
//! paging token; an empty page that still carries a token is skipped over.
//!
//! A cursor is single-pass and takes `&mut self` to advance; sharing one
//! between tasks requires external synchronization.

use futures::Stream;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::DataApiClient;
use crate::protocol::{
    CodecRegistry, Command, DataVector, Document, DriverError, DriverResult, FromDocument,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No page requested yet
    Idle,
    /// At least one page fetched and a paging token is pending
    Started,
    /// Last page fetched; only buffered items remain
    Exhausted,
    Closed,
}

pub struct Cursor<T> {
    client: DataApiClient,
    url: String,
    command: Command,
    registry: Arc<CodecRegistry>,
    buffer: VecDeque<Document>,
    page_state: Option<String>,
    state: CursorState,
    pages_fetched: u32,
    consumed: u64,
    sort_vector: Option<DataVector>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromDocument> Cursor<T> {
    pub(crate) fn new(
        client: DataApiClient,
        url: String,
        command: Command,
        registry: Arc<CodecRegistry>,
    ) -> Self {
        Self {
            client,
            url,
            command,
            registry,
            buffer: VecDeque::new(),
            page_state: None,
            state: CursorState::Idle,
            pages_fetched: 0,
            consumed: 0,
            sort_vector: None,
            _marker: PhantomData,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Items handed out so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Items fetched but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// `status.sortVector` of the first page, when requested.
    pub fn sort_vector(&self) -> Option<&DataVector> {
        self.sort_vector.as_ref()
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Next item, fetching a page when the buffer runs dry.
    ///
    /// An item that fails to convert stays at the head of the buffer and is
    /// not counted as consumed.
    pub async fn next(&mut self) -> DriverResult<Option<T>> {
        if !self.fill().await? {
            return Ok(None);
        }
        let Some(doc) = self.buffer.front() else {
            return Ok(None);
        };
        let item = T::from_document(doc.clone(), &self.registry)?;
        self.buffer.pop_front();
        self.consumed += 1;
        Ok(Some(item))
    }

    /// Whether another item exists; may fetch pages to find out.
    pub async fn has_next(&mut self) -> DriverResult<bool> {
        self.fill().await
    }

    /// Drain the remaining items.
    pub async fn to_list(mut self) -> DriverResult<Vec<T>> {
        let mut items = Vec::with_capacity(self.buffer.len());
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    pub fn into_stream(self) -> impl Stream<Item = DriverResult<T>> {
        futures::stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next().await?.map(|item| (item, cursor)))
        })
    }

    /// Forget all progress; the next advance starts again from page one.
    pub fn rewind(&mut self) {
        self.buffer.clear();
        self.page_state = None;
        self.state = CursorState::Idle;
        self.pages_fetched = 0;
        self.consumed = 0;
        self.sort_vector = None;
    }

    pub fn close(&mut self) {
        self.buffer.clear();
        self.page_state = None;
        self.state = CursorState::Closed;
    }

    /// Fetch until an item is buffered or no page remains.
    async fn fill(&mut self) -> DriverResult<bool> {
        while self.buffer.is_empty() {
            match self.state {
                CursorState::Closed | CursorState::Exhausted => return Ok(false),
                CursorState::Idle => {
                    let first = self.command.clone();
                    self.fetch(first).await?;
                }
                CursorState::Started => {
                    let next = self.command.with_page_state(self.page_state.as_deref());
                    self.fetch(next).await?;
                }
            }
        }
        Ok(true)
    }

    async fn fetch(&mut self, command: Command) -> DriverResult<()> {
        let response = self
            .client
            .run_command_with(&self.url, &command, &self.registry)
            .await?;
        if response.data.is_none() {
            return Err(DriverError::Cursor(format!(
                "'{}' response has no data section",
                command.name()
            )));
        }
        if self.pages_fetched == 0 {
            self.sort_vector = response.sort_vector();
        }
        self.pages_fetched += 1;

        let (documents, page_state) = response.into_page();
        debug!(
            "'{}' page {}: {} item(s), more: {}",
            command.name(),
            self.pages_fetched,
            documents.len(),
            page_state.is_some()
        );
        self.buffer.extend(documents);
        self.state = if page_state.is_some() {
            CursorState::Started
        } else {
            CursorState::Exhausted
        };
        self.page_state = page_state;
        Ok(())
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("command", &self.command.name())
            .field("url", &self.url)
            .field("state", &self.state)
            .field("pages_fetched", &self.pages_fetched)
            .field("consumed", &self.consumed)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
