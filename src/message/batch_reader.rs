// Copyright 2025 jonefeewang@gmail.com
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

//! Batch Reader
//!
//! A forward-only, resumable cursor over a sequence of [`RecordBatch`] values.
//!
//! # Backing strategies
//!
//! - materialized: every batch is already in memory, the first slice moves the
//!   whole collection into the reader buffer
//! - generated: batches are pulled one at a time from an async function, a
//!   stream or a channel, one batch per slice
//!
//! Both are driven through the same protocol: check [`BatchReader::should_load_slice`],
//! [`BatchReader::load_slice`] when it says so, then peek or pop buffered batches
//! until the buffer drains. [`BatchReader::consume`] runs that loop on behalf of a
//! [`BatchConsumer`] and can be stopped and resumed.
//!
//! Violating the protocol (loading while batches are buffered, popping an empty
//! buffer) is a bug in the caller and panics.

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;

use tokio_stream::{Stream, StreamExt};
use tracing::trace;

use super::RecordBatch;
use crate::utils::{with_deadline, Deadline};
use crate::AppResult;

/// Answer of a consumer after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopIteration {
    No,
    Yes,
}

/// Receives the batches of one [`BatchReader::consume`] call.
///
/// A consumer instance is used for a single call. When the loop ends, for any
/// reason other than an error, `end_of_stream` turns it into the call's result.
pub trait BatchConsumer {
    type Output;

    fn consume(
        &mut self,
        batch: RecordBatch,
    ) -> impl Future<Output = AppResult<StopIteration>> + Send;

    fn end_of_stream(self) -> Self::Output;
}

type BatchFuture = Pin<Box<dyn Future<Output = AppResult<Option<RecordBatch>>> + Send>>;

enum Generator {
    Pull {
        pull: Box<dyn FnMut() -> BatchFuture + Send>,
        // a pull cut short by a deadline, resumed by the next load
        pending: Option<BatchFuture>,
    },
    Stream(Pin<Box<dyn Stream<Item = AppResult<RecordBatch>> + Send>>),
}

impl Generator {
    async fn next(&mut self) -> AppResult<Option<RecordBatch>> {
        match self {
            Generator::Pull { pull, pending } => {
                let result = pending.get_or_insert_with(|| pull()).await;
                *pending = None;
                result
            }
            Generator::Stream(stream) => stream.next().await.transpose(),
        }
    }
}

enum Backing {
    Materialized(Vec<RecordBatch>),
    Generated(Generator),
}

pub struct BatchReader {
    buffer: VecDeque<RecordBatch>,
    backing: Backing,
    end_of_input: bool,
}

impl BatchReader {
    fn with_backing(backing: Backing) -> Self {
        BatchReader {
            buffer: VecDeque::new(),
            backing,
            end_of_input: false,
        }
    }

    /// Reader over batches that are already in memory.
    pub fn from_batches(batches: Vec<RecordBatch>) -> Self {
        Self::with_backing(Backing::Materialized(batches))
    }

    /// Reader that calls `pull` once per slice. `Ok(None)` marks the end of input.
    ///
    /// A pull interrupted by a load deadline is kept and polled again by the
    /// next `load_slice`, so `pull` is never called twice for the same slice.
    pub fn from_generator<F, Fut>(mut pull: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<Option<RecordBatch>>> + Send + 'static,
    {
        let pull = move || -> BatchFuture { Box::pin(pull()) };
        Self::with_backing(Backing::Generated(Generator::Pull {
            pull: Box::new(pull),
            pending: None,
        }))
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = AppResult<RecordBatch>> + Send + 'static,
    {
        Self::with_backing(Backing::Generated(Generator::Stream(Box::pin(stream))))
    }

    /// Reader fed by a producer task. The input ends once every sender is dropped
    /// and the channel is drained.
    pub fn from_channel(receiver: async_channel::Receiver<RecordBatch>) -> Self {
        Self::from_stream(receiver.map(Ok))
    }

    pub fn should_load_slice(&self) -> bool {
        self.buffer.is_empty() && !self.end_of_input
    }

    pub fn end_of_stream(&self) -> bool {
        self.buffer.is_empty() && self.end_of_input
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Fetches the next slice from the backing strategy.
    ///
    /// On `Err` the reader is unchanged and the call may be retried with a new
    /// deadline.
    pub async fn load_slice(&mut self, deadline: Deadline) -> AppResult<()> {
        assert!(
            self.should_load_slice(),
            "load_slice called with {} buffered batches, end of input: {}",
            self.buffer.len(),
            self.end_of_input
        );
        match &mut self.backing {
            Backing::Materialized(batches) => {
                self.buffer = VecDeque::from(std::mem::take(batches));
                self.end_of_input = true;
            }
            Backing::Generated(generator) => match with_deadline(deadline, generator.next()).await?? {
                Some(batch) => self.buffer.push_back(batch),
                None => self.end_of_input = true,
            },
        }
        trace!(
            "loaded slice, buffered: {}, end of input: {}",
            self.buffer.len(),
            self.end_of_input
        );
        Ok(())
    }

    pub fn peek_batch(&self) -> &RecordBatch {
        match self.buffer.front() {
            Some(batch) => batch,
            None => panic!("peek_batch called on an empty reader buffer"),
        }
    }

    pub fn pop_batch(&mut self) -> RecordBatch {
        match self.buffer.pop_front() {
            Some(batch) => batch,
            None => panic!("pop_batch called on an empty reader buffer"),
        }
    }

    /// Hands batches to `consumer` in order until it asks to stop or the input ends.
    ///
    /// A stop leaves every batch not yet handed out in place, so a later call with a
    /// fresh consumer continues right after the last delivered batch. Load and
    /// consumer errors abort the loop and are returned as is.
    pub async fn consume<C: BatchConsumer>(
        &mut self,
        mut consumer: C,
        deadline: Deadline,
    ) -> AppResult<C::Output> {
        loop {
            if self.buffer.is_empty() {
                if self.should_load_slice() {
                    self.load_slice(deadline).await?;
                }
                if self.buffer.is_empty() {
                    break;
                }
            }
            let batch = self.pop_batch();
            if consumer.consume(batch).await? == StopIteration::Yes {
                break;
            }
        }
        Ok(consumer.end_of_stream())
    }
}

impl Debug for BatchReader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let backing = match &self.backing {
            Backing::Materialized(_) => "materialized",
            Backing::Generated(_) => "generated",
        };
        f.debug_struct("BatchReader")
            .field("backing", &backing)
            .field("buffered", &self.buffer.len())
            .field("end_of_input", &self.end_of_input)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::message::{Offset, RecordBatchBuilder};
    use crate::service::setup_local_tracing;
    use crate::utils::{deadline_after, NO_TIMEOUT};
    use crate::AppError;

    #[fixture]
    fn setup() {
        setup_local_tracing().expect("failed to setup tracing");
    }

    struct DepthConsumer {
        depth: usize,
        result: Vec<RecordBatch>,
    }

    impl DepthConsumer {
        fn new(depth: usize) -> Self {
            DepthConsumer {
                depth,
                result: vec![],
            }
        }
    }

    impl BatchConsumer for DepthConsumer {
        type Output = Vec<RecordBatch>;

        async fn consume(&mut self, batch: RecordBatch) -> AppResult<StopIteration> {
            self.result.push(batch);
            self.depth -= 1;
            if self.depth == 0 {
                Ok(StopIteration::Yes)
            } else {
                Ok(StopIteration::No)
            }
        }

        fn end_of_stream(self) -> Vec<RecordBatch> {
            self.result
        }
    }

    fn make_batch(offset: i64) -> RecordBatch {
        let mut builder = RecordBatchBuilder::new(Offset(offset));
        builder
            .append_record(None, Some(1000), "key", "value", None)
            .unwrap();
        builder.build()
    }

    fn make_batches(offsets: &[i64]) -> Vec<RecordBatch> {
        offsets.iter().copied().map(make_batch).collect()
    }

    fn make_generating_reader(batches: Vec<RecordBatch>) -> BatchReader {
        let mut batches = batches.into_iter();
        BatchReader::from_generator(move || std::future::ready(Ok(batches.next())))
    }

    #[derive(Debug, Clone, Copy)]
    enum ReaderKind {
        Memory,
        Generating,
        Channel,
    }

    fn make_reader(kind: ReaderKind, offsets: &[i64]) -> BatchReader {
        let batches = make_batches(offsets);
        match kind {
            ReaderKind::Memory => BatchReader::from_batches(batches),
            ReaderKind::Generating => make_generating_reader(batches),
            ReaderKind::Channel => {
                let (tx, rx) = async_channel::unbounded();
                for batch in batches {
                    tx.try_send(batch).unwrap();
                }
                BatchReader::from_channel(rx)
            }
        }
    }

    fn offsets_of(batches: &[RecordBatch]) -> Vec<i64> {
        batches.iter().map(|b| b.base_offset().value()).collect()
    }

    #[rstest]
    #[tokio::test]
    async fn test_pop(#[from(setup)] _setup: ()) -> AppResult<()> {
        let mut reader = BatchReader::from_batches(make_batches(&[1, 2, 3, 4]));

        assert!(reader.should_load_slice());
        reader.load_slice(NO_TIMEOUT).await?;
        assert!(!reader.should_load_slice());

        assert_eq!(reader.peek_batch().base_offset(), Offset(1));
        assert_eq!(reader.peek_batch().base_offset(), Offset(1));
        reader.pop_batch();

        assert_eq!(reader.pop_batch().base_offset(), Offset(2));
        reader.pop_batch();

        assert!(!reader.should_load_slice());
        assert!(!reader.end_of_stream());

        assert_eq!(reader.pop_batch().base_offset(), Offset(4));
        assert!(!reader.should_load_slice());
        assert!(reader.end_of_stream());
        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_pop_multiple_slices(#[from(setup)] _setup: ()) -> AppResult<()> {
        let mut reader = make_generating_reader(make_batches(&[1, 2, 3, 4]));

        assert!(reader.should_load_slice());
        reader.load_slice(NO_TIMEOUT).await?;
        assert!(!reader.should_load_slice());
        assert_eq!(reader.peek_batch().base_offset(), Offset(1));
        reader.pop_batch();

        assert!(reader.should_load_slice());
        reader.load_slice(NO_TIMEOUT).await?;
        assert_eq!(reader.buffered_len(), 1);
        assert_eq!(reader.pop_batch().base_offset(), Offset(2));
        reader.load_slice(NO_TIMEOUT).await?;
        reader.pop_batch();

        assert!(reader.should_load_slice());
        reader.load_slice(NO_TIMEOUT).await?;
        assert_eq!(reader.pop_batch().base_offset(), Offset(4));
        assert!(!reader.end_of_stream());

        assert!(reader.should_load_slice());
        reader.load_slice(NO_TIMEOUT).await?;
        assert!(!reader.should_load_slice());
        assert!(reader.end_of_stream());
        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_empty_memory_reader(#[from(setup)] _setup: ()) -> AppResult<()> {
        let mut reader = BatchReader::from_batches(vec![]);
        assert!(reader.should_load_slice());
        assert!(!reader.end_of_stream());
        reader.load_slice(NO_TIMEOUT).await?;
        assert!(reader.end_of_stream());
        Ok(())
    }

    #[rstest]
    #[case::memory(ReaderKind::Memory)]
    #[case::generating(ReaderKind::Generating)]
    #[case::channel(ReaderKind::Channel)]
    #[tokio::test]
    async fn test_consume(#[from(setup)] _setup: (), #[case] kind: ReaderKind) -> AppResult<()> {
        let mut reader = make_reader(kind, &[1, 2, 3, 4]);

        let batches = reader.consume(DepthConsumer::new(4), NO_TIMEOUT).await?;
        assert_eq!(offsets_of(&batches), vec![1, 2, 3, 4]);

        let batches = reader.consume(DepthConsumer::new(4), NO_TIMEOUT).await?;
        assert!(batches.is_empty());
        assert!(reader.end_of_stream());
        Ok(())
    }

    #[rstest]
    #[case::memory(ReaderKind::Memory)]
    #[case::generating(ReaderKind::Generating)]
    #[case::channel(ReaderKind::Channel)]
    #[tokio::test]
    async fn test_interrupt_consume(#[from(setup)] _setup: (), #[case] kind: ReaderKind) -> AppResult<()> {
        let mut reader = make_reader(kind, &[1, 2, 3, 4, 5]);

        let batches = reader.consume(DepthConsumer::new(2), NO_TIMEOUT).await?;
        assert_eq!(offsets_of(&batches), vec![1, 2]);

        let batches = reader.consume(DepthConsumer::new(2), NO_TIMEOUT).await?;
        assert_eq!(offsets_of(&batches), vec![3, 4]);

        let batches = reader.consume(DepthConsumer::new(2), NO_TIMEOUT).await?;
        assert_eq!(offsets_of(&batches), vec![5]);

        let batches = reader.consume(DepthConsumer::new(4), NO_TIMEOUT).await?;
        assert!(batches.is_empty());
        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_stop_on_last_batch_does_not_load(#[from(setup)] _setup: ()) -> AppResult<()> {
        let pulls = Arc::new(AtomicUsize::new(0));
        let mut batches = make_batches(&[1, 2]).into_iter();
        let counter = pulls.clone();
        let mut reader = BatchReader::from_generator(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(batches.next()))
        });

        let result = reader.consume(DepthConsumer::new(2), NO_TIMEOUT).await?;
        assert_eq!(offsets_of(&result), vec![1, 2]);
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
        assert!(!reader.end_of_stream());

        let result = reader.consume(DepthConsumer::new(2), NO_TIMEOUT).await?;
        assert!(result.is_empty());
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
        assert!(reader.end_of_stream());
        Ok(())
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_load_slice_timeout_is_resumable(#[from(setup)] _setup: ()) -> AppResult<()> {
        let (tx, rx) = async_channel::unbounded();
        let mut reader = BatchReader::from_channel(rx);

        let result = reader
            .load_slice(deadline_after(Duration::from_millis(100)))
            .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert!(reader.should_load_slice());
        assert!(!reader.end_of_stream());

        tx.send(make_batch(9)).await.unwrap();
        drop(tx);

        let batches = reader
            .consume(DepthConsumer::new(8), deadline_after(Duration::from_millis(100)))
            .await?;
        assert_eq!(offsets_of(&batches), vec![9]);
        assert!(reader.end_of_stream());
        Ok(())
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_timed_out_pull_is_resumed(#[from(setup)] _setup: ()) -> AppResult<()> {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = pulls.clone();
        let mut reader = BatchReader::from_generator(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call > 0 {
                    return Ok(None);
                }
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(Some(make_batch(4)))
            }
        });

        let result = reader
            .load_slice(deadline_after(Duration::from_millis(100)))
            .await;
        assert!(result.is_err_and(|e| e.is_timeout()));
        assert!(reader.should_load_slice());

        reader.load_slice(NO_TIMEOUT).await?;
        assert_eq!(pulls.load(Ordering::SeqCst), 1);
        assert_eq!(reader.pop_batch().base_offset(), Offset(4));

        reader.load_slice(NO_TIMEOUT).await?;
        assert!(reader.end_of_stream());
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_consume_propagates_timeout(#[from(setup)] _setup: ()) {
        let mut reader = BatchReader::from_generator(std::future::pending);
        let result = reader
            .consume(DepthConsumer::new(1), deadline_after(Duration::from_secs(1)))
            .await;
        assert!(result.is_err_and(|e| e.is_timeout()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_generator_error_propagates(#[from(setup)] _setup: ()) {
        let mut calls = 0;
        let mut reader = BatchReader::from_generator(move || {
            calls += 1;
            let next = if calls == 1 {
                Ok(Some(make_batch(1)))
            } else {
                Err(AppError::ConnectionReset)
            };
            std::future::ready(next)
        });

        let result = reader.consume(DepthConsumer::new(4), NO_TIMEOUT).await;
        assert!(matches!(result, Err(AppError::ConnectionReset)));
        assert!(reader.should_load_slice());
    }

    struct FailingConsumer {
        seen: Vec<i64>,
    }

    impl BatchConsumer for FailingConsumer {
        type Output = Vec<i64>;

        async fn consume(&mut self, batch: RecordBatch) -> AppResult<StopIteration> {
            if batch.base_offset() == Offset(2) {
                return Err(AppError::CorruptMessage("rejected".to_string()));
            }
            self.seen.push(batch.base_offset().value());
            Ok(StopIteration::No)
        }

        fn end_of_stream(self) -> Vec<i64> {
            self.seen
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_consumer_error_keeps_position(#[from(setup)] _setup: ()) -> AppResult<()> {
        let mut reader = BatchReader::from_batches(make_batches(&[1, 2, 3]));
        let result = reader
            .consume(FailingConsumer { seen: vec![] }, NO_TIMEOUT)
            .await;
        assert!(matches!(result, Err(AppError::CorruptMessage(_))));

        let batches = reader.consume(DepthConsumer::new(4), NO_TIMEOUT).await?;
        assert_eq!(offsets_of(&batches), vec![3]);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "pop_batch called on an empty reader buffer")]
    fn test_pop_empty_buffer_panics() {
        let mut reader = BatchReader::from_batches(make_batches(&[1]));
        reader.pop_batch();
    }

    #[tokio::test]
    #[should_panic(expected = "load_slice called")]
    async fn test_load_slice_with_buffered_batches_panics() {
        let mut reader = BatchReader::from_batches(make_batches(&[1]));
        reader.load_slice(NO_TIMEOUT).await.unwrap();
        let _ = reader.load_slice(NO_TIMEOUT).await;
    }
}
