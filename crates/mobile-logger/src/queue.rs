// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory queue of records waiting for the next batch flush.
//!
//! The queue is bounded: once `max_size` records are waiting, the oldest are
//! evicted. A failed batch goes back to the front so relative order is kept
//! across retries.

use std::collections::VecDeque;

use tracing::warn;

use crate::record::LogRecord;

#[derive(Debug)]
pub struct RecordQueue {
    records: VecDeque<LogRecord>,
    max_size: usize,
}

impl RecordQueue {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Appends `record`, returning the queue length afterwards.
    pub fn push(&mut self, record: LogRecord) -> usize {
        self.records.push_back(record);
        self.evict_overflow();
        self.records.len()
    }

    /// Moves every waiting record out, leaving the queue empty.
    pub fn take_all(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.records).into()
    }

    /// Puts a failed batch back in front of anything queued since it was taken.
    pub fn requeue_front(&mut self, batch: Vec<LogRecord>) {
        for record in batch.into_iter().rev() {
            self.records.push_front(record);
        }
        self.evict_overflow();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn evict_overflow(&mut self) {
        if self.records.len() <= self.max_size {
            return;
        }
        let excess = self.records.len() - self.max_size;
        self.records.drain(..excess);
        warn!(
            "SHIPPER | Log queue full ({} records), dropped {} oldest",
            self.max_size, excess
        );
    }
}
