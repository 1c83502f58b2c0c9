//! Partitioned in-process event broker
//!
//! A minimal broker with the delivery semantics the dispatcher depends on:
//! records are appended to a partition chosen by hashing the key, consumers
//! poll from the committed offset with a bounded wait, and offsets advance
//! only on explicit commit. Uncommitted records are redelivered on the next
//! poll, so delivery is at-least-once and ordered within a partition.

use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

/// Stream names used by the core
pub mod topics {
    pub const ORDER_INPUT: &str = "order-input";
    pub const ORDER_STATUS_UPDATE: &str = "order-status-update";
    pub const TRADE_OUTPUT: &str = "trade-output";
    pub const ORDER_INPUT_DLQ: &str = "order-input-dlq";
    pub const TRADE_OUTPUT_DLQ: &str = "trade-output-dlq";
}

/// Broker errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("unknown partition {partition} for topic {topic}")]
    UnknownPartition { topic: String, partition: usize },
}

/// One delivered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: usize,
    pub offset: u64,
    pub key: String,
    pub payload: String,
}

#[derive(Default)]
struct PartitionState {
    log: Mutex<Vec<(String, String)>>,
    committed: AtomicU64,
    notify: Notify,
}

struct Topic {
    partitions: Vec<Arc<PartitionState>>,
}

/// In-process broker with keyed partitions and manual commits
pub struct InProcessBroker {
    topics: DashMap<String, Arc<Topic>>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Broker with the five core streams, `partitions` each
    pub fn with_core_topics(partitions: usize) -> Self {
        let broker = Self::new();
        for topic in [
            topics::ORDER_INPUT,
            topics::ORDER_STATUS_UPDATE,
            topics::TRADE_OUTPUT,
            topics::ORDER_INPUT_DLQ,
            topics::TRADE_OUTPUT_DLQ,
        ] {
            broker.create_topic(topic, partitions);
        }
        broker
    }

    /// Create a topic; replaces nothing if it already exists
    pub fn create_topic(&self, name: &str, partitions: usize) {
        assert!(partitions > 0, "topics need at least one partition");
        self.topics.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Topic {
                partitions: (0..partitions)
                    .map(|_| Arc::new(PartitionState::default()))
                    .collect(),
            })
        });
    }

    pub fn partition_count(&self, topic: &str) -> Result<usize, BusError> {
        self.topic(topic).map(|t| t.partitions.len())
    }

    /// Partition a record's key lands on
    pub fn partition_for_key(&self, topic: &str, key: &str) -> Result<usize, BusError> {
        let count = self.partition_count(topic)?;
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Ok((hasher.finish() as usize) % count)
    }

    /// Append a record; ordering holds per key via its partition
    ///
    /// Resolves once the broker has confirmed the append.
    pub async fn publish(&self, topic: &str, key: &str, payload: String) -> Result<(), BusError> {
        let partition_index = self.partition_for_key(topic, key)?;
        let partition = self.partition(topic, partition_index)?;

        let offset = {
            let mut log = partition.log.lock().unwrap();
            log.push((key.to_string(), payload));
            log.len() as u64 - 1
        };
        partition.notify.notify_waiters();

        debug!(topic, partition = partition_index, offset, key, "record published");
        Ok(())
    }

    /// Poll a partition from its committed offset
    ///
    /// Waits up to `timeout` for at least one record, then returns up to
    /// `max_records` starting at the committed offset.
    pub async fn poll(
        &self,
        topic: &str,
        partition_index: usize,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<Record>, BusError> {
        let partition = self.partition(topic, partition_index)?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(records) =
                Self::read_from_committed(&partition, topic, partition_index, max_records)
            {
                return Ok(records);
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let notified = partition.notify.notified();
            tokio::pin!(notified);
            // Register interest, then re-check so a publish racing the
            // registration cannot be missed
            notified.as_mut().enable();
            if let Some(records) =
                Self::read_from_committed(&partition, topic, partition_index, max_records)
            {
                return Ok(records);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    fn read_from_committed(
        partition: &PartitionState,
        topic: &str,
        partition_index: usize,
        max_records: usize,
    ) -> Option<Vec<Record>> {
        let log = partition.log.lock().unwrap();
        let committed = partition.committed.load(Ordering::SeqCst) as usize;
        let records: Vec<Record> = log
            .iter()
            .enumerate()
            .skip(committed)
            .take(max_records)
            .map(|(offset, (key, payload))| Record {
                topic: topic.to_string(),
                partition: partition_index,
                offset: offset as u64,
                key: key.clone(),
                payload: payload.clone(),
            })
            .collect();

        if records.is_empty() {
            None
        } else {
            Some(records)
        }
    }

    /// Commit a record, advancing the partition's offset past it
    pub fn commit(&self, record: &Record) -> Result<(), BusError> {
        let partition = self.partition(&record.topic, record.partition)?;
        let next = record.offset + 1;
        partition.committed.fetch_max(next, Ordering::SeqCst);
        Ok(())
    }

    /// Committed offset of a partition (test support)
    pub fn committed_offset(&self, topic: &str, partition_index: usize) -> Result<u64, BusError> {
        Ok(self
            .partition(topic, partition_index)?
            .committed
            .load(Ordering::SeqCst))
    }

    /// Records ever appended to a partition (test support)
    pub fn end_offset(&self, topic: &str, partition_index: usize) -> Result<u64, BusError> {
        Ok(self.partition(topic, partition_index)?.log.lock().unwrap().len() as u64)
    }

    /// Total records across a topic's partitions (test support)
    pub fn topic_len(&self, topic: &str) -> Result<u64, BusError> {
        let count = self.partition_count(topic)?;
        let mut total = 0;
        for partition in 0..count {
            total += self.end_offset(topic, partition)?;
        }
        Ok(total)
    }

    fn topic(&self, name: &str) -> Result<Arc<Topic>, BusError> {
        self.topics
            .get(name)
            .map(|t| t.value().clone())
            .ok_or_else(|| BusError::UnknownTopic(name.to_string()))
    }

    fn partition(&self, topic: &str, index: usize) -> Result<Arc<PartitionState>, BusError> {
        let t = self.topic(topic)?;
        t.partitions
            .get(index)
            .cloned()
            .ok_or_else(|| BusError::UnknownPartition {
                topic: topic.to_string(),
                partition: index,
            })
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}
