use std::io::Write;
use std::iter::Peekable;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::PipelineError;

pub const DEFAULT_CHUNK_SIZE: usize = 450;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBatch {
    pub sequence: usize,
    pub records: Vec<Value>,
    pub is_last: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitSummary {
    pub records: usize,
    pub batches: usize,
}

pub trait BatchSink {
    fn begin(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn write_batch(&mut self, batch: &OutputBatch) -> Result<(), PipelineError>;

    fn finish(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

impl<S: BatchSink + ?Sized> BatchSink for &mut S {
    fn begin(&mut self) -> Result<(), PipelineError> {
        (**self).begin()
    }

    fn write_batch(&mut self, batch: &OutputBatch) -> Result<(), PipelineError> {
        (**self).write_batch(batch)
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        (**self).finish()
    }
}

/// Lazy adaptor from records to batches of at most `chunk_size` JSON values.
/// Stops after the first error.
pub struct Batches<I: Iterator> {
    records: Peekable<I>,
    chunk_size: usize,
    sequence: usize,
    failed: bool,
}

impl<I: Iterator> std::fmt::Debug for Batches<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batches")
            .field("chunk_size", &self.chunk_size)
            .field("sequence", &self.sequence)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

pub fn batches<I, T>(records: I, chunk_size: usize) -> Result<Batches<I::IntoIter>, PipelineError>
where
    I: IntoIterator<Item = Result<T, PipelineError>>,
    T: Serialize,
{
    if chunk_size == 0 {
        return Err(PipelineError::InvalidChunkSize);
    }
    Ok(Batches {
        records: records.into_iter().peekable(),
        chunk_size,
        sequence: 0,
        failed: false,
    })
}

impl<I, T> Iterator for Batches<I>
where
    I: Iterator<Item = Result<T, PipelineError>>,
    T: Serialize,
{
    type Item = Result<OutputBatch, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut records = Vec::with_capacity(self.chunk_size.min(1024));
        while records.len() < self.chunk_size {
            let serialized = match self.records.next() {
                None => break,
                Some(Ok(record)) => serde_json::to_value(&record)
                    .map_err(|err| PipelineError::Serialize(err.to_string())),
                Some(Err(err)) => Err(err),
            };
            match serialized {
                Ok(value) => records.push(value),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        if records.is_empty() {
            return None;
        }
        let batch = OutputBatch {
            sequence: self.sequence,
            records,
            is_last: self.records.peek().is_none(),
        };
        self.sequence += 1;
        Some(Ok(batch))
    }
}

pub fn emit<I, T, S>(records: I, chunk_size: usize, sink: &mut S) -> Result<EmitSummary, PipelineError>
where
    I: IntoIterator<Item = Result<T, PipelineError>>,
    T: Serialize,
    S: BatchSink + ?Sized,
{
    let mut summary = EmitSummary::default();
    let batches = batches(records, chunk_size)?;
    sink.begin()?;
    for batch in batches {
        let batch = batch?;
        sink.write_batch(&batch)?;
        summary.records += batch.records.len();
        summary.batches += 1;
        debug!(
            sequence = batch.sequence,
            size = batch.records.len(),
            last = batch.is_last,
            "flushed batch"
        );
    }
    sink.finish()?;
    Ok(summary)
}

/// One `{"docs":[...]}` document, built incrementally across batches.
pub struct JsonDocsSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonDocsSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BatchSink for JsonDocsSink<W> {
    fn begin(&mut self) -> Result<(), PipelineError> {
        self.writer.write_all(b"{\"docs\":[\n").map_err(io_error)
    }

    fn write_batch(&mut self, batch: &OutputBatch) -> Result<(), PipelineError> {
        let last_index = batch.records.len().saturating_sub(1);
        for (index, record) in batch.records.iter().enumerate() {
            serde_json::to_writer(&mut self.writer, record).map_err(serialize_error)?;
            let separator: &[u8] = if batch.is_last && index == last_index {
                b"\n"
            } else {
                b",\n"
            };
            self.writer.write_all(separator).map_err(io_error)?;
        }
        self.writer.flush().map_err(io_error)
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        self.writer.write_all(b"]}\n").map_err(io_error)?;
        self.writer.flush().map_err(io_error)
    }
}

pub trait BulkTransport {
    fn send_bulk(&self, body: String, actions: usize) -> Result<(), PipelineError>;
}

impl<T: BulkTransport + ?Sized> BulkTransport for &T {
    fn send_bulk(&self, body: String, actions: usize) -> Result<(), PipelineError> {
        (**self).send_bulk(body, actions)
    }
}

pub struct BulkSink<T: BulkTransport> {
    transport: T,
    index: String,
}

impl<T: BulkTransport> BulkSink<T> {
    pub fn new(transport: T, index: impl Into<String>) -> Self {
        Self {
            transport,
            index: index.into(),
        }
    }
}

impl<T: BulkTransport> BatchSink for BulkSink<T> {
    fn write_batch(&mut self, batch: &OutputBatch) -> Result<(), PipelineError> {
        let mut body = String::new();
        for record in &batch.records {
            body.push_str(&bulk_action_pair(&self.index, record)?);
        }
        self.transport.send_bulk(body, batch.records.len())
    }
}

/// Writes the same action pairs as [`BulkSink`] to a file.
pub struct NdjsonSink<W: Write> {
    writer: W,
    index: String,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W, index: impl Into<String>) -> Self {
        Self {
            writer,
            index: index.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BatchSink for NdjsonSink<W> {
    fn write_batch(&mut self, batch: &OutputBatch) -> Result<(), PipelineError> {
        for record in &batch.records {
            self.writer
                .write_all(bulk_action_pair(&self.index, record)?.as_bytes())
                .map_err(io_error)?;
        }
        self.writer.flush().map_err(io_error)
    }
}

/// `{"index":{...}}\n{source}\n`. Document-level `_id` and `_parent` move into
/// the action metadata as `_id` and `routing`; other fields keep their order.
pub fn bulk_action_pair(index: &str, record: &Value) -> Result<String, PipelineError> {
    let fields = record.as_object().ok_or_else(|| {
        PipelineError::Serialize(format!("bulk document is not a JSON object: {record}"))
    })?;
    let mut meta = Map::new();
    meta.insert("_index".to_string(), Value::String(index.to_string()));
    if let Some(id) = fields.get("_id") {
        meta.insert("_id".to_string(), id.clone());
    }
    if let Some(parent) = fields.get("_parent") {
        meta.insert("routing".to_string(), parent.clone());
    }
    let action = json!({ "index": meta });
    let source = serde_json::to_string(&SourceFields(fields)).map_err(serialize_error)?;
    Ok(format!("{action}\n{source}\n"))
}

const META_FIELDS: [&str; 2] = ["_id", "_parent"];

struct SourceFields<'a>(&'a Map<String, Value>);

impl Serialize for SourceFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .filter(|(key, _)| !META_FIELDS.contains(&key.as_str())),
        )
    }
}

fn io_error(err: std::io::Error) -> PipelineError {
    PipelineError::Filesystem(err.to_string())
}

fn serialize_error(err: serde_json::Error) -> PipelineError {
    if err.is_io() {
        PipelineError::Filesystem(err.to_string())
    } else {
        PipelineError::Serialize(err.to_string())
    }
}
