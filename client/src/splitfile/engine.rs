use super::{
    metrics::{self, Status},
    Config, Mailbox, Manifest, Message, SegmentKeys,
};
use crate::{segment, Error, Inserter, Key, Segment};
use bytes::Bytes;
use commonware_runtime::{Handle, Metrics, Spawner};
use futures::{channel::mpsc, StreamExt};
use splitfile_coding::Encoder;
use tracing::{debug, info, trace, warn};

/// Split `payload` into blocks of `block_size` bytes, zero padding the last one.
pub(super) fn split(payload: &Bytes, block_size: usize) -> Vec<Bytes> {
    let mut blocks = Vec::with_capacity(payload.len().div_ceil(block_size));
    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + block_size).min(payload.len());
        let block = if end - offset == block_size {
            payload.slice(offset..end)
        } else {
            let mut padded = payload[offset..end].to_vec();
            padded.resize(block_size, 0);
            Bytes::from(padded)
        };
        blocks.push(block);
        offset = end;
    }
    blocks
}

/// Collect the keys of a slice of blocks, failing if any is missing.
fn collect_keys(segment: u32, keys: Vec<Option<Key>>) -> Result<Vec<Key>, Error> {
    keys.into_iter()
        .enumerate()
        .map(|(index, key)| {
            key.ok_or_else(|| {
                Error::Internal(format!("segment {segment} missing key for block {index}"))
            })
        })
        .collect()
}

/// Instance of the splitfile engine.
///
/// It is responsible for:
/// - Splitting a payload into segments
/// - Starting the insertion of every segment
/// - Tracking segment progress and cancelling on the first failure
/// - Assembling the [Manifest] of the inserted payload
pub struct Engine<E: Spawner + Metrics, C: Encoder, I: Inserter> {
    ////////////////////////////////////////
    // Interfaces
    ////////////////////////////////////////
    context: E,
    coding: Option<C>,
    inserter: I,

    ////////////////////////////////////////
    // Configuration
    ////////////////////////////////////////
    /// Size of every block
    block_size: usize,

    /// Maximum number of data blocks per segment
    segment_size: usize,

    ////////////////////////////////////////
    // Messaging
    ////////////////////////////////////////
    /// Handed to every segment as its parent.
    mailbox: Mailbox,

    /// The mailbox for receiving messages.
    mailbox_receiver: mpsc::UnboundedReceiver<Message>,

    ////////////////////////////////////////
    // Metrics
    ////////////////////////////////////////
    /// Metrics
    metrics: metrics::Metrics,
}

impl<E: Spawner + Metrics, C: Encoder, I: Inserter> Engine<E, C, I> {
    /// Creates a new engine with the given context and configuration.
    /// Returns the engine and a mailbox for sending messages to the engine.
    pub fn new(
        context: E,
        cfg: Config,
        coding: Option<C>,
        inserter: I,
    ) -> Result<(Self, Mailbox), Error> {
        if cfg.block_size == 0 {
            return Err(Error::InvalidConfig("block size must be non-zero"));
        }
        if cfg.segment_size == 0 {
            return Err(Error::InvalidConfig("segment size must be non-zero"));
        }
        if let Some(coding) = &coding {
            if let Err(err) = coding.validate(cfg.block_size) {
                warn!(?err, block_size = cfg.block_size, "block size rejected by encoder");
                return Err(Error::InvalidConfig("block size not supported by encoder"));
            }
        }

        let (mailbox_sender, mailbox_receiver) = mpsc::unbounded();
        let mailbox = Mailbox::new(mailbox_sender);
        let metrics = metrics::Metrics::init(context.clone());

        let result = Self {
            context,
            coding,
            inserter,
            block_size: cfg.block_size,
            segment_size: cfg.segment_size,
            mailbox: mailbox.clone(),
            mailbox_receiver,
            metrics,
        };

        Ok((result, mailbox))
    }

    /// Starts inserting `payload`.
    ///
    /// The returned handle resolves once every segment has finished.
    pub fn start(self, payload: Bytes) -> Handle<Result<Manifest, Error>> {
        self.context.clone().spawn(|_| self.run(payload))
    }

    /// Inner run loop called by `start`.
    async fn run(mut self, payload: Bytes) -> Result<Manifest, Error> {
        let length = payload.len();
        let blocks = split(&payload, self.block_size);
        if blocks.is_empty() {
            debug!("empty payload");
            return Ok(Manifest {
                length,
                block_size: self.block_size,
                segments: Vec::new(),
            });
        }

        // Create every segment before starting any
        let mut segments = Vec::new();
        for (index, chunk) in blocks.chunks(self.segment_size).enumerate() {
            let number = u32::try_from(index)
                .map_err(|_| Error::InvalidConfig("too many segments for payload"))?;
            segments.push(Segment::new(
                self.context.with_label(&format!("segment_{number}")),
                segment::Config {
                    number,
                    coding: self.coding.clone(),
                    block_size: self.block_size,
                },
                chunk.to_vec(),
                self.inserter.clone(),
                self.mailbox.clone(),
            ));
        }
        info!(
            length,
            blocks = blocks.len(),
            segments = segments.len(),
            "inserting payload"
        );
        for segment in &segments {
            segment.start();
        }

        let mut finished = vec![false; segments.len()];
        let mut remaining = segments.len();
        let mut error: Option<Error> = None;
        while remaining > 0 {
            let Some(msg) = self.mailbox_receiver.next().await else {
                return Err(Error::Internal("mailbox closed".into()));
            };
            match msg {
                Message::Encoded(number) => {
                    trace!(segment = number, "mailbox: encoded");
                    self.metrics.encoded.inc();
                }
                Message::HasKeys(number) => {
                    trace!(segment = number, "mailbox: has keys");
                    self.metrics.has_keys.inc();
                }
                Message::Finished(number) => {
                    trace!(segment = number, "mailbox: finished");
                    let index = number as usize;
                    let Some(segment) = segments.get(index) else {
                        warn!(segment = number, "unknown segment");
                        continue;
                    };
                    if finished[index] {
                        warn!(segment = number, "finished twice");
                        continue;
                    }
                    finished[index] = true;
                    remaining -= 1;
                    self.metrics.blocks.inc_by(segment.blocks_completed() as u64);

                    match segment.outcome() {
                        Some(Ok(())) => {
                            self.metrics.finished(Status::Success);
                        }
                        Some(Err(Error::Cancelled)) => {
                            self.metrics.finished(Status::Cancelled);
                        }
                        Some(Err(err)) => {
                            self.metrics.finished(Status::Failure);
                            if error.is_none() {
                                warn!(segment = number, ?err, "segment failed");
                                error = Some(err);
                                for segment in &segments {
                                    segment.cancel();
                                }
                            }
                        }
                        None => {
                            return Err(Error::Internal(format!(
                                "segment {number} reported finished without an outcome"
                            )));
                        }
                    }
                }
                Message::Cancel => {
                    debug!("mailbox: cancel");
                    if error.is_none() {
                        error = Some(Error::Cancelled);
                    }
                    for segment in &segments {
                        segment.cancel();
                    }
                }
            }
        }
        if let Some(err) = error {
            return Err(err);
        }

        let mut keys = Vec::with_capacity(segments.len());
        for segment in &segments {
            keys.push(SegmentKeys {
                data: collect_keys(segment.number(), segment.data_keys())?,
                check: collect_keys(segment.number(), segment.check_keys())?,
            });
        }
        info!(length, segments = keys.len(), "inserted payload");
        Ok(Manifest {
            length,
            block_size: self.block_size,
            segments: keys,
        })
    }
}
