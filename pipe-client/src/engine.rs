//! Transfer engine.
//!
//! Streams one file over a paired relay channel:
//!
//! ```text
//! sender:   Metadata{name, size} -> Chunk 0 .. Chunk n-1 -> End{n, bytes}
//! receiver: open each frame, verify order, append, verify the trailer
//! ```
//!
//! Every body is sealed under the session key with associated data binding
//! the sending role, the frame kind and the sequence number. Memory use is
//! bounded by one chunk regardless of file size.
//!
//! Exit paths on the receiver:
//! - clean close or `peer-left` before `End`: `IncompleteTransfer`, partial
//!   file kept
//! - transport failure: `ConnectionLost`, partial file kept
//! - gap, failed authentication, malformed frame: partial file deleted

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use pipe_core::{
    candidate_name, chunk_count, sanitize_file_name, validate_file_name, SequenceTracker,
    MAX_COLLISION_ATTEMPTS,
};
use pipe_types::{
    ControlMessage, EndOfStream, FrameKind, PayloadFrame, Role, TransferMetadata,
};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::crypto::{FrameAad, SessionKey};
use crate::error::TransferError;
use crate::transport::{ChannelFrame, Transport, TransportError};

/// Result of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Source path (sender) or saved path (receiver).
    pub path: PathBuf,
    /// File name as announced in the metadata.
    pub name: String,
    /// Plaintext bytes transferred.
    pub bytes: u64,
    /// Chunk frames transferred.
    pub chunks: u64,
}

fn malformed(e: impl std::fmt::Display) -> TransferError {
    TransferError::Protocol(e.to_string())
}

// ===========================================
// Sender
// ===========================================

/// Stream `path` to the peer.
///
/// `sender` is the role this side joined as; `peer_left` is raised by the
/// session's control watcher when the relay reports that the peer is gone.
pub async fn send_file<T, F>(
    transport: &T,
    key: &SessionKey,
    sender: Role,
    path: &Path,
    chunk_size: usize,
    peer_left: &AtomicBool,
    mut on_progress: F,
) -> Result<TransferSummary, TransferError>
where
    T: Transport + ?Sized,
    F: FnMut(u64, u64),
{
    let name = path
        .file_name()
        .map(|n| sanitize_file_name(&n.to_string_lossy()))
        .ok_or_else(|| TransferError::io(path, std::io::ErrorKind::InvalidInput.into()))?;

    let mut file = File::open(path)
        .await
        .map_err(|e| TransferError::io(path, e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| TransferError::io(path, e))?
        .len();
    let chunk_size = chunk_size.max(1);
    let total_chunks = chunk_count(size, chunk_size);

    info!(%name, size, chunks = total_chunks, "sending file");

    let lost = |sequence: u64, bytes: u64, reason: String| TransferError::ConnectionLost {
        sequence,
        bytes_transferred: bytes,
        reason,
    };

    // Metadata
    let metadata = TransferMetadata {
        name: name.clone(),
        size,
    };
    let sealed = key.seal(
        &metadata.to_bytes().map_err(malformed)?,
        &FrameAad::new(sender, FrameKind::Metadata, 0),
    )?;
    transport
        .send(ChannelFrame::Payload(PayloadFrame::metadata(sealed).encode()))
        .await
        .map_err(|e| lost(0, 0, e.to_string()))?;
    debug!("metadata sent");

    // Chunks
    let mut buf = vec![0u8; chunk_size];
    let mut sent: u64 = 0;
    let mut sequence: u64 = 0;
    while sent < size {
        if peer_left.load(Ordering::SeqCst) {
            return Err(lost(sequence, sent, "peer left".into()));
        }

        let want = (size - sent).min(chunk_size as u64) as usize;
        file.read_exact(&mut buf[..want])
            .await
            .map_err(|e| TransferError::io(path, e))?;

        let sealed = key.seal(&buf[..want], &FrameAad::new(sender, FrameKind::Chunk, sequence))?;
        transport
            .send(ChannelFrame::Payload(
                PayloadFrame::chunk(sequence, sealed).encode(),
            ))
            .await
            .map_err(|e| lost(sequence, sent, e.to_string()))?;

        sent += want as u64;
        sequence += 1;
        on_progress(sent, size);
        debug!(sequence, sent, "chunk sent");
    }

    if size == 0 {
        on_progress(0, 0);
    }

    // Trailer
    let trailer = EndOfStream {
        chunks: sequence,
        bytes: sent,
    };
    let sealed = key.seal(
        &trailer.to_bytes().map_err(malformed)?,
        &FrameAad::new(sender, FrameKind::End, sequence),
    )?;
    transport
        .send(ChannelFrame::Payload(PayloadFrame::end(sequence, sealed).encode()))
        .await
        .map_err(|e| lost(sequence, sent, e.to_string()))?;

    info!(%name, bytes = sent, chunks = sequence, "file sent");
    Ok(TransferSummary {
        path: path.to_path_buf(),
        name,
        bytes: sent,
        chunks: sequence,
    })
}

// ===========================================
// Receiver
// ===========================================

/// What the channel yielded next.
enum Incoming {
    Payload(Vec<u8>),
    /// Clean close or peer-left.
    Ended(String),
    /// Transport failure or relay error.
    Failed(String),
}

async fn next_payload<T: Transport + ?Sized>(transport: &T) -> Result<Incoming, TransferError> {
    loop {
        let incoming = match transport.recv().await {
            Ok(ChannelFrame::Payload(bytes)) => Incoming::Payload(bytes),
            Ok(ChannelFrame::Control(ControlMessage::PeerLeft)) => {
                Incoming::Ended("peer left".into())
            }
            Ok(ChannelFrame::Control(ControlMessage::Error { message })) => {
                Incoming::Failed(message)
            }
            Ok(ChannelFrame::Control(ControlMessage::Waiting))
            | Ok(ChannelFrame::Control(ControlMessage::PeerJoined)) => continue,
            Ok(ChannelFrame::Control(ControlMessage::Join { .. })) => {
                return Err(malformed("relay echoed a join message"))
            }
            Err(TransportError::ConnectionClosed) => Incoming::Ended("connection closed".into()),
            Err(TransportError::Protocol(msg)) => return Err(TransferError::Protocol(msg)),
            Err(e) => Incoming::Failed(e.to_string()),
        };
        return Ok(incoming);
    }
}

/// Receive one file into `dest_dir`.
///
/// `sender` is the role the peer joined as.
pub async fn receive_file<T, F>(
    transport: &T,
    key: &SessionKey,
    sender: Role,
    dest_dir: &Path,
    mut on_progress: F,
) -> Result<TransferSummary, TransferError>
where
    T: Transport + ?Sized,
    F: FnMut(u64, u64),
{
    let bytes = match next_payload(transport).await? {
        Incoming::Payload(bytes) => bytes,
        Incoming::Ended(reason) | Incoming::Failed(reason) => {
            return Err(TransferError::ConnectionLost {
                sequence: 0,
                bytes_transferred: 0,
                reason,
            })
        }
    };
    let frame = PayloadFrame::decode(&bytes).map_err(malformed)?;
    if frame.kind != FrameKind::Metadata || frame.sequence != 0 {
        return Err(malformed(format!(
            "expected metadata first, got {:?} {}",
            frame.kind, frame.sequence
        )));
    }
    let plain = key
        .open(&frame.sealed, &FrameAad::new(sender, FrameKind::Metadata, 0))
        .map_err(|_| TransferError::AuthenticationFailed {
            kind: FrameKind::Metadata,
            sequence: 0,
        })?;
    let metadata = TransferMetadata::from_bytes(&plain).map_err(malformed)?;
    let name = validate_file_name(&metadata.name)?.to_string();

    let (mut file, path) = create_destination(dest_dir, &name).await?;
    info!(%name, size = metadata.size, path = %path.display(), "receiving file");

    let mut ctx = ReceiveContext {
        key,
        sender,
        size: metadata.size,
        path: &path,
        tracker: SequenceTracker::new(),
        received: 0,
    };
    let result = ctx.stream(transport, &mut file, &mut on_progress).await;
    let (received, chunks) = (ctx.received, ctx.tracker.next_expected());

    let result = match result {
        Ok(()) => finish(&mut file, &path).await,
        Err(e) => {
            let _ = file.flush().await;
            Err(e)
        }
    };
    drop(file);

    match result {
        Ok(()) => {
            info!(path = %path.display(), bytes = received, chunks, "file received");
            Ok(TransferSummary {
                path,
                name,
                bytes: received,
                chunks,
            })
        }
        Err(e) => {
            if e.is_security_event() {
                warn!(error = %e, path = %path.display(), "discarding untrusted partial file");
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(error = %rm, "could not delete partial file");
                }
            } else {
                warn!(error = %e, path = %path.display(), "transfer aborted, partial file kept");
            }
            Err(e)
        }
    }
}

async fn finish(file: &mut File, path: &Path) -> Result<(), TransferError> {
    file.flush().await.map_err(|e| TransferError::io(path, e))?;
    file.sync_all().await.map_err(|e| TransferError::io(path, e))
}

/// Create the destination without overwriting anything.
async fn create_destination(dir: &Path, name: &str) -> Result<(File, PathBuf), TransferError> {
    for attempt in 0..MAX_COLLISION_ATTEMPTS {
        let path = dir.join(candidate_name(name, attempt));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                if attempt > 0 {
                    debug!(%name, path = %path.display(), "renamed to avoid overwrite");
                }
                return Ok((file, path));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(TransferError::io(path, e)),
        }
    }
    Err(TransferError::DestinationExists {
        dir: dir.to_path_buf(),
        name: name.to_string(),
    })
}

struct ReceiveContext<'a> {
    key: &'a SessionKey,
    sender: Role,
    size: u64,
    path: &'a Path,
    tracker: SequenceTracker,
    received: u64,
}

impl ReceiveContext<'_> {
    async fn stream<T, F>(
        &mut self,
        transport: &T,
        file: &mut File,
        on_progress: &mut F,
    ) -> Result<(), TransferError>
    where
        T: Transport + ?Sized,
        F: FnMut(u64, u64),
    {
        loop {
            let bytes = match next_payload(transport).await? {
                Incoming::Payload(bytes) => bytes,
                Incoming::Ended(reason) => {
                    debug!(%reason, "channel ended before end marker");
                    return Err(TransferError::IncompleteTransfer {
                        path: self.path.to_path_buf(),
                        received: self.received,
                        expected: self.size,
                    });
                }
                Incoming::Failed(reason) => {
                    return Err(TransferError::ConnectionLost {
                        sequence: self.tracker.next_expected(),
                        bytes_transferred: self.received,
                        reason,
                    })
                }
            };
            let frame = PayloadFrame::decode(&bytes).map_err(malformed)?;

            match frame.kind {
                FrameKind::Chunk => self.accept_chunk(frame, file, on_progress).await?,
                FrameKind::End => return self.accept_end(frame, on_progress),
                FrameKind::Metadata => return Err(malformed("metadata repeated mid-stream")),
            }
        }
    }

    async fn accept_chunk<F: FnMut(u64, u64)>(
        &mut self,
        frame: PayloadFrame,
        file: &mut File,
        on_progress: &mut F,
    ) -> Result<(), TransferError> {
        // Order is checked before spending time on decryption
        self.tracker
            .check(frame.sequence)
            .map_err(|gap| TransferError::SequenceGap {
                expected: gap.expected,
                actual: gap.actual,
            })?;

        let plain = self
            .key
            .open(
                &frame.sealed,
                &FrameAad::new(self.sender, FrameKind::Chunk, frame.sequence),
            )
            .map_err(|_| TransferError::AuthenticationFailed {
                kind: FrameKind::Chunk,
                sequence: frame.sequence,
            })?;

        let len = plain.len() as u64;
        if self.received + len > self.size {
            return Err(malformed(format!(
                "chunk {} overruns announced size {}",
                frame.sequence, self.size
            )));
        }

        file.write_all(&plain)
            .await
            .map_err(|e| TransferError::io(self.path, e))?;
        self.tracker.advance();
        self.received += len;
        on_progress(self.received, self.size);
        debug!(sequence = frame.sequence, received = self.received, "chunk written");
        Ok(())
    }

    fn accept_end<F: FnMut(u64, u64)>(
        &mut self,
        frame: PayloadFrame,
        on_progress: &mut F,
    ) -> Result<(), TransferError> {
        let chunks = self.tracker.next_expected();
        if frame.sequence != chunks {
            return Err(TransferError::SequenceGap {
                expected: chunks,
                actual: frame.sequence,
            });
        }

        let plain = self
            .key
            .open(
                &frame.sealed,
                &FrameAad::new(self.sender, FrameKind::End, frame.sequence),
            )
            .map_err(|_| TransferError::AuthenticationFailed {
                kind: FrameKind::End,
                sequence: frame.sequence,
            })?;
        let trailer = EndOfStream::from_bytes(&plain).map_err(malformed)?;

        if trailer.chunks != chunks || trailer.bytes != self.received || self.received != self.size {
            return Err(malformed(format!(
                "end marker mismatch: trailer {}/{} bytes in {} chunks, received {}/{} in {}",
                trailer.bytes, self.size, trailer.chunks, self.received, self.size, chunks
            )));
        }

        if self.size == 0 {
            on_progress(0, 0);
        }
        Ok(())
    }
}
