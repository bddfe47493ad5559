// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jesof

//! Dedicated writer task for encoded sentences
//!
//! The session task hands finished frames to this task and goes straight
//! back to reading, so a peer that is slow to drain its socket can never
//! stop replies from being consumed.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Frames taken off the channel before a single flush
const MAX_BATCH_SIZE: usize = 64;

/// Sender side of the writer task
pub(crate) type FrameSender = mpsc::UnboundedSender<Bytes>;

/// Spawns the writer loop over `writer`
///
/// The task ends with `Ok` once every sender is dropped and the queued
/// frames are written, or with the first write error.
pub(crate) fn spawn_writer_task<W>(writer: W) -> (FrameSender, JoinHandle<std::io::Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(writer_loop(rx, writer));
    (tx, task)
}

async fn writer_loop<W>(mut rx: mpsc::UnboundedReceiver<Bytes>, mut writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        writer.write_all(&first).await?;

        let mut batched = 1;
        while batched < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => {
                    writer.write_all(&frame).await?;
                    batched += 1;
                }
                Err(_) => break,
            }
        }
        writer.flush().await?;
        tracing::trace!(frames = batched, "Frames written");
    }

    if let Err(e) = writer.shutdown().await {
        tracing::trace!("Transport shutdown failed: {}", e);
    }
    Ok(())
}
