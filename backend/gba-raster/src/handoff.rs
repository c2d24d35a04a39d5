//! Two-thread frame handoff: the logic thread renders and sends finished frames, the presentation
//! thread receives them and draws through a [`Renderer`]
//!
//! At most one frame is in flight. `send_frame()` blocks until the presenter acknowledges, and the
//! acknowledgement carries the buffer back to the sender for reuse.

use crate::frame::FrameBuffer;
use raster_common::frontend::Renderer;
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;
use thiserror::Error;

struct DoneMessage {
    buffer: FrameBuffer,
    rendered: bool,
}

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Invalid frame buffer length {len} for size {width}x{height}")]
    InvalidFrameBufferLen { len: usize, width: u32, height: u32 },
    #[error("Lost connection to presentation thread")]
    LostConnection,
    #[error("Error from underlying renderer")]
    Render,
}

#[derive(Debug, Error)]
pub enum RecvFrameError<RErr> {
    #[error("recv error: {0}")]
    Recv(#[from] RecvTimeoutError),
    #[error("lost connection to other thread")]
    LostConnection,
    #[error("renderer error: {0}")]
    Render(RErr),
}

pub struct FrameSender {
    frame_sender: SyncSender<FrameBuffer>,
    done_receiver: Receiver<DoneMessage>,
    spare: Option<FrameBuffer>,
}

pub struct FramePresenter {
    frame_receiver: Receiver<FrameBuffer>,
    done_sender: SyncSender<DoneMessage>,
}

#[must_use]
pub fn channel() -> (FrameSender, FramePresenter) {
    let (frame_sender, frame_receiver) = mpsc::sync_channel(1);
    let (done_sender, done_receiver) = mpsc::sync_channel(1);

    let sender = FrameSender { frame_sender, done_receiver, spare: None };
    let presenter = FramePresenter { frame_receiver, done_sender };

    (sender, presenter)
}

impl FrameSender {
    /// Hand a finished frame to the presentation thread and wait for it to be presented.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame's pixel count does not match its size, if the presenter has
    /// been dropped, or if the presenter's renderer failed.
    pub fn send_frame(&mut self, frame: &FrameBuffer) -> Result<(), HandoffError> {
        if frame.pixels.len() != frame.size.len() {
            return Err(HandoffError::InvalidFrameBufferLen {
                len: frame.pixels.len(),
                width: frame.size.width,
                height: frame.size.height,
            });
        }

        let mut buffer = match self.spare.take() {
            Some(buffer) if buffer.size == frame.size => buffer,
            _ => FrameBuffer::new(frame.size),
        };
        buffer.pixels.copy_from_slice(&frame.pixels);

        if self.frame_sender.send(buffer).is_err() {
            return Err(HandoffError::LostConnection);
        }

        let Ok(DoneMessage { buffer, rendered }) = self.done_receiver.recv() else {
            return Err(HandoffError::LostConnection);
        };
        self.spare = Some(buffer);

        if !rendered {
            return Err(HandoffError::Render);
        }

        Ok(())
    }
}

impl FramePresenter {
    /// Wait up to `timeout` for a frame, present it, and release the sender.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or disconnect, or if the renderer fails. A renderer failure is
    /// also reported to the sender.
    pub fn recv_frame<R: Renderer>(
        &self,
        renderer: &mut R,
        timeout: Duration,
    ) -> Result<(), RecvFrameError<R::Err>> {
        let buffer = self.frame_receiver.recv_timeout(timeout)?;
        let colors = buffer.to_rgba();

        match renderer.render_frame(&colors, buffer.size) {
            Ok(()) => {
                self.done_sender
                    .send(DoneMessage { buffer, rendered: true })
                    .map_err(|_| RecvFrameError::LostConnection)?;
            }
            Err(err) => {
                let _ = self.done_sender.send(DoneMessage { buffer, rendered: false });
                return Err(RecvFrameError::Render(err));
            }
        }

        Ok(())
    }
}
