//! Decoder threads feeding a [`VideoStream`]
//!
//! Codec objects that are not `Send` stay on a dedicated thread which
//! decodes ahead into a small bounded channel. Dropping the stream
//! disconnects the channel and the thread stops at its next send.

use crate::backend::{RawFrame, VideoProperties, VideoStream};
use crate::error::{DecodeError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Frames decoded ahead of the consumer
pub const DECODE_AHEAD: usize = 4;

pub(crate) enum Message {
    Opened(VideoProperties),
    Frame(RawFrame),
}

pub(crate) type Outbox = Sender<Result<Message>>;

/// Runs `produce` on a named thread and waits for its `Opened` message
pub(crate) fn spawn_stream<F>(
    path: &Path,
    thread_name: &str,
    produce: F,
) -> Result<Box<dyn VideoStream>>
where
    F: FnOnce(&Path, &Outbox) -> Result<()> + Send + 'static,
{
    let (tx, rx) = bounded(DECODE_AHEAD);
    let owned = path.to_path_buf();

    std::thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            if let Err(e) = produce(&owned, &tx) {
                let _ = tx.send(Err(e));
            }
        })
        .map_err(|e| DecodeError::from_io(path, e))?;

    match rx.recv() {
        Ok(Ok(Message::Opened(properties))) => {
            debug!(
                path = %path.display(),
                decoder = thread_name,
                width = properties.width,
                height = properties.height,
                fps = ?properties.frame_rate,
                "Video stream opened"
            );
            Ok(Box::new(ThreadStream {
                rx,
                properties,
                path: path.to_path_buf(),
                finished: false,
            }))
        }
        Ok(Ok(Message::Frame(_))) => Err(DecodeError::corrupt(path, "frame before header")),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(DecodeError::corrupt(path, "decoder stopped before the first frame")),
    }
}

/// Sends a frame; `false` once the consumer is gone
pub(crate) fn send_frame(tx: &Outbox, frame: RawFrame) -> bool {
    tx.send(Ok(Message::Frame(frame))).is_ok()
}

/// Sends the stream header; `false` once the consumer is gone
pub(crate) fn send_opened(tx: &Outbox, properties: VideoProperties) -> bool {
    tx.send(Ok(Message::Opened(properties))).is_ok()
}

struct ThreadStream {
    rx: Receiver<Result<Message>>,
    properties: VideoProperties,
    path: PathBuf,
    finished: bool,
}

impl VideoStream for ThreadStream {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        while !self.finished {
            match self.rx.recv() {
                Ok(Ok(Message::Frame(frame))) => return Ok(Some(frame)),
                Ok(Ok(Message::Opened(_))) => continue,
                Ok(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                Err(_) => {
                    trace!(path = %self.path.display(), "Video stream exhausted");
                    self.finished = true;
                }
            }
        }
        Ok(None)
    }
}
