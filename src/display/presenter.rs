//! Presenter backed by a bounded channel
//!
//! The free slots of the channel are the desired size, so a renderer that
//! falls behind makes the decode pipeline shed frames instead of queuing.

use crate::display::PresentationSink;
use crate::pipeline::DecodedVideoFrame;
use log::debug;
use tokio::sync::mpsc;

pub struct ChannelPresenter {
    tx: mpsc::Sender<DecodedVideoFrame>,
}

impl ChannelPresenter {
    /// Presenter plus the receiving end for the renderer
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<DecodedVideoFrame>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }
}

impl PresentationSink for ChannelPresenter {
    fn desired_size(&self) -> isize {
        if self.tx.is_closed() {
            return 0;
        }
        self.tx.capacity() as isize
    }

    fn present(&mut self, frame: DecodedVideoFrame) {
        if let Err(e) = self.tx.try_send(frame) {
            debug!("presenter dropped frame: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Timestamp;
    use bytes::Bytes;

    fn frame() -> DecodedVideoFrame {
        DecodedVideoFrame {
            timestamp: Timestamp::default(),
            width: 2,
            height: 2,
            data: Bytes::from_static(&[0; 6]),
        }
    }

    #[test]
    fn test_desired_size_tracks_free_slots() {
        let (mut presenter, mut rx) = ChannelPresenter::channel(2);
        assert_eq!(presenter.desired_size(), 2);
        presenter.present(frame());
        presenter.present(frame());
        assert_eq!(presenter.desired_size(), 0);

        rx.try_recv().unwrap();
        assert_eq!(presenter.desired_size(), 1);

        drop(rx);
        assert_eq!(presenter.desired_size(), 0);
    }
}
