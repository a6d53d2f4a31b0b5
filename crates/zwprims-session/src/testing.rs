//! Scripted controller on the far end of an in-memory stream.

use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use zwprims_frame::{ControlToken, Frame, FrameReader, FrameWriter, Inbound};

pub(crate) struct Device {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: FrameWriter<WriteHalf<DuplexStream>>,
}

/// Host stream plus the device driving its other end.
pub(crate) fn device_pair() -> (DuplexStream, Device) {
    let (host, device) = tokio::io::duplex(4096);
    let (read_half, write_half) = tokio::io::split(device);
    let device = Device {
        reader: FrameReader::new(read_half),
        writer: FrameWriter::new(write_half),
    };
    (host, device)
}

impl Device {
    pub(crate) async fn next(&mut self) -> Inbound {
        self.reader.read_next().await.expect("device read failed")
    }

    pub(crate) async fn expect_frame(&mut self) -> Frame {
        match self.next().await {
            Inbound::Frame(frame) => frame,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    pub(crate) async fn expect_control(&mut self) -> ControlToken {
        match self.next().await {
            Inbound::Control(token) => token,
            other => panic!("expected control token, got {other:?}"),
        }
    }

    pub(crate) async fn send_frame(&mut self, frame: &Frame) {
        self.writer.write_frame(frame).await.expect("device write failed");
    }

    pub(crate) async fn send_control(&mut self, token: ControlToken) {
        self.writer
            .send_control(token)
            .await
            .expect("device write failed");
    }

    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.writer.get_mut();
        stream.write_all(bytes).await.expect("device write failed");
        stream.flush().await.expect("device flush failed");
    }

    /// Read the host's frame and ACK it.
    pub(crate) async fn accept_frame(&mut self) -> Frame {
        let frame = self.expect_frame().await;
        self.send_control(ControlToken::Ack).await;
        frame
    }

    /// Send a frame and consume the host's ACK for it.
    pub(crate) async fn deliver(&mut self, frame: &Frame) {
        self.send_frame(frame).await;
        assert_eq!(self.expect_control().await, ControlToken::Ack);
    }
}
