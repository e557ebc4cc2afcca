//! Byte-stream endpoint bound to a pty fd or a data channel
//!
//! A [`Transport`] pairs a write sink with a stream of [`TransportEvent`]s.
//! Reads happen elsewhere (a blocking reader thread for pty fds, a tokio task
//! for async streams) and arrive in order over an unbounded channel, so the
//! owning session consumes them one at a time on its own schedule.

use std::io::{self, Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Size of a single read from the underlying handle
const READ_BUFFER_SIZE: usize = 4096;

/// Something that happened on a transport
#[derive(Debug)]
pub enum TransportEvent {
    /// The channel is connected
    Connect,
    /// Bytes read from the channel
    Data(Vec<u8>),
    /// The remote side finished writing
    End,
    /// The channel went idle
    Timeout,
    /// Everything written so far has been flushed
    Drain,
    /// Reading or writing failed
    Error(io::Error),
    /// The channel is gone; always the last event
    Close,
}

impl TransportEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connect => "connect",
            TransportEvent::Data(_) => "data",
            TransportEvent::End => "end",
            TransportEvent::Timeout => "timeout",
            TransportEvent::Drain => "drain",
            TransportEvent::Error(_) => "error",
            TransportEvent::Close => "close",
        }
    }
}

/// Write side of a transport
pub trait TransportSink: Send {
    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Signal that no more data will be written
    fn end(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink over a blocking writer
struct WriterSink(Box<dyn Write + Send>);

impl TransportSink for WriterSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.0.write_all(data)?;
        self.0.flush()
    }
}

enum Outgoing {
    Data(Vec<u8>),
    End,
}

/// Sink feeding the writer task of a stream transport
struct StreamSink(mpsc::UnboundedSender<Outgoing>);

impl TransportSink for StreamSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.0
            .send(Outgoing::Data(data.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task has stopped"))
    }

    fn end(&mut self) -> io::Result<()> {
        self.0
            .send(Outgoing::End)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "writer task has stopped"))
    }
}

/// A bidirectional byte stream with an ordered event feed
pub struct Transport {
    sink: Option<Box<dyn TransportSink>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
}

impl Transport {
    /// Build a transport from a custom sink and event feed
    pub fn from_parts(
        sink: Box<dyn TransportSink>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            sink: Some(sink),
            events,
            closed: false,
        }
    }

    /// Build a transport over blocking handles, such as a pty master.
    ///
    /// The reader is drained on a dedicated thread.
    pub fn from_blocking(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || read_loop(reader, event_tx));

        Self::from_parts(Box::new(WriterSink(writer)), event_rx)
    }

    /// Build a transport over an async stream, such as a named pipe.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut read_half, mut write_half) = tokio::io::split(stream);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();

        let _ = event_tx.send(TransportEvent::Connect);

        let reader_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match read_half.read(&mut buffer).await {
                    Ok(0) => {
                        let _ = reader_tx.send(TransportEvent::End);
                        break;
                    }
                    Ok(n) => {
                        if reader_tx
                            .send(TransportEvent::Data(buffer[..n].to_vec()))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = reader_tx.send(TransportEvent::Error(e));
                        break;
                    }
                }
            }
            let _ = reader_tx.send(TransportEvent::Close);
        });

        tokio::spawn(async move {
            while let Some(op) = out_rx.recv().await {
                match op {
                    Outgoing::Data(data) => {
                        let result = async {
                            write_half.write_all(&data).await?;
                            write_half.flush().await
                        }
                        .await;
                        if let Err(e) = result {
                            let _ = event_tx.send(TransportEvent::Error(e));
                            return;
                        }
                        if out_rx.is_empty() {
                            let _ = event_tx.send(TransportEvent::Drain);
                        }
                    }
                    Outgoing::End => {
                        let _ = write_half.shutdown().await;
                        return;
                    }
                }
            }
        });

        Self::from_parts(Box::new(StreamSink(out_tx)), event_rx)
    }

    /// Write bytes to the remote side
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.write(data),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transport is not writable",
            )),
        }
    }

    /// Optionally write a last chunk, then stop writing
    pub fn end(&mut self, data: Option<&[u8]>) -> io::Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        if let Some(data) = data {
            sink.write(data)?;
        }
        sink.end()
    }

    /// Stop reading and writing. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.closed {
            return;
        }
        debug!("Destroying transport");
        self.closed = true;
        self.sink = None;
        self.events.close();
    }

    /// The transport has been destroyed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the next event. Returns `None` once the feed is exhausted.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("writable", &self.sink.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Reader loop that runs in a separate thread
fn read_loop(mut reader: Box<dyn Read + Send>, events: mpsc::UnboundedSender<TransportEvent>) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                let _ = events.send(TransportEvent::End);
                break;
            }
            Ok(n) => {
                if events
                    .send(TransportEvent::Data(buffer[..n].to_vec()))
                    .is_err()
                {
                    // Transport destroyed
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(10));
                continue;
            }
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e));
                break;
            }
        }
    }

    let _ = events.send(TransportEvent::Close);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blocking_transport_reads_until_eof() {
        let reader = Box::new(Cursor::new(b"hello".to_vec()));
        let writer = SharedWriter::default();
        let mut transport = Transport::from_blocking(reader, Box::new(writer.clone()));

        let mut data = Vec::new();
        let mut names = Vec::new();
        while let Some(event) = timeout(Duration::from_secs(2), transport.recv()).await.unwrap() {
            names.push(event.name());
            if let TransportEvent::Data(bytes) = event {
                data.extend(bytes);
            }
        }

        assert_eq!(data, b"hello");
        assert_eq!(names.last(), Some(&"close"));
        assert!(names.contains(&"end"));

        transport.write(b"input").unwrap();
        assert_eq!(&*writer.0.lock().unwrap(), b"input");
    }

    #[tokio::test]
    async fn test_end_and_destroy_stop_writes() {
        let writer = SharedWriter::default();
        let mut transport =
            Transport::from_blocking(Box::new(io::empty()), Box::new(writer.clone()));

        transport.end(Some(b"bye")).unwrap();
        assert_eq!(&*writer.0.lock().unwrap(), b"bye");
        assert!(transport.write(b"more").is_err());

        transport.destroy();
        transport.destroy();
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_stream_transport_round_trip() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(local);

        let first = timeout(Duration::from_secs(2), transport.recv()).await.unwrap();
        assert!(matches!(first, Some(TransportEvent::Connect)));

        remote.write_all(b"ping").await.unwrap();
        match timeout(Duration::from_secs(2), transport.recv()).await.unwrap() {
            Some(TransportEvent::Data(data)) => assert_eq!(data, b"ping"),
            other => panic!("Expected data, got {:?}", other),
        }

        transport.write(b"pong").unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        match timeout(Duration::from_secs(2), transport.recv()).await.unwrap() {
            Some(TransportEvent::Drain) => {}
            other => panic!("Expected drain, got {:?}", other),
        }

        drop(remote);
        let mut names = Vec::new();
        while let Some(event) = timeout(Duration::from_secs(2), transport.recv()).await.unwrap() {
            let done = matches!(event, TransportEvent::Close);
            names.push(event.name());
            if done {
                break;
            }
        }
        assert_eq!(names, vec!["end", "close"]);
    }
}
