//! In-memory agent host for tests

use std::io;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use super::host::{AgentHandle, AgentHost, Launch};
use crate::pty::{RecordingSink, TerminalSize, Transport, TransportEvent};

/// Records every call and hands out channels backed by a [`RecordingSink`]
pub(crate) struct FakeAgentHost {
    pub pid: u32,
    calls: Mutex<Vec<String>>,
    acceptor: Mutex<Option<oneshot::Sender<Transport>>>,
    feed: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    sink: RecordingSink,
}

impl Default for FakeAgentHost {
    fn default() -> Self {
        Self {
            pid: 4321,
            calls: Mutex::new(Vec::new()),
            acceptor: Mutex::new(None),
            feed: Mutex::new(None),
            sink: RecordingSink(Arc::new(Mutex::new(Vec::new()))),
        }
    }
}

impl FakeAgentHost {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.sink.0.lock().unwrap().clone()
    }

    /// A new data channel; events pushed with [`FakeAgentHost::send`] arrive on it
    pub fn data_channel(&self) -> Transport {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed.lock().unwrap() = Some(tx);
        Transport::from_parts(Box::new(self.sink.clone()), rx)
    }

    /// Connect a data channel to the most recent listener
    pub fn connect(&self) {
        let channel = self.data_channel();
        let acceptor = self.acceptor.lock().unwrap().take().unwrap();
        acceptor.send(channel).unwrap();
    }

    pub fn send(&self, event: TransportEvent) {
        self.feed
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .send(event)
            .unwrap();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AgentHost for FakeAgentHost {
    fn listen(&self, channel: &str) -> io::Result<oneshot::Receiver<Transport>> {
        self.record(format!("listen {channel}"));
        let (tx, rx) = oneshot::channel();
        *self.acceptor.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn open(&self, channel: &str, size: TerminalSize, _debug: bool) -> io::Result<AgentHandle> {
        self.record(format!("open {channel} {}x{}", size.cols, size.rows));
        Ok(AgentHandle {
            pid: self.pid,
            fd: None,
            pty_id: "1".to_string(),
        })
    }

    fn start_process(&self, pid: u32, launch: &Launch) -> io::Result<()> {
        self.record(format!("start {pid} {}", launch.command_line()));
        Ok(())
    }

    fn resize(&self, pid: u32, size: TerminalSize) -> io::Result<()> {
        self.record(format!("resize {pid} {}x{}", size.cols, size.rows));
        Ok(())
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        self.record(format!("kill {pid}"));
        Ok(())
    }
}
