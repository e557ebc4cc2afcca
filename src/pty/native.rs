//! Native pty host for unix
//!
//! Spawns children through portable-pty and opens bare pairs through
//! `openpty(3)`. Masters of spawned children are kept here so they can be
//! resized and queried for their foreground process.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use nix::pty::{openpty, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{ttyname, Pid};
use portable_pty::{native_pty_system, CommandBuilder, MasterPty};
use tracing::{debug, info};

use super::direct::{Allocation, PtyHost, PtyPair};
use super::options::SpawnRequest;
use super::size::TerminalSize;
use super::transport::Transport;

fn other(e: anyhow::Error) -> io::Error {
    io::Error::other(e)
}

/// [`PtyHost`] backed by the operating system
#[derive(Default)]
pub struct NativePtyHost {
    masters: Mutex<HashMap<i32, Box<dyn MasterPty + Send>>>,
}

impl NativePtyHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn masters(&self) -> MutexGuard<'_, HashMap<i32, Box<dyn MasterPty + Send>>> {
        self.masters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PtyHost for NativePtyHost {
    fn allocate(&self, request: &SpawnRequest) -> io::Result<Allocation> {
        if request.user.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "running the child as another user is not supported",
            ));
        }

        let pair = native_pty_system()
            .openpty(request.size.to_pty_size())
            .map_err(other)?;

        let mut cmd = CommandBuilder::new(&request.file);
        cmd.args(&request.args);
        cmd.cwd(&request.cwd);
        cmd.env_clear();
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        let mut child = pair.slave.spawn_command(cmd).map_err(other)?;

        // Only the child keeps the slave open, so its exit hangs up the master
        drop(pair.slave);

        let pid = child
            .process_id()
            .ok_or_else(|| io::Error::other("child has no process id"))?;
        let fd = pair
            .master
            .as_raw_fd()
            .ok_or_else(|| io::Error::other("pty master has no descriptor"))?;
        let pty_id = slave_name(fd).unwrap_or_else(|| format!("fd:{fd}"));

        let reader = pair.master.try_clone_reader().map_err(other)?;
        let writer = pair.master.take_writer().map_err(other)?;
        let transport = Transport::from_blocking(reader, writer);

        std::thread::spawn(move || match child.wait() {
            Ok(status) => debug!("Child {} exited: {:?}", pid, status),
            Err(e) => debug!("Failed to wait for child {}: {}", pid, e),
        });

        info!("Allocated {} for {} (pid {})", pty_id, request.file, pid);
        self.masters().insert(fd, pair.master);

        Ok(Allocation {
            pid,
            fd,
            pty_id,
            transport,
        })
    }

    fn open_pair(&self, size: TerminalSize) -> io::Result<PtyPair> {
        use std::os::fd::AsRawFd;

        let winsize = winsize(size);
        let pty = openpty(Some(&winsize), None).map_err(io::Error::from)?;

        let pty_id = ttyname(&pty.slave)
            .map(|path| path.display().to_string())
            .map_err(io::Error::from)?;

        let master = File::from(pty.master);
        let slave = File::from(pty.slave);
        let fd = master.as_raw_fd();

        let master = Transport::from_blocking(Box::new(master.try_clone()?), Box::new(master));
        let slave = Transport::from_blocking(Box::new(slave.try_clone()?), Box::new(slave));

        info!("Opened pty pair {}", pty_id);
        Ok(PtyPair {
            fd,
            pty_id,
            master,
            slave,
        })
    }

    fn resize(&self, fd: i32, size: TerminalSize) -> io::Result<()> {
        if let Some(master) = self.masters().get(&fd) {
            return master.resize(size.to_pty_size()).map_err(other);
        }

        let winsize = winsize(size);
        // SAFETY: TIOCSWINSZ only reads the winsize struct, which outlives the call
        let rc = unsafe { nix::libc::ioctl(fd, nix::libc::TIOCSWINSZ, &winsize as *const Winsize) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn kill(&self, pid: u32, signal: &str) -> io::Result<()> {
        let signal = Signal::from_str(signal)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Unknown signal: {signal}")))?;
        let pid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), signal).map_err(io::Error::from)
    }

    fn process_name(&self, fd: i32, _pty_id: &str) -> Option<String> {
        let leader = self.masters().get(&fd)?.process_group_leader()?;
        let comm = std::fs::read_to_string(format!("/proc/{leader}/comm")).ok()?;
        let name = comm.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    fn release(&self, fd: i32) {
        if self.masters().remove(&fd).is_some() {
            debug!("Released pty master {}", fd);
        }
    }
}

/// Path of the slave end for master `fd`
#[cfg(target_os = "linux")]
fn slave_name(fd: i32) -> Option<String> {
    let mut buf = [0 as nix::libc::c_char; 64];
    // SAFETY: buf is writable for its whole length; ptsname_r NUL-terminates on success
    let rc = unsafe { nix::libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: buf holds a NUL-terminated string after a successful call
    let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(not(target_os = "linux"))]
fn slave_name(_fd: i32) -> Option<String> {
    None
}

fn winsize(size: TerminalSize) -> Winsize {
    Winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}
