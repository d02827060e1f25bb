// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native `forkpty`-based multiplexer adapter. Fallback backend for
//! environments without `tmux`, and the default in tests. Panes do **not**
//! survive a supervisor restart — once the process exits, every `NativePty`
//! child goes with it.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::{Mutex, RwLock};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{dup, execvp, Pid};
use tokio::io::unix::AsyncFd;

use super::{CpuPriority, MultiplexerAdapter, ReadChunk};
use crate::error::{AppError, ErrorCode};

/// Newtype wrapper around `OwnedFd` so it can implement `AsRawFd` for
/// `AsyncFd`.
struct PtyFd(OwnedFd);

impl AsRawFd for PtyFd {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for PtyFd {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        self.0.as_fd()
    }
}

fn set_nonblocking(fd: &impl AsFd) -> std::io::Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io_err)?;
    Ok(())
}

fn io_err(err: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(err as i32)
}

struct Pane {
    master: AsyncFd<PtyFd>,
    child_pid: Pid,
    /// Taken by the first `attach_read_stream` call; `None` afterwards.
    reader_rx: Option<tokio::sync::mpsc::Receiver<ReadChunk>>,
}

pub struct NativeAdapter {
    panes: RwLock<HashMap<String, Mutex<Pane>>>,
}

impl Default for NativeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeAdapter {
    pub fn new() -> Self {
        Self { panes: RwLock::new(HashMap::new()) }
    }

    fn op_err(context: &str, err: impl std::fmt::Display) -> AppError {
        AppError::new(ErrorCode::OperationFailed, format!("{context}: {err}"))
    }
}

impl MultiplexerAdapter for NativeAdapter {
    fn create_session(
        &self,
        name: &str,
        working_dir: &std::path::Path,
        command: &[String],
        env: &[(String, String)],
        _cpu_priority: CpuPriority,
    ) -> Result<(), AppError> {
        if command.is_empty() {
            return Err(AppError::invalid_input("command must have at least one element"));
        }
        {
            let panes = self.panes.read().map_err(|_| Self::op_err("panes lock poisoned", "read"))?;
            if panes.contains_key(name) {
                return Err(AppError::new(ErrorCode::AlreadyExists, format!("pane {name} already exists")));
            }
        }

        let winsize = Winsize { ws_col: 80, ws_row: 24, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: forkpty leaves the child partially initialized until the
        // immediate execvp below; no other code runs in the child branch.
        #[allow(unsafe_code)]
        let fork_result = unsafe { forkpty(&winsize, None) }.map_err(|err| Self::op_err("forkpty", err))?;

        match fork_result {
            ForkptyResult::Child => {
                std::env::set_current_dir(working_dir).ok();
                for (key, value) in env {
                    std::env::set_var(key, value);
                }
                let c_args: Vec<CString> = command
                    .iter()
                    .filter_map(|arg| CString::new(arg.as_bytes()).ok())
                    .collect();
                if c_args.is_empty() {
                    std::process::exit(127);
                }
                let _ = execvp(&c_args[0], &c_args);
                std::process::exit(127);
            }
            ForkptyResult::Parent { child, master } => {
                set_nonblocking(&master).map_err(|err| Self::op_err("set_nonblocking", err))?;

                // A second fd on the same pty master, dedicated to the
                // background reader task below so reads never contend with
                // the `write`/`resize` lock on `master`. `dup` shares the
                // underlying open file description, so O_NONBLOCK set above
                // already applies to it.
                let read_fd = dup(&master).map_err(|err| Self::op_err("dup", err))?;
                let read_afd = AsyncFd::new(PtyFd(read_fd)).map_err(|err| Self::op_err("AsyncFd::new", err))?;

                let afd = AsyncFd::new(PtyFd(master)).map_err(|err| Self::op_err("AsyncFd::new", err))?;
                let (tx, rx) = tokio::sync::mpsc::channel(64);
                tokio::spawn(forward_pane_output(read_afd, tx));

                let mut panes = self.panes.write().map_err(|_| Self::op_err("panes lock poisoned", "write"))?;
                panes.insert(name.to_owned(), Mutex::new(Pane { master: afd, child_pid: child, reader_rx: Some(rx) }));
                Ok(())
            }
        }
    }

    fn attach_read_stream(&self, name: &str) -> Result<tokio::sync::mpsc::Receiver<ReadChunk>, AppError> {
        let panes = self.panes.read().map_err(|_| Self::op_err("panes lock poisoned", "read"))?;
        let pane = panes.get(name).ok_or_else(|| AppError::not_found(format!("no pane named {name}")))?;
        let mut pane = pane.lock().map_err(|_| Self::op_err("pane lock poisoned", "attach_read_stream"))?;
        pane.reader_rx
            .take()
            .ok_or_else(|| AppError::new(ErrorCode::AlreadyExists, format!("pane {name} already attached")))
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), AppError> {
        let panes = self.panes.read().map_err(|_| Self::op_err("panes lock poisoned", "read"))?;
        let pane = panes.get(name).ok_or_else(|| AppError::not_found(format!("no pane named {name}")))?;
        let pane = pane.lock().map_err(|_| Self::op_err("pane lock poisoned", "write"))?;
        nix::unistd::write(pane.master.get_ref(), bytes).map_err(|err| Self::op_err("write", err))?;
        Ok(())
    }

    fn resize(&self, name: &str, cols: u16, rows: u16) -> Result<(), AppError> {
        let panes = self.panes.read().map_err(|_| Self::op_err("panes lock poisoned", "read"))?;
        let pane = panes.get(name).ok_or_else(|| AppError::not_found(format!("no pane named {name}")))?;
        let pane = pane.lock().map_err(|_| Self::op_err("pane lock poisoned", "resize"))?;
        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: TIOCSWINSZ is a standard ioctl on a valid pty master fd.
        #[allow(unsafe_code)]
        unsafe {
            nix::libc::ioctl(pane.master.as_raw_fd(), nix::libc::TIOCSWINSZ, &winsize);
        }
        Ok(())
    }

    fn kill(&self, name: &str) -> Result<(), AppError> {
        let mut panes = self.panes.write().map_err(|_| Self::op_err("panes lock poisoned", "kill"))?;
        if let Some(pane) = panes.remove(name) {
            let pane = pane.into_inner().map_err(|_| Self::op_err("pane lock poisoned", "kill"))?;
            let _ = kill(pane.child_pid, Signal::SIGTERM);
        }
        Ok(())
    }

    fn list(&self) -> Result<std::collections::HashSet<String>, AppError> {
        let panes = self.panes.read().map_err(|_| Self::op_err("panes lock poisoned", "list"))?;
        Ok(panes.keys().cloned().collect())
    }

    fn exists(&self, name: &str) -> Result<bool, AppError> {
        let panes = self.panes.read().map_err(|_| Self::op_err("panes lock poisoned", "exists"))?;
        Ok(panes.contains_key(name))
    }
}

/// Drains a pty master fd into `tx` until the child exits (read returns 0)
/// or the fd errors out. Owns its `AsyncFd` outright, so it never contends
/// with the `Mutex<Pane>` guarding `write`/`resize`.
async fn forward_pane_output(afd: AsyncFd<PtyFd>, tx: tokio::sync::mpsc::Sender<ReadChunk>) {
    let mut buf = [0u8; 4096];
    loop {
        let mut guard = match afd.readable().await {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let read = guard.try_io(|inner| {
            nix::unistd::read(inner, &mut buf).map_err(|err| std::io::Error::from_raw_os_error(err as i32))
        });
        match read {
            Ok(Ok(0)) => return,
            Ok(Ok(n)) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    return;
                }
            }
            Ok(Err(_)) => return,
            Err(_would_block) => continue,
        }
    }
}

#[cfg(test)]
#[path = "native_tests.rs"]
mod tests;
