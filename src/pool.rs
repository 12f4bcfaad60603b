//! Pool of auxiliary control connections ("child sessions").
//!
//! FTP allows one data transfer per control connection, so every open
//! remote stream borrows a dedicated child session. Closed streams
//! return their session here for reuse; sessions that errored or whose
//! server side timed out while idle are discarded instead.

use crate::error::FtpResult;
use crate::session::{FtpSession, SessionFactory};
use crate::types::PoolStats;
use std::rc::Rc;
use uuid::Uuid;

/// A child session together with its pool bookkeeping identity.
pub struct PooledSession {
    pub id: String,
    pub session: Box<dyn FtpSession>,
}

/// Idle/busy bookkeeping for child sessions.
pub struct ChildPool {
    factory: Rc<dyn SessionFactory>,
    idle: Vec<PooledSession>,
    busy: usize,
}

impl ChildPool {
    pub fn new(factory: Rc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            idle: Vec::new(),
            busy: 0,
        }
    }

    /// Hand out an idle child, or create one through the factory.
    ///
    /// Idle children are probed with `PWD` first; the server may have
    /// dropped them while they sat unused (a late 226 from a previous
    /// transfer surfaces here too). Probe failures discard the child
    /// and the next candidate is tried.
    pub fn acquire(&mut self) -> FtpResult<PooledSession> {
        while let Some(mut child) = self.idle.pop() {
            match child.session.pwd() {
                Ok(_) => {
                    self.busy += 1;
                    return Ok(child);
                }
                Err(err) => {
                    log::debug!("discarding stale child session {}: {}", child.id, err);
                    let _ = child.session.close();
                }
            }
        }
        let session = self.factory.open_session()?;
        let child = PooledSession {
            id: Uuid::new_v4().to_string(),
            session,
        };
        log::debug!("created child session {}", child.id);
        self.busy += 1;
        Ok(child)
    }

    /// Return a child after its stream closed. An errored child is
    /// closed and dropped; its connection state is unknown.
    pub fn release(&mut self, mut child: PooledSession, errored: bool) {
        self.busy = self.busy.saturating_sub(1);
        if errored {
            log::warn!("closing errored child session {}", child.id);
            let _ = child.session.close();
        } else {
            self.idle.push(child);
        }
    }

    /// Close every idle child. Busy children are owned by their
    /// streams and are closed when those streams close.
    pub fn close_all(&mut self) {
        for mut child in self.idle.drain(..) {
            log::debug!("closing child session {}", child.id);
            let _ = child.session.close();
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle_sessions: self.idle.len(),
            busy_sessions: self.busy,
        }
    }
}
