// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A stop handle is passed to the devices while the synth is playing. It's the device's
/// responsibility to return once a stop has been requested.
#[derive(Clone, Default)]
pub struct StopHandle {
    /// Set once a stop has been requested. Never cleared.
    stopped: Arc<Mutex<bool>>,
    /// The condvar will handle notification of stopping.
    condvar: Arc<Condvar>,
}

impl StopHandle {
    /// Creates a new stop handle.
    pub fn new() -> StopHandle {
        StopHandle::default()
    }

    /// Returns true if a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Blocks until a stop is requested.
    pub fn wait(&self) {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.condvar.wait(&mut stopped);
        }
    }

    /// Blocks until a stop is requested or the timeout passes. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.condvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    /// Requests a stop and wakes every waiter.
    pub fn stop(&self) {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_stop_handle_stopped() {
        let stop_handle = StopHandle::new();
        assert!(!stop_handle.is_stopped());

        let join = {
            let stop_handle = stop_handle.clone();
            thread::spawn(move || stop_handle.wait())
        };

        stop_handle.stop();
        assert!(join.join().is_ok());
        assert!(stop_handle.is_stopped());

        // Stopping again is harmless and waiting returns immediately.
        stop_handle.stop();
        stop_handle.wait();
    }

    #[test]
    fn test_stop_handle_timeout() {
        let stop_handle = StopHandle::new();
        assert!(!stop_handle.wait_timeout(Duration::from_millis(10)));

        stop_handle.stop();
        assert!(stop_handle.wait_timeout(Duration::from_secs(10)));
    }
}
