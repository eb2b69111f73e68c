// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::global;
use opentelemetry::metrics::{Counter, UpDownCounter};

/// Server side counters.
///
/// Each event bumps a local atomic, readable through the getters, and the
/// matching instrument on the global meter provider. Without a provider
/// installed the instruments are no-ops.
pub struct ServerProbe {
    connects: AtomicU64,
    disconnects: AtomicU64,
    frames: AtomicU64,
    frame_bytes: AtomicU64,
    corrupted_frames: AtomicU64,
    instruments: Instruments,
}

struct Instruments {
    connects: Counter<u64>,
    active: UpDownCounter<i64>,
    frames: Counter<u64>,
    frame_bytes: Counter<u64>,
    corrupted_frames: Counter<u64>,
}

impl ServerProbe {
    pub fn new() -> Self {
        let meter = global::meter("logwire");
        let instruments = Instruments {
            connects: meter
                .u64_counter("logwire.connections.established")
                .with_description("connections accepted")
                .init(),
            active: meter
                .i64_up_down_counter("logwire.connections.active")
                .with_description("connections currently open")
                .init(),
            frames: meter
                .u64_counter("logwire.frames.received")
                .with_description("frames read and verified")
                .init(),
            frame_bytes: meter
                .u64_counter("logwire.frames.bytes")
                .with_description("frame body bytes read")
                .init(),
            corrupted_frames: meter
                .u64_counter("logwire.frames.corrupted")
                .with_description("frames rejected for a bad checksum or layout")
                .init(),
        };
        ServerProbe {
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            frame_bytes: AtomicU64::new(0),
            corrupted_frames: AtomicU64::new(0),
            instruments,
        }
    }

    pub fn connection_established(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        self.instruments.connects.add(1, &[]);
        self.instruments.active.add(1, &[]);
    }

    pub fn connection_closed(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        self.instruments.active.add(-1, &[]);
    }

    pub fn frame_received(&self, body_size: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.frame_bytes
            .fetch_add(body_size as u64, Ordering::Relaxed);
        self.instruments.frames.add(1, &[]);
        self.instruments.frame_bytes.add(body_size as u64, &[]);
    }

    pub fn corrupted_frame(&self) {
        self.corrupted_frames.fetch_add(1, Ordering::Relaxed);
        self.instruments.corrupted_frames.add(1, &[]);
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> u64 {
        self.connects().saturating_sub(self.disconnects())
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn frame_bytes(&self) -> u64 {
        self.frame_bytes.load(Ordering::Relaxed)
    }

    pub fn corrupted_frames(&self) -> u64 {
        self.corrupted_frames.load(Ordering::Relaxed)
    }
}

impl Default for ServerProbe {
    fn default() -> Self {
        ServerProbe::new()
    }
}

impl fmt::Debug for ServerProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProbe")
            .field("connects", &self.connects())
            .field("disconnects", &self.disconnects())
            .field("frames", &self.frames())
            .field("frame_bytes", &self.frame_bytes())
            .field("corrupted_frames", &self.corrupted_frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let probe = ServerProbe::new();
        probe.connection_established();
        probe.connection_established();
        probe.connection_closed();
        probe.frame_received(100);
        probe.frame_received(28);
        probe.corrupted_frame();

        assert_eq!(probe.connects(), 2);
        assert_eq!(probe.active_connections(), 1);
        assert_eq!(probe.frames(), 2);
        assert_eq!(probe.frame_bytes(), 128);
        assert_eq!(probe.corrupted_frames(), 1);
    }
}
