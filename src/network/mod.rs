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

//! Network Module Implementation
//!
//! Byte level plumbing between a socket and the record batch layer.
//!
//! # Components
//!
//! - `InputStream`: buffered, cancel safe reads over any `AsyncRead`
//! - `WireSource`: checksummed reads on top of an `InputStream`
//! - `FragmentedBuffer`: multi-chunk byte sequences that are never linearized
//! - `BatchedOutputStream`: coalesces outgoing `ScatteredMessage`s
//! - `Connection`: one accepted socket, registered for its whole lifetime
//! - `RequestFrame`: the checksummed frame codec the server speaks

pub use chunk::{ChunkTracker, StreamChunk};
pub use connection::Connection;
pub use fragbuf::{FragmentedBuffer, FragmentedReader};
pub use frame::{FrameHeader, ProduceAck, RequestFrame, FRAME_HEADER_SIZE};
pub use input_stream::{ConsumeSignal, InputStream, StreamConsumer};
pub use output_stream::{BatchedOutputStream, ScatteredMessage};
pub use probe::ServerProbe;
pub use registry::ConnectionRegistry;
pub use wire_source::WireSource;

mod chunk;
mod connection;
mod fragbuf;
mod frame;
pub(crate) mod input_stream;
mod output_stream;
mod probe;
mod registry;
mod wire_source;
