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

use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::network::{
    BatchedOutputStream, ConnectionRegistry, InputStream, ScatteredMessage, ServerProbe,
};
use crate::service::NetworkConfig;
use crate::AppResult;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One accepted client socket.
///
/// Creating a connection registers it and tells the probe, dropping it undoes
/// both. Reads go through [`Connection::input`], writes are batched until
/// flushed.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    addr: SocketAddr,
    input: InputStream<OwnedReadHalf>,
    output: BatchedOutputStream<OwnedWriteHalf>,
    // second handle on the socket, lets shutdown() wake a pending read
    control: std::net::TcpStream,
    registry: ConnectionRegistry,
    probe: Arc<ServerProbe>,
}

impl Connection {
    pub fn new(
        registry: ConnectionRegistry,
        socket: TcpStream,
        addr: SocketAddr,
        probe: Arc<ServerProbe>,
        config: &NetworkConfig,
    ) -> AppResult<Connection> {
        let std_socket = socket.into_std()?;
        let control = std_socket.try_clone()?;
        let (reader, writer) = TcpStream::from_std(std_socket)?.into_split();

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        registry.register(id, addr);
        probe.connection_established();
        debug!("connection {} from {} registered", id, addr);

        Ok(Connection {
            id,
            addr,
            input: InputStream::new(reader, config.conn_read_buffer_size),
            output: BatchedOutputStream::new(writer, config.conn_write_buffer_size),
            control,
            registry,
            probe,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn input(&mut self) -> &mut InputStream<OwnedReadHalf> {
        &mut self.input
    }

    pub async fn write(&mut self, message: ScatteredMessage) -> AppResult<()> {
        self.output.write(message).await
    }

    pub async fn flush(&mut self) -> AppResult<()> {
        self.output.flush().await
    }

    /// Shuts both directions of the socket down. Pending and later reads see end
    /// of stream, writes fail. Safe to call more than once.
    pub fn shutdown(&self) {
        match self.control.shutdown(Shutdown::Both) {
            Ok(()) => debug!("connection {} to {} shut down", self.id, self.addr),
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(e) => warn!("shutting down connection {} failed: {}", self.id, e),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        self.probe.connection_closed();
        debug!("connection {} from {} closed", self.id, self.addr);
    }
}
