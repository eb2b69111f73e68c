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

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, trace, warn};

use crate::message::{BatchConsumer, RecordBatch, StopIteration};
use crate::network::{
    Connection, ConnectionRegistry, FragmentedBuffer, ProduceAck, RequestFrame, ServerProbe,
};
use crate::utils::{deadline_after, with_deadline};
use crate::{AppError, AppResult};

use super::{ReaderConfig, ServerConfig, Shutdown};

/// Checks every batch of a produce request and sums it up into the ack.
#[derive(Debug, Default)]
struct AckCollector {
    ack: ProduceAck,
}

impl BatchConsumer for AckCollector {
    type Output = ProduceAck;

    async fn consume(&mut self, batch: RecordBatch) -> AppResult<StopIteration> {
        batch.validate()?;
        if batch.base_offset() <= self.ack.last_offset && self.ack.batch_count > 0 {
            return Err(AppError::CorruptMessage(format!(
                "batch at offset {} does not follow offset {}",
                batch.base_offset(),
                self.ack.last_offset
            )));
        }
        self.ack.batch_count += 1;
        self.ack.record_count += batch.record_count() as u32;
        self.ack.last_offset = batch.last_offset();
        Ok(StopIteration::No)
    }

    fn end_of_stream(self) -> ProduceAck {
        self.ack
    }
}

fn is_corruption(error: &AppError) -> bool {
    matches!(
        error,
        AppError::ChecksumMismatch { .. }
            | AppError::CorruptMessage(_)
            | AppError::MessageTooLarge(_)
            | AppError::ShortRead { .. }
    )
}

// handler for each connection
struct ConnectionHandler {
    notify_shutdown: broadcast::Sender<()>,
    connection: Connection,
    probe: Arc<ServerProbe>,
    max_frame_size: usize,
    reader_config: ReaderConfig,
    // dropped last, after the connection left the registry
    _shutdown_complete_tx: mpsc::Sender<()>,
}

impl ConnectionHandler {
    async fn handle_connection(&mut self) -> AppResult<()> {
        let mut shutdown = Shutdown::new(self.notify_shutdown.subscribe());
        loop {
            // a client idle for longer than the frame timeout is dropped as well
            let read_deadline = deadline_after(self.reader_config.frame_read_timeout());
            let read = tokio::select! {
                res = with_deadline(
                    read_deadline,
                    RequestFrame::read_from(self.connection.input(), self.max_frame_size),
                ) => res.and_then(|frame| frame),
                _ = shutdown.recv() => {
                    debug!("connection handler exit read loop after recv shutdown signal");
                    return Ok(());
                }
            };

            let frame = match read {
                Ok(Some(frame)) => frame,
                // client close the connection gracefully
                Ok(None) => break,
                Err(e) => {
                    if is_corruption(&e) {
                        self.probe.corrupted_frame();
                    }
                    return Err(e);
                }
            };
            let correlation_id = frame.header.correlation_id;
            self.probe.frame_received(frame.header.size as usize);

            let mut reader = frame.into_batch_reader();
            let load_deadline = deadline_after(self.reader_config.load_timeout());
            let ack = match reader.consume(AckCollector::default(), load_deadline).await {
                Ok(ack) => ack,
                Err(e) => {
                    if is_corruption(&e) {
                        self.probe.corrupted_frame();
                    }
                    return Err(e);
                }
            };
            trace!(
                "connection {} frame {} acked: {:?}",
                self.connection.id(),
                correlation_id,
                ack
            );

            let response = RequestFrame::encode(correlation_id, FragmentedBuffer::from(ack.encode()))?;
            self.connection.write(response).await?;
            self.connection.flush().await?;
        }
        debug!("connection handler exit read loop");
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        debug!("connection handler dropped");
    }
}

pub struct Server {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    registry: ConnectionRegistry,
    probe: Arc<ServerProbe>,
    config: ServerConfig,
}

impl Server {
    pub fn new(
        listener: TcpListener,
        config: ServerConfig,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        Server {
            listener,
            limit_connections: Arc::new(Semaphore::new(config.network.max_connection)),
            notify_shutdown,
            shutdown_complete_tx,
            registry: ConnectionRegistry::new(),
            probe: Arc::new(ServerProbe::new()),
            config,
        }
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    pub fn probe(&self) -> Arc<ServerProbe> {
        self.probe.clone()
    }

    /// Accepts connections until accepting fails for good.
    ///
    /// Every connection holds a permit of the connection limit and runs its own
    /// handler task. A handler that fails shuts its socket down. Graceful
    /// shutdown: the caller stops polling this future and broadcasts on
    /// `notify_shutdown`, handlers stop reading new frames once the frame in
    /// flight is answered, and the last handler to go drops the last
    /// `shutdown_complete_tx`.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> AppResult<()> {
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::IllegalStateError(format!("connection limit: {}", e)))?;

            let (socket, addr) = self.accept().await?;
            debug!("accept new connection from {}", addr);

            let connection = match Connection::new(
                self.registry.clone(),
                socket,
                addr,
                self.probe.clone(),
                &self.config.network,
            ) {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("failed to set up connection from {}: {}", addr, e);
                    continue;
                }
            };

            let mut handler = ConnectionHandler {
                notify_shutdown: self.notify_shutdown.clone(),
                connection,
                probe: self.probe.clone(),
                max_frame_size: self.config.network.max_frame_size,
                reader_config: self.config.reader.clone(),
                _shutdown_complete_tx: self.shutdown_complete_tx.clone(),
            };

            tokio::spawn(async move {
                if let Err(err) = handler.handle_connection().await {
                    let (id, addr) = (handler.connection.id(), handler.connection.addr());
                    if err.is_timeout() {
                        warn!("connection {} from {} timed out: {}", id, addr, err);
                    } else {
                        error!("connection {} from {} error: {}", id, addr, err);
                    }
                    handler.connection.shutdown();
                }
                // whether gracefully or unexpectedly closed, release connection
                drop(permit);
            });
        }
    }

    async fn accept(&self) -> AppResult<(TcpStream, SocketAddr)> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return Ok(accepted),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::Accept(format!(
                            "accept tcp server error: {}",
                            err
                        )));
                    }
                    warn!("accept failed, retry in {}s: {}", backoff, err);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("tcp server dropped");
    }
}
