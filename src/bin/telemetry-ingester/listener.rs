use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use telemetry_ledger::{batch::BatchAggregator, sensor::RawReading};
use tokio::{
    io::{AsyncBufReadExt as _, AsyncRead, BufReader},
    net::TcpListener,
};
use tokio_stream::{StreamExt as _, wrappers::LinesStream};
use tracing::{debug, info, trace, warn};

pub async fn accept_loop(listener: TcpListener, aggregator: BatchAggregator) -> Result<()> {
    let address = listener
        .local_addr()
        .context("failed to get listener address")?;
    info!(%address, "listening for sensors");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(c) => c,
            Err(err) => {
                warn!(error = %err, "failed to accept connection");
                continue;
            }
        };

        let aggregator = aggregator.clone();
        tokio::spawn(handle_connection(stream, peer, aggregator));
    }
}

pub async fn handle_connection<S>(stream: S, peer: SocketAddr, aggregator: BatchAggregator)
where
    S: AsyncRead + Unpin,
{
    debug!(%peer, "sensor connected");

    let mut lines = LinesStream::new(BufReader::new(stream).lines());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(l) => l,
            Err(err) => {
                warn!(%peer, error = %err, "failed to read from sensor");
                break;
            }
        };

        let reading = match RawReading::decode(&line) {
            Ok(r) => r,
            Err(err) => {
                warn!(%peer, error = %err, "dropping reading");
                continue;
            }
        };

        match aggregator.append(&reading) {
            Ok(points) => trace!(
                %peer,
                sensor = %reading.name,
                measured_at = ?reading.measured_at(),
                points,
                "reading batched"
            ),
            Err(err) => debug!(%peer, error = %err, "ignoring reading from sensor not in registry"),
        }
    }

    debug!(%peer, "sensor disconnected");
}
