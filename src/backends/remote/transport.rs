// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Frame transport seam between the proxy and the network.
//!
//! Channels do no retrying of their own. Retry policy belongs to the proxy.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::errors::ServiceError;
use crate::proto::{Frame, XTalkCodec};

/// An open, bidirectional frame stream to one service.
#[async_trait]
pub trait FrameChannel: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), ServiceError>;

    /// Next frame from the peer. A clean close is [`ServiceError::ConnectionLost`].
    async fn recv(&mut self) -> Result<Frame, ServiceError>;

    /// Wait up to `within` for the peer to close its side. True if it did.
    async fn wait_closed(&mut self, within: Duration) -> bool;

    async fn close(&mut self);
}

/// Opens channels to `host:port`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn FrameChannel>, ServiceError>;
}

/// Plain TCP carrying XTalk-framed documents.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn FrameChannel>, ServiceError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ServiceError::Timeout(self.connect_timeout))??;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpChannel {
            framed: Framed::new(stream, XTalkCodec::new()),
        }))
    }
}

pub struct TcpChannel {
    framed: Framed<TcpStream, XTalkCodec>,
}

#[async_trait]
impl FrameChannel for TcpChannel {
    async fn send(&mut self, frame: Frame) -> Result<(), ServiceError> {
        self.framed.send(frame).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame, ServiceError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(e.into()),
            None => Err(ServiceError::ConnectionLost),
        }
    }

    async fn wait_closed(&mut self, within: Duration) -> bool {
        let closed = async {
            loop {
                match self.framed.next().await {
                    None | Some(Err(_)) => return,
                    // Late replies after shutdown are dropped.
                    Some(Ok(_)) => continue,
                }
            }
        };
        tokio::time::timeout(within, closed).await.is_ok()
    }

    async fn close(&mut self) {
        let _ = self.framed.get_mut().shutdown().await;
    }
}
