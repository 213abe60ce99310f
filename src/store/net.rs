use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{MailError, Result};
use crate::session;

/// Byte stream to a mail server, plain or TLS-wrapped.
pub trait MailStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Debug> MailStream for T {}

pub type BoxedStream = Box<dyn MailStream>;

/// Runs `future`, failing with `Timeout` once `limit` elapses. No limit means wait forever.
pub async fn within<T, F>(limit: Option<Duration>, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| MailError::Timeout(format!("{} after {:?}", what, limit)))?,
        None => future.await,
    }
}

// Establish a connection to the server, TLS-encrypted when asked to
pub async fn connect_to_server(
    server: &str,
    port: u16,
    tls: bool,
    connect_timeout: Option<Duration>,
) -> Result<BoxedStream> {
    let connect = async {
        let tcp_stream = TcpStream::connect((server, port))
            .await
            .map_err(|e| MailError::Connection(format!("{}:{}: {}", server, port, e)))?;
        if !tls {
            return Ok(Box::new(tcp_stream) as BoxedStream);
        }
        let tls = tokio_native_tls::TlsConnector::from(session::tls_connector()?);
        let tls_stream = tls
            .connect(server, tcp_stream)
            .await
            .map_err(|e| MailError::Connection(format!("TLS handshake with {}: {}", server, e)))?;
        debug!("-- TLS established with {}", server);
        Ok(Box::new(tls_stream) as BoxedStream)
    };

    let stream = within(connect_timeout, "connect", connect).await?;
    info!("-- connected to {}:{}", server, port);
    Ok(stream)
}
