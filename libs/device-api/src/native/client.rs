//! Native API client

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};

use crate::error::ApiError;
use crate::native::frame::{Frame, NativeCodec};
use crate::native::noise;
use crate::native::messages::{
    msg_type, ConnectRequest, ConnectResponse, Empty, GetTimeResponse, HelloRequest,
    HelloResponse, SubscribeLogsRequest, SubscribeLogsResponse, API_VERSION_MAJOR,
    API_VERSION_MINOR,
};
use crate::{DeviceApiClient, LogCallback, LogEntry, LogLevel};

/// Client tuning
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Name announced in the hello handshake
    pub client_info: String,

    /// Timeout for TCP connect and each handshake response
    pub connect_timeout: Duration,

    /// Silence after which a ping is sent; a second silent period closes the
    /// connection
    pub keepalive: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_info: format!("esplogger {}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(10),
            keepalive: Duration::from_secs(60),
        }
    }
}

type FrameStream = FramedRead<OwnedReadHalf, NativeCodec>;
type SharedWriter = Arc<Mutex<FramedWrite<OwnedWriteHalf, NativeCodec>>>;
type SharedCallback = Arc<StdMutex<Option<LogCallback>>>;

struct Connection {
    writer: SharedWriter,
    on_log: SharedCallback,
    closed_rx: Option<oneshot::Receiver<ApiError>>,
    reader_task: JoinHandle<()>,
}

/// Native API client.
///
/// Speaks the plaintext transport, or the noise transport when created with
/// [`NativeApiClient::with_noise_psk`].
pub struct NativeApiClient {
    address: String,
    password: Option<String>,
    noise_psk: Option<String>,
    options: ClientOptions,
    connection: Option<Connection>,
}

impl NativeApiClient {
    /// Create a client for `host:port`, optionally with an API password
    pub fn new(host: &str, port: u16, password: Option<String>) -> Self {
        Self {
            address: format!("{host}:{port}"),
            password,
            noise_psk: None,
            options: ClientOptions::default(),
            connection: None,
        }
    }

    /// Create a client for a device configured with a pre-shared encryption key
    pub fn with_noise_psk(host: &str, port: u16, psk: String) -> Self {
        let mut client = Self::new(host, port, None);
        client.noise_psk = Some(psk);
        client
    }

    /// Override the client tuning
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    async fn handshake(
        &self,
        reader: &mut FrameStream,
        writer: &SharedWriter,
        login: bool,
    ) -> Result<(), ApiError> {
        let hello = HelloRequest {
            client_info: self.options.client_info.clone(),
            api_version_major: API_VERSION_MAJOR,
            api_version_minor: API_VERSION_MINOR,
        };
        send(writer, msg_type::HELLO_REQUEST, &hello).await?;

        let frame = self.await_response(reader, writer, msg_type::HELLO_RESPONSE).await?;
        let hello: HelloResponse = frame.decode()?;
        if hello.api_version_major != API_VERSION_MAJOR {
            return Err(ApiError::Incompatible(format!(
                "Device API version {}.{} is not supported (expected {}.x)",
                hello.api_version_major, hello.api_version_minor, API_VERSION_MAJOR
            )));
        }
        debug!(
            "Hello from {} ({}), API {}.{}",
            hello.name, hello.server_info, hello.api_version_major, hello.api_version_minor
        );

        if login {
            let request = ConnectRequest {
                password: self.password.clone().unwrap_or_default(),
            };
            send(writer, msg_type::CONNECT_REQUEST, &request).await?;

            let frame = self.await_response(reader, writer, msg_type::CONNECT_RESPONSE).await?;
            let response: ConnectResponse = frame.decode()?;
            if response.invalid_password {
                return Err(ApiError::Connection("Invalid password".to_string()));
            }
        }

        Ok(())
    }

    /// Read frames until one of `expected` type arrives, answering pings on the way
    async fn await_response(
        &self,
        reader: &mut FrameStream,
        writer: &SharedWriter,
        expected: u32,
    ) -> Result<Frame, ApiError> {
        loop {
            let frame = tokio::time::timeout(self.options.connect_timeout, next_frame(reader))
                .await
                .map_err(|_| {
                    ApiError::Connection(format!("Timeout waiting for message type {expected}"))
                })??;

            match frame.msg_type {
                t if t == expected => return Ok(frame),
                msg_type::PING_REQUEST => {
                    send(writer, msg_type::PING_RESPONSE, &Empty {}).await?;
                }
                msg_type::DISCONNECT_REQUEST => {
                    let _ = send(writer, msg_type::DISCONNECT_RESPONSE, &Empty {}).await;
                    return Err(ApiError::Connection(
                        "Device closed the connection during handshake".to_string(),
                    ));
                }
                other => trace!("Ignoring message type {} during handshake", other),
            }
        }
    }
}

#[async_trait]
impl DeviceApiClient for NativeApiClient {
    async fn connect(&mut self, login: bool) -> Result<(), ApiError> {
        if self.connection.is_some() {
            return Err(ApiError::Connection(format!("Already connected to {}", self.address)));
        }
        let psk = self.noise_psk.as_deref().map(noise::decode_psk).transpose()?;

        let stream = tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| ApiError::Connection(format!("Timeout connecting to {}", self.address)))??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (mut reader, writer) = match psk {
            Some(psk) => {
                noise::handshake(read_half, write_half, &psk, self.options.connect_timeout).await?
            }
            None => (
                FramedRead::new(read_half, NativeCodec::plaintext()),
                FramedWrite::new(write_half, NativeCodec::plaintext()),
            ),
        };
        let writer = Arc::new(Mutex::new(writer));

        self.handshake(&mut reader, &writer, login).await?;

        let on_log: SharedCallback = Arc::new(StdMutex::new(None));
        let (closed_tx, closed_rx) = oneshot::channel();
        let reader_task = tokio::spawn(read_loop(
            reader,
            writer.clone(),
            on_log.clone(),
            self.options.keepalive,
            closed_tx,
        ));

        self.connection = Some(Connection {
            writer,
            on_log,
            closed_rx: Some(closed_rx),
            reader_task,
        });
        Ok(())
    }

    async fn subscribe_logs(&mut self, on_log: LogCallback, level: LogLevel) -> Result<(), ApiError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| ApiError::Connection("Not connected".to_string()))?;

        *connection.on_log.lock().unwrap_or_else(|e| e.into_inner()) = Some(on_log);

        let request = SubscribeLogsRequest {
            level: level as i32,
            dump_config: false,
        };
        send(&connection.writer, msg_type::SUBSCRIBE_LOGS_REQUEST, &request).await
    }

    async fn closed(&mut self) -> ApiError {
        let Some(connection) = self.connection.as_mut() else {
            return ApiError::Connection("Not connected".to_string());
        };
        let Some(closed_rx) = connection.closed_rx.take() else {
            return ApiError::Connection("Connection already closed".to_string());
        };
        closed_rx
            .await
            .unwrap_or_else(|_| ApiError::Connection("Connection reader stopped".to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), ApiError> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        let result = send(&connection.writer, msg_type::DISCONNECT_REQUEST, &Empty {}).await;
        connection.reader_task.abort();
        if let Ok(mut writer) = connection.writer.try_lock() {
            let _ = writer.close().await;
        }
        result
    }
}

impl Drop for NativeApiClient {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader_task.abort();
        }
    }
}

async fn send<M: Message>(writer: &SharedWriter, msg_type: u32, message: &M) -> Result<(), ApiError> {
    let mut writer = writer.lock().await;
    writer.send(Frame::new(msg_type, message)).await
}

async fn next_frame(reader: &mut FrameStream) -> Result<Frame, ApiError> {
    reader
        .next()
        .await
        .unwrap_or_else(|| Err(ApiError::Connection("Connection closed by device".to_string())))
}

async fn read_loop(
    mut reader: FrameStream,
    writer: SharedWriter,
    on_log: SharedCallback,
    keepalive: Duration,
    closed_tx: oneshot::Sender<ApiError>,
) {
    let reason = read_until_closed(&mut reader, &writer, &on_log, keepalive).await;
    debug!("Native API connection ended: {}", reason);
    let _ = closed_tx.send(reason);
}

async fn read_until_closed(
    reader: &mut FrameStream,
    writer: &SharedWriter,
    on_log: &SharedCallback,
    keepalive: Duration,
) -> ApiError {
    let mut ping_outstanding = false;

    loop {
        let frame = match tokio::time::timeout(keepalive, next_frame(reader)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return e,
            Err(_) if ping_outstanding => {
                return ApiError::Connection("Ping timeout".to_string());
            }
            Err(_) => {
                if let Err(e) = send(writer, msg_type::PING_REQUEST, &Empty {}).await {
                    return e;
                }
                ping_outstanding = true;
                continue;
            }
        };
        ping_outstanding = false;

        let handled = match frame.msg_type {
            msg_type::SUBSCRIBE_LOGS_RESPONSE => {
                deliver_log(&frame, on_log);
                Ok(())
            }
            msg_type::PING_REQUEST => send(writer, msg_type::PING_RESPONSE, &Empty {}).await,
            msg_type::GET_TIME_REQUEST => {
                let epoch_seconds = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or_default();
                send(writer, msg_type::GET_TIME_RESPONSE, &GetTimeResponse { epoch_seconds }).await
            }
            msg_type::DISCONNECT_REQUEST => {
                let _ = send(writer, msg_type::DISCONNECT_RESPONSE, &Empty {}).await;
                return ApiError::Connection("Device requested disconnect".to_string());
            }
            other => {
                trace!("Ignoring message type {}", other);
                Ok(())
            }
        };

        if let Err(e) = handled {
            return e;
        }
    }
}

fn deliver_log(frame: &Frame, on_log: &SharedCallback) {
    let response: SubscribeLogsResponse = match frame.decode() {
        Ok(response) => response,
        Err(e) => {
            warn!("Dropping undecodable log entry: {}", e);
            return;
        }
    };
    let entry = LogEntry {
        level: response.level,
        message: response.message,
    };

    let slot = on_log.lock().unwrap_or_else(|e| e.into_inner());
    match slot.as_ref() {
        Some(callback) => callback(entry),
        None => warn!("Log entry received before subscription, dropping it"),
    }
}
