//! Scripted device API client

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use device_api::{ApiError, DeviceApiClient, LogCallback, LogEntry, LogLevel};
use esplogger::models::device::{AuthMode, DeviceTarget};
use esplogger::session::connector::Connector;

/// Behaviour of one connection attempt
#[derive(Debug, Clone)]
pub struct Attempt {
    pub connect: Result<(), ApiError>,
    pub subscribe: Result<(), ApiError>,
    /// Delivered once the supervisor starts waiting on the stream
    pub logs: Vec<LogEntry>,
    /// `None` keeps the stream open forever
    pub closed: Option<ApiError>,
    pub panic_on_connect: bool,
}

impl Attempt {
    pub fn streaming(logs: Vec<LogEntry>, closed: Option<ApiError>) -> Self {
        Self {
            connect: Ok(()),
            subscribe: Ok(()),
            logs,
            closed,
            panic_on_connect: false,
        }
    }

    pub fn refused(err: ApiError) -> Self {
        Self {
            connect: Err(err),
            ..Self::streaming(Vec::new(), None)
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_connect: true,
            ..Self::streaming(Vec::new(), None)
        }
    }
}

pub fn entry(level: LogLevel, message: &str) -> LogEntry {
    LogEntry {
        level: level as i32,
        message: message.as_bytes().to_vec(),
    }
}

pub fn target(name: &str) -> DeviceTarget {
    DeviceTarget {
        name: name.to_string(),
        host: format!("{name}.local"),
        port: 6053,
        auth: AuthMode::None,
    }
}

/// Calls made against scripted clients, as `<device>:<call>`
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, device: &str, call: &str) {
        self.0.lock().unwrap().push(format!("{device}:{call}"));
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    /// Poll until `entry` shows up at least `times` times
    pub async fn wait_for(&self, entry: &str, times: usize) {
        for _ in 0..500 {
            if self.count(entry) >= times {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{entry} not seen {times} time(s): {:?}", self.entries());
    }
}

pub struct ScriptedClient {
    device: String,
    attempt: Attempt,
    on_log: Option<LogCallback>,
    journal: Journal,
}

#[async_trait]
impl DeviceApiClient for ScriptedClient {
    async fn connect(&mut self, _login: bool) -> Result<(), ApiError> {
        self.journal.push(&self.device, "connect");
        if self.attempt.panic_on_connect {
            panic!("scripted panic");
        }
        self.attempt.connect.clone()
    }

    async fn subscribe_logs(&mut self, on_log: LogCallback, _level: LogLevel) -> Result<(), ApiError> {
        self.journal.push(&self.device, "subscribe");
        self.on_log = Some(on_log);
        self.attempt.subscribe.clone()
    }

    async fn closed(&mut self) -> ApiError {
        if let Some(on_log) = &self.on_log {
            for entry in self.attempt.logs.drain(..) {
                on_log(entry);
            }
        }
        self.journal.push(&self.device, "closed");
        match self.attempt.closed.clone() {
            Some(err) => err,
            None => std::future::pending::<ApiError>().await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), ApiError> {
        self.journal.push(&self.device, "disconnect");
        Ok(())
    }
}

/// Hands out scripted clients per device; unscripted attempts are refused
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<HashMap<String, VecDeque<Attempt>>>,
    client_panics: Mutex<HashMap<String, usize>>,
    journal: Journal,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, device: &str, attempts: Vec<Attempt>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(device.to_string(), attempts.into());
        self
    }

    /// Panic inside `client()` for the next `times` requests for `device`
    pub fn panic_on_client(self, device: &str, times: usize) -> Self {
        self.client_panics
            .lock()
            .unwrap()
            .insert(device.to_string(), times);
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Connector for ScriptedConnector {
    fn client(&self, target: &DeviceTarget) -> Box<dyn DeviceApiClient> {
        let should_panic = {
            let mut panics = self.client_panics.lock().unwrap();
            match panics.get_mut(&target.name) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_panic {
            self.journal.push(&target.name, "client-panic");
            panic!("connector panic for {}", target.name);
        }

        let attempt = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&target.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Attempt::refused(ApiError::Connection("Connection refused".to_string())));

        Box::new(ScriptedClient {
            device: target.name.clone(),
            attempt,
            on_log: None,
            journal: self.journal.clone(),
        })
    }
}

/// Sleep function that records delays and returns immediately
pub fn recording_sleep() -> (
    Arc<Mutex<Vec<Duration>>>,
    impl Fn(Duration) -> std::future::Ready<()> + Clone + Send + Sync + 'static,
) {
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let recorder = sleeps.clone();
    let sleep_fn = move |delay: Duration| {
        recorder.lock().unwrap().push(delay);
        std::future::ready(())
    };
    (sleeps, sleep_fn)
}
