//! The interactive command loop.
//!
//! One key selects one [`Command`]; each command performs at most one HTTP
//! exchange through the loop's [`Transport`], awaited to completion before the
//! next key is read. Results are rendered as a table plus the cache-status
//! summary of the response.

use std::io::{self, Write};

use thiserror::Error;
use tracing::{error, info};

use crate::api::{CAR_PATH, CARS_PATH, car_path};
use crate::client::{ClientError, Transport};
use crate::http::headers::names;
use crate::inspector;
use crate::store::Car;
use crate::{Method, Request, Response, StatusCode};

mod keys;
pub mod render;
mod resolve;

pub use keys::{KeySource, ScriptedKeys, StdinKeys};
pub use resolve::{EndpointResolver, LastIdResolver, RepositoryResolver};

/// Why a command could not complete.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("transport failure: {0}")]
    Transport(#[from] ClientError),

    #[error("{method} {target} answered {status}")]
    UnsuccessfulStatus {
        method: Method,
        target: String,
        status: StatusCode,
    },

    #[error("could not decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// An operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ListAll,
    CreateNew,
    UpdateLast,
    DeleteLast,
    GetLast,
    Exit,
    NoOp,
}

impl Command {
    /// Maps a key to its command; unknown keys become [`Command::NoOp`].
    pub fn from_key(key: char) -> Self {
        match key {
            '0' => Self::ListAll,
            '1' => Self::CreateNew,
            '2' => Self::UpdateLast,
            '3' => Self::DeleteLast,
            '4' => Self::GetLast,
            'x' => Self::Exit,
            _ => Self::NoOp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Terminated,
}

/// Drives a session: keys in, HTTP exchanges out, rendered results back.
pub struct CommandLoop<T, R, K, W> {
    transport: T,
    resolver: R,
    keys: K,
    out: W,
    state: LoopState,
}

impl<T, R, K, W> CommandLoop<T, R, K, W>
where
    T: Transport,
    R: LastIdResolver,
    K: KeySource,
    W: Write,
{
    pub fn new(transport: T, resolver: R, keys: K, out: W) -> Self {
        Self {
            transport,
            resolver,
            keys,
            out,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs until [`Command::Exit`] or until the key source runs dry.
    ///
    /// Only failures to read keys or write output end the session early;
    /// failed commands are reported and the loop carries on.
    pub async fn run(&mut self) -> io::Result<()> {
        self.out.write_all(render::MENU.as_bytes())?;
        self.out.flush()?;

        while self.state == LoopState::Running {
            let command = match self.keys.next_key().await? {
                Some(key) => Command::from_key(key),
                None => Command::Exit,
            };
            if command == Command::NoOp {
                continue;
            }

            if self.step(command).await? == LoopState::Running {
                self.out.write_all(render::MENU.as_bytes())?;
            }
            self.out.flush()?;
        }

        info!("session ended");
        Ok(())
    }

    /// Executes one command, reporting a failure instead of returning it.
    pub async fn step(&mut self, command: Command) -> io::Result<LoopState> {
        if let Err(e) = self.execute(command).await {
            error!(?command, error = %e, "command failed");
            match e {
                ConsoleError::Io(e) => return Err(e),
                e => writeln!(self.out, "error: {e}\n")?,
            }
        }
        Ok(self.state)
    }

    /// Executes one command and returns its failure, if any.
    pub async fn execute(&mut self, command: Command) -> Result<(), ConsoleError> {
        match command {
            Command::ListAll => self.list_all().await,
            Command::CreateNew => self.create_new().await,
            Command::UpdateLast => self.update_last().await,
            Command::DeleteLast => self.delete_last().await,
            Command::GetLast => self.get_last().await,
            Command::Exit => {
                self.state = LoopState::Terminated;
                Ok(())
            }
            Command::NoOp => Ok(()),
        }
    }

    /// Sends `request` and insists on a 2xx answer.
    async fn exchange(&self, request: Request) -> Result<Response, ConsoleError> {
        let method = request.method().clone();
        let target = request.target();
        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(ConsoleError::UnsuccessfulStatus {
                method,
                target,
                status: response.status(),
            });
        }
        Ok(response)
    }

    fn write_summary(&mut self, response: &Response) -> io::Result<()> {
        writeln!(self.out, "{}\n", inspector::summarize(response))
    }

    fn write_empty_notice(&mut self) -> Result<(), ConsoleError> {
        writeln!(self.out, "{}\n", render::EMPTY_REPOSITORY)?;
        Ok(())
    }

    async fn list_all(&mut self) -> Result<(), ConsoleError> {
        let response = self.exchange(Request::get(CARS_PATH)).await?;
        let cars: Vec<Car> = response.decode()?;

        self.write_summary(&response)?;
        render::table(&mut self.out, &cars)?;
        Ok(())
    }

    async fn create_new(&mut self) -> Result<(), ConsoleError> {
        let response = self.exchange(Request::new(Method::Post, CAR_PATH)).await?;
        let location = response
            .headers()
            .get(names::LOCATION)
            .unwrap_or_default()
            .to_owned();

        writeln!(self.out, "Location header: {location}")?;
        self.write_summary(&response)?;
        Ok(())
    }

    async fn update_last(&mut self) -> Result<(), ConsoleError> {
        let Some(id) = self.resolver.last_id().await? else {
            return self.write_empty_notice();
        };
        let response = self
            .exchange(Request::new(Method::Put, car_path(id)))
            .await?;

        writeln!(self.out, "Updated car {id}")?;
        self.write_summary(&response)?;
        Ok(())
    }

    async fn delete_last(&mut self) -> Result<(), ConsoleError> {
        let Some(id) = self.resolver.last_id().await? else {
            return self.write_empty_notice();
        };
        let response = self
            .exchange(Request::new(Method::Delete, car_path(id)))
            .await?;

        writeln!(self.out, "Deleted car {id}")?;
        self.write_summary(&response)?;
        Ok(())
    }

    async fn get_last(&mut self) -> Result<(), ConsoleError> {
        let Some(id) = self.resolver.last_id().await? else {
            return self.write_empty_notice();
        };
        let response = self.exchange(Request::get(car_path(id))).await?;
        let car: Car = response.decode()?;

        self.write_summary(&response)?;
        render::row(&mut self.out, &car)?;
        writeln!(self.out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};

    use super::*;

    /// Answers every request with the same status and body, counting calls.
    struct Canned {
        status: StatusCode,
        body: String,
        calls: AtomicUsize,
    }

    impl Canned {
        fn new(status: StatusCode, body: impl Into<String>) -> Self {
            Self {
                status,
                body: body.into(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for Canned {
        async fn send(&self, _request: Request) -> Result<Response, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(self.status)
                .header(names::CLIENT_CACHE, "miss")
                .header(names::LOCATION, "/api/car/1")
                .body(self.body.clone()))
        }
    }

    /// Fails every request at the transport level.
    struct Unreachable;

    impl Transport for Unreachable {
        async fn send(&self, _request: Request) -> Result<Response, ClientError> {
            Err(ClientError::Timeout {
                url: "http://127.0.0.1:9/api/cars".into(),
                timeout: std::time::Duration::from_secs(1),
            })
        }
    }

    struct Fixed(Option<u64>);

    impl LastIdResolver for Fixed {
        async fn last_id(&self) -> Result<Option<u64>, ConsoleError> {
            Ok(self.0)
        }
    }

    fn car_json(id: u64) -> String {
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        serde_json::to_string(&Car::generated(id, at)).unwrap()
    }

    fn output<T, R, K>(console: &CommandLoop<T, R, K, Vec<u8>>) -> String {
        String::from_utf8(console.out.clone()).unwrap()
    }

    const ACTIONS: [Command; 5] = [
        Command::ListAll,
        Command::CreateNew,
        Command::UpdateLast,
        Command::DeleteLast,
        Command::GetLast,
    ];

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(Command::from_key('0'), Command::ListAll);
        assert_eq!(Command::from_key('1'), Command::CreateNew);
        assert_eq!(Command::from_key('2'), Command::UpdateLast);
        assert_eq!(Command::from_key('3'), Command::DeleteLast);
        assert_eq!(Command::from_key('4'), Command::GetLast);
        assert_eq!(Command::from_key('x'), Command::Exit);
        assert_eq!(Command::from_key('X'), Command::NoOp);
        assert_eq!(Command::from_key('5'), Command::NoOp);
    }

    #[tokio::test]
    async fn only_exit_terminates() {
        let mut console = CommandLoop::new(
            Canned::new(StatusCode::Ok, "[]"),
            Fixed(None),
            ScriptedKeys::default(),
            Vec::new(),
        );
        for command in ACTIONS.into_iter().chain([Command::NoOp]) {
            assert_eq!(console.step(command).await.unwrap(), LoopState::Running);
        }
        assert_eq!(
            console.step(Command::Exit).await.unwrap(),
            LoopState::Terminated
        );
    }

    #[tokio::test]
    async fn unsuccessful_status_stops_rendering_but_not_the_loop() {
        for command in ACTIONS {
            let mut console = CommandLoop::new(
                Canned::new(StatusCode::InternalServerError, car_json(3)),
                Fixed(Some(3)),
                ScriptedKeys::default(),
                Vec::new(),
            );
            let err = console.execute(command).await.unwrap_err();
            assert!(matches!(
                err,
                ConsoleError::UnsuccessfulStatus {
                    status: StatusCode::InternalServerError,
                    ..
                }
            ));
            assert!(console.output().is_empty(), "{command:?} rendered output");
            assert_eq!(console.state(), LoopState::Running);
        }
    }

    #[tokio::test]
    async fn transport_failure_is_reported_and_session_continues() {
        for command in ACTIONS {
            let mut console = CommandLoop::new(
                Unreachable,
                Fixed(Some(3)),
                ScriptedKeys::default(),
                Vec::new(),
            );
            let state = console.step(command).await.unwrap();
            assert_eq!(state, LoopState::Running);
            let text = output(&console);
            assert!(text.starts_with("error: transport failure"), "{text}");
            assert!(!text.contains("Client:"));
        }
    }

    #[tokio::test]
    async fn empty_repository_skips_http_and_notifies_once() {
        for command in [Command::UpdateLast, Command::DeleteLast, Command::GetLast] {
            let mut console = CommandLoop::new(
                Canned::new(StatusCode::Ok, "{}"),
                Fixed(None),
                ScriptedKeys::default(),
                Vec::new(),
            );
            console.execute(command).await.unwrap();
            assert_eq!(console.transport().calls.load(Ordering::SeqCst), 0);
            assert_eq!(output(&console).matches(render::EMPTY_REPOSITORY).count(), 1);
        }
    }

    #[tokio::test]
    async fn create_prints_location_and_summary() {
        let mut console = CommandLoop::new(
            Canned::new(StatusCode::Created, car_json(1)),
            Fixed(None),
            ScriptedKeys::default(),
            Vec::new(),
        );
        console.execute(Command::CreateNew).await.unwrap();
        let text = output(&console);
        assert!(text.starts_with("Location header: /api/car/1\n"));
        assert!(text.contains("Client: miss"));
        assert!(!text.contains("Server:"));
    }

    #[tokio::test]
    async fn undecodable_body_renders_nothing() {
        let mut console = CommandLoop::new(
            Canned::new(StatusCode::Ok, "not json"),
            Fixed(Some(1)),
            ScriptedKeys::default(),
            Vec::new(),
        );
        let err = console.execute(Command::GetLast).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Decode(_)));
        assert!(console.output().is_empty());
    }

    #[tokio::test]
    async fn run_ignores_unknown_keys_and_stops_on_exit() {
        let mut console = CommandLoop::new(
            Canned::new(StatusCode::Ok, "[]"),
            Fixed(None),
            ScriptedKeys::new("q?0x1"),
            Vec::new(),
        );
        console.run().await.unwrap();
        assert_eq!(console.state(), LoopState::Terminated);
        assert_eq!(console.transport().calls.load(Ordering::SeqCst), 1);
        // Initial menu plus one after the listing; nothing after exit.
        assert_eq!(output(&console).matches("Press x to exit").count(), 2);
        assert_eq!(console.keys.remaining(), 1);
    }

    #[tokio::test]
    async fn exhausted_input_ends_the_session() {
        let mut console = CommandLoop::new(
            Canned::new(StatusCode::Ok, "[]"),
            Fixed(None),
            ScriptedKeys::new("0"),
            Vec::new(),
        );
        console.run().await.unwrap();
        assert_eq!(console.state(), LoopState::Terminated);
    }
}
