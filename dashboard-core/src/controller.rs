//! The view controller: owns the page state and issues the three request flows.
//!
//! A "click" spawns the request on the tokio runtime and returns at once, so
//! several requests of the same kind may be in flight together. Their results
//! come back over a channel and are applied one at a time by whoever owns the
//! controller (`next_settled` / `settle_all`). Nothing else mutates the state,
//! so no locking is involved.

use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::{
    backend::Backend,
    model::EchoRequest,
    state::{Action, ViewState, reduce},
};

/// How overlapping responses of the same kind are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseOrdering {
    /// Whichever response arrives last is shown.
    #[default]
    LastResolved,
    /// Only the most recently issued request of a kind may update the page.
    LastIssued,
}

impl ResponseOrdering {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseOrdering::LastResolved => "last-resolved",
            ResponseOrdering::LastIssued => "last-issued",
        }
    }

    pub const fn all() -> &'static [ResponseOrdering] {
        &[ResponseOrdering::LastResolved, ResponseOrdering::LastIssued]
    }
}

impl std::fmt::Display for ResponseOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ResponseOrdering {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "last-resolved" => Ok(ResponseOrdering::LastResolved),
            "last-issued" => Ok(ResponseOrdering::LastIssued),
            _ => Err(anyhow::anyhow!(
                "Unknown ordering '{value}'. Supported: last-resolved, last-issued."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Users,
    Weather,
    Echo,
}

impl RequestKind {
    fn index(self) -> usize {
        match self {
            RequestKind::Users => 0,
            RequestKind::Weather => 1,
            RequestKind::Echo => 2,
        }
    }

    /// The failure result for this kind of request.
    fn failed(self, reason: String) -> Action {
        match self {
            RequestKind::Users => Action::UsersDidError(reason),
            RequestKind::Weather => Action::WeatherDidError(reason),
            RequestKind::Echo => Action::EchoDidError(reason),
        }
    }
}

#[derive(Debug)]
struct Settled {
    kind: RequestKind,
    seq: u64,
    action: Action,
}

/// Reports a request's result exactly once, even if the task never finishes
/// normally (a panicking `Backend`), so `in_flight` always drains.
struct SettleOnDrop {
    tx: mpsc::UnboundedSender<Settled>,
    kind: RequestKind,
    seq: u64,
    sent: bool,
}

impl SettleOnDrop {
    fn send(mut self, action: Action) {
        self.sent = true;
        // Receiver gone means the view was dropped; nothing left to update.
        let _ = self.tx.send(Settled { kind: self.kind, seq: self.seq, action });
    }
}

impl Drop for SettleOnDrop {
    fn drop(&mut self) {
        if self.sent {
            return;
        }
        error!(kind = ?self.kind, seq = self.seq, "request task ended without a result");
        let action = self.kind.failed("request task aborted".to_string());
        let _ = self.tx.send(Settled { kind: self.kind, seq: self.seq, action });
    }
}

#[derive(Debug)]
pub struct ViewController {
    backend: Arc<dyn Backend>,
    state: ViewState,
    ordering: ResponseOrdering,
    tx: mpsc::UnboundedSender<Settled>,
    rx: mpsc::UnboundedReceiver<Settled>,
    // Last sequence number handed out, per kind.
    issued: [u64; 3],
    in_flight: usize,
    mounted: bool,
}

impl ViewController {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend,
            state: ViewState::default(),
            ordering: ResponseOrdering::default(),
            tx,
            rx,
            issued: [0; 3],
            in_flight: 0,
            mounted: false,
        }
    }

    pub fn with_ordering(mut self, ordering: ResponseOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn ordering(&self) -> ResponseOrdering {
        self.ordering
    }

    /// Requests issued but not yet applied.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Initial load. Issues the user fetch the first time only; returns whether it did.
    pub fn mount(&mut self) -> bool {
        if self.mounted {
            return false;
        }
        self.mounted = true;
        self.fetch_users();
        true
    }

    pub fn fetch_users(&mut self) {
        let backend = self.backend.clone();
        self.issue(RequestKind::Users, async move {
            match backend.fetch_users().await {
                Ok(body) => Action::UsersDidLoad(body.users),
                Err(e) => {
                    error!(path = e.path(), "Error fetching users: {e}");
                    Action::UsersDidError(e.to_string())
                }
            }
        });
    }

    pub fn fetch_weather(&mut self) {
        reduce(&mut self.state, Action::WeatherFetch);

        let backend = self.backend.clone();
        self.issue(RequestKind::Weather, async move {
            match backend.fetch_weather().await {
                Ok(data) => Action::WeatherDidLoad(data),
                Err(e) => {
                    error!(path = e.path(), "Error fetching weather: {e}");
                    Action::WeatherDidError(e.to_string())
                }
            }
        });
    }

    /// Sends the fixed greeting to the echo endpoint.
    pub fn test_echo(&mut self) {
        self.echo(EchoRequest::default());
    }

    pub fn echo(&mut self, request: EchoRequest) {
        let backend = self.backend.clone();
        self.issue(RequestKind::Echo, async move {
            let reply = match backend.echo(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(path = e.path(), "Error testing echo: {e}");
                    return Action::EchoDidError(e.to_string());
                }
            };
            match serde_json::to_string_pretty(&reply) {
                Ok(text) => Action::EchoDidLoad(text),
                Err(e) => {
                    error!("Error testing echo: {e}");
                    Action::EchoDidError(e.to_string())
                }
            }
        });
    }

    /// Waits for the next response and applies it.
    ///
    /// Returns `None` when nothing is in flight, otherwise whether the page changed.
    pub async fn next_settled(&mut self) -> Option<bool> {
        if self.in_flight == 0 {
            return None;
        }
        // `self.tx` keeps the channel open, so `recv` only yields `None` on shutdown.
        let settled = self.rx.recv().await?;
        self.in_flight -= 1;
        Some(self.apply(settled))
    }

    /// Applies responses until nothing is in flight. Returns whether the page changed.
    pub async fn settle_all(&mut self) -> bool {
        let mut changed = false;
        while let Some(c) = self.next_settled().await {
            changed |= c;
        }
        changed
    }

    fn issue<F>(&mut self, kind: RequestKind, request: F)
    where
        F: Future<Output = Action> + Send + 'static,
    {
        let slot = &mut self.issued[kind.index()];
        *slot += 1;
        let seq = *slot;
        self.in_flight += 1;
        debug!(?kind, seq, "request issued");

        let guard = SettleOnDrop {
            tx: self.tx.clone(),
            kind,
            seq,
            sent: false,
        };
        tokio::spawn(async move {
            let action = request.await;
            guard.send(action);
        });
    }

    fn apply(&mut self, settled: Settled) -> bool {
        let Settled { kind, seq, action } = settled;

        if self.ordering == ResponseOrdering::LastIssued && seq < self.issued[kind.index()] {
            debug!(?kind, seq, latest = self.issued[kind.index()], "dropping stale response");
            return false;
        }

        debug!(action = %action.summary(), "applying");
        reduce(&mut self.state, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FetchError,
        model::{
            Coordinates, CurrentConditions, EchoMessage, HealthStatus, User, UsersResponse,
            WeatherData, WeatherMeta,
        },
        render::render,
    };
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tokio::sync::oneshot;

    type Reply<T> = oneshot::Receiver<Result<T, FetchError>>;
    type Gate<T> = oneshot::Sender<Result<T, FetchError>>;

    /// Backend double: each call pops the next queued reply and waits on it.
    #[derive(Debug, Default)]
    struct ScriptedBackend {
        users: Mutex<VecDeque<Reply<UsersResponse>>>,
        weather: Mutex<VecDeque<Reply<WeatherData>>>,
        echo: Mutex<VecDeque<Reply<EchoMessage>>>,
        echo_requests: Mutex<Vec<EchoRequest>>,
        users_calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn gate<T>(queue: &Mutex<VecDeque<Reply<T>>>) -> Gate<T> {
            let (tx, rx) = oneshot::channel();
            queue.lock().unwrap().push_back(rx);
            tx
        }

        fn ready<T>(queue: &Mutex<VecDeque<Reply<T>>>, value: Result<T, FetchError>) {
            let _ = Self::gate(queue).send(value);
        }
    }

    async fn next_reply<T>(queue: &Mutex<VecDeque<Reply<T>>>) -> Result<T, FetchError> {
        let rx = queue.lock().unwrap().pop_front().expect("unscripted call");
        rx.await.expect("gate dropped")
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn fetch_users(&self) -> Result<UsersResponse, FetchError> {
            self.users_calls.fetch_add(1, Ordering::SeqCst);
            next_reply(&self.users).await
        }

        async fn fetch_weather(&self) -> Result<WeatherData, FetchError> {
            next_reply(&self.weather).await
        }

        async fn echo(&self, request: &EchoRequest) -> Result<EchoMessage, FetchError> {
            self.echo_requests.lock().unwrap().push(request.clone());
            next_reply(&self.echo).await
        }

        async fn health(&self) -> Result<HealthStatus, FetchError> {
            Ok(HealthStatus { ok: true })
        }
    }

    fn failure(path: &'static str) -> FetchError {
        FetchError::Status {
            path,
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        }
    }

    fn one_user() -> UsersResponse {
        UsersResponse {
            users: vec![User {
                id: 1,
                name: "A".into(),
                email: "a@x.com".into(),
            }],
        }
    }

    fn omsk(temp: f64) -> WeatherData {
        WeatherData {
            city: "Omsk".into(),
            coordinates: Coordinates { latitude: 54.9914, longitude: 73.3645 },
            current: CurrentConditions {
                temperature_2m: temp,
                relative_humidity_2m: 64.0,
                apparent_temperature: temp - 4.0,
                weather_code: 2,
                wind_speed_10m: 3.1,
            },
            meta: WeatherMeta { source: "open-meteo.com".into() },
        }
    }

    fn controller(backend: &Arc<ScriptedBackend>) -> ViewController {
        ViewController::new(backend.clone())
    }

    #[tokio::test]
    async fn mount_fetches_users_exactly_once() {
        let backend = Arc::new(ScriptedBackend::default());
        ScriptedBackend::ready(&backend.users, Ok(one_user()));
        let mut view = controller(&backend);

        assert!(view.mount());
        assert!(!view.mount());
        view.settle_all().await;

        assert_eq!(backend.users_calls.load(Ordering::SeqCst), 1);
        assert_eq!(view.state().users, one_user().users);
    }

    #[tokio::test]
    async fn users_failure_leaves_list_empty() {
        let backend = Arc::new(ScriptedBackend::default());
        ScriptedBackend::ready(&backend.users, Err(failure("/api/users")));
        let mut view = controller(&backend);

        view.mount();
        let changed = view.settle_all().await;

        assert!(!changed);
        assert!(view.state().users.is_empty());
        assert_eq!(view.in_flight(), 0);
    }

    #[tokio::test]
    async fn fetch_users_twice_renders_identically() {
        let backend = Arc::new(ScriptedBackend::default());
        ScriptedBackend::ready(&backend.users, Ok(one_user()));
        ScriptedBackend::ready(&backend.users, Ok(one_user()));
        let mut view = controller(&backend);

        view.fetch_users();
        view.settle_all().await;
        let first = render(view.state());

        view.fetch_users();
        view.settle_all().await;

        assert_eq!(render(view.state()), first);
    }

    #[tokio::test]
    async fn weather_loading_spans_the_request() {
        let backend = Arc::new(ScriptedBackend::default());
        let gate = ScriptedBackend::gate(&backend.weather);
        let mut view = controller(&backend);

        view.fetch_weather();
        assert!(view.state().loading);
        assert_eq!(view.in_flight(), 1);

        gate.send(Ok(omsk(-7.5))).unwrap();
        assert_eq!(view.next_settled().await, Some(true));

        assert!(!view.state().loading);
        assert_eq!(view.state().weather, Some(omsk(-7.5)));
    }

    #[tokio::test]
    async fn weather_failure_clears_loading_and_keeps_previous() {
        let backend = Arc::new(ScriptedBackend::default());
        ScriptedBackend::ready(&backend.weather, Ok(omsk(1.5)));
        ScriptedBackend::ready(&backend.weather, Err(failure("/api/weather/omsk")));
        let mut view = controller(&backend);

        view.fetch_weather();
        view.settle_all().await;
        view.fetch_weather();
        assert!(view.state().loading);
        view.settle_all().await;

        assert!(!view.state().loading);
        assert_eq!(view.state().weather, Some(omsk(1.5)));
    }

    #[tokio::test]
    async fn echo_sends_greeting_and_shows_pretty_reply() {
        let backend = Arc::new(ScriptedBackend::default());
        ScriptedBackend::ready(&backend.echo, Ok(json!({"message": "Hello from frontend!"})));
        let mut view = controller(&backend);

        view.test_echo();
        view.settle_all().await;

        assert_eq!(
            backend.echo_requests.lock().unwrap().as_slice(),
            &[EchoRequest::new("Hello from frontend!")]
        );
        assert_eq!(view.state().message, "{\n  \"message\": \"Hello from frontend!\"\n}");
    }

    #[tokio::test]
    async fn echo_failure_keeps_previous_message() {
        let backend = Arc::new(ScriptedBackend::default());
        ScriptedBackend::ready(&backend.echo, Ok(json!({"received": null})));
        ScriptedBackend::ready(&backend.echo, Err(failure("/api/echo")));
        let mut view = controller(&backend);

        view.test_echo();
        view.settle_all().await;
        view.test_echo();
        view.settle_all().await;

        assert_eq!(view.state().message, "{\n  \"received\": null\n}");
    }

    #[tokio::test]
    async fn echo_reply_keeps_key_order() {
        let backend = Arc::new(ScriptedBackend::default());
        let reply: EchoMessage = serde_json::from_str(r#"{"zeta": 1, "alpha": [true]}"#).unwrap();
        ScriptedBackend::ready(&backend.echo, Ok(reply));
        let mut view = controller(&backend);

        view.test_echo();
        view.settle_all().await;

        assert_eq!(
            view.state().message,
            "{\n  \"zeta\": 1,\n  \"alpha\": [\n    true\n  ]\n}"
        );
    }

    #[tokio::test]
    async fn overlapping_weather_last_resolved_wins() {
        let backend = Arc::new(ScriptedBackend::default());
        let first = ScriptedBackend::gate(&backend.weather);
        let second = ScriptedBackend::gate(&backend.weather);
        let mut view = controller(&backend);

        view.fetch_weather();
        view.fetch_weather();

        second.send(Ok(omsk(2.0))).unwrap();
        view.next_settled().await;
        first.send(Ok(omsk(1.0))).unwrap();
        view.next_settled().await;

        assert_eq!(view.state().weather, Some(omsk(1.0)));
        assert_eq!(view.in_flight(), 0);
    }

    #[tokio::test]
    async fn overlapping_weather_last_issued_drops_stale() {
        let backend = Arc::new(ScriptedBackend::default());
        let first = ScriptedBackend::gate(&backend.weather);
        let second = ScriptedBackend::gate(&backend.weather);
        let mut view = controller(&backend).with_ordering(ResponseOrdering::LastIssued);

        view.fetch_weather();
        view.fetch_weather();

        first.send(Ok(omsk(1.0))).unwrap();
        assert_eq!(view.next_settled().await, Some(false));
        assert!(view.state().loading);

        second.send(Ok(omsk(2.0))).unwrap();
        assert_eq!(view.next_settled().await, Some(true));

        assert_eq!(view.state().weather, Some(omsk(2.0)));
        assert!(!view.state().loading);
    }

    #[tokio::test]
    async fn kinds_settle_independently() {
        let backend = Arc::new(ScriptedBackend::default());
        let users = ScriptedBackend::gate(&backend.users);
        ScriptedBackend::ready(&backend.weather, Ok(omsk(0.0)));
        let mut view = controller(&backend).with_ordering(ResponseOrdering::LastIssued);

        view.mount();
        view.fetch_weather();
        view.next_settled().await;

        assert!(view.state().weather.is_some());
        assert!(view.state().users.is_empty());

        users.send(Ok(one_user())).unwrap();
        view.settle_all().await;
        assert_eq!(view.state().users.len(), 1);
    }

    #[tokio::test]
    async fn panicking_backend_still_settles() {
        let backend = Arc::new(ScriptedBackend::default());
        ScriptedBackend::ready(&backend.weather, Ok(omsk(3.0)));
        let mut view = controller(&backend);
        view.fetch_weather();
        view.settle_all().await;

        // Nothing scripted for this call: the backend panics inside the task.
        view.fetch_weather();
        assert!(view.state().loading);
        let changed = view.settle_all().await;

        assert!(changed);
        assert!(!view.state().loading);
        assert_eq!(view.in_flight(), 0);
        assert_eq!(view.state().weather, Some(omsk(3.0)));
    }

    #[tokio::test]
    async fn nothing_in_flight_settles_immediately() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut view = controller(&backend);

        assert_eq!(view.next_settled().await, None);
        assert!(!view.settle_all().await);
    }

    #[test]
    fn ordering_parses_from_str() {
        for o in ResponseOrdering::all() {
            assert_eq!(ResponseOrdering::try_from(o.as_str()).unwrap(), *o);
        }
        assert!(ResponseOrdering::try_from("first-wins").is_err());
    }
}
