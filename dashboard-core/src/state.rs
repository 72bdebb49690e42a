//! View state and the only function allowed to change it.

use crate::model::{User, WeatherData};

/// Everything the page needs to render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// As returned by the backend, never reordered.
    pub users: Vec<User>,

    /// `None` until the first successful weather fetch.
    pub weather: Option<WeatherData>,

    /// True only while a weather request is outstanding.
    pub loading: bool,

    /// Last echo response, pretty-printed. Empty until one arrives.
    pub message: String,
}

impl ViewState {
    pub fn weather_button_enabled(&self) -> bool {
        !self.loading
    }
}

/// State transitions.
///
/// `*Did*` variants are results sent back by spawned requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    UsersDidLoad(Vec<User>),
    UsersDidError(String),

    WeatherFetch,
    WeatherDidLoad(WeatherData),
    WeatherDidError(String),

    EchoDidLoad(String),
    EchoDidError(String),
}

impl Action {
    /// Short form for log lines; data-heavy variants are abbreviated.
    pub fn summary(&self) -> String {
        match self {
            Action::UsersDidLoad(users) => format!("UsersDidLoad({} users)", users.len()),
            Action::WeatherDidLoad(data) => format!(
                "WeatherDidLoad {{ city: {}, temp: {} }}",
                data.city, data.current.temperature_2m
            ),
            Action::EchoDidLoad(text) => format!("EchoDidLoad({} bytes)", text.len()),
            _ => format!("{self:?}"),
        }
    }
}

/// Applies `action` to `state`. Returns `true` if the page would look different.
///
/// Failures never touch data that is already on screen.
pub fn reduce(state: &mut ViewState, action: Action) -> bool {
    match action {
        Action::UsersDidLoad(users) => {
            if state.users == users {
                return false;
            }
            state.users = users;
            true
        }
        Action::UsersDidError(_) => false,

        Action::WeatherFetch => {
            let changed = !state.loading;
            state.loading = true;
            changed
        }
        Action::WeatherDidLoad(data) => {
            state.weather = Some(data);
            state.loading = false;
            true
        }
        Action::WeatherDidError(_) => {
            let changed = state.loading;
            state.loading = false;
            changed
        }

        Action::EchoDidLoad(text) => {
            if state.message == text {
                return false;
            }
            state.message = text;
            true
        }
        Action::EchoDidError(_) => false,
    }
}
