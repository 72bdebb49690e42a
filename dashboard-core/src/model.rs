use serde::{Deserialize, Serialize};

/// Body the echo button always sends.
pub const ECHO_GREETING: &str = "Hello from frontend!";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// `GET /api/users`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Open-Meteo style "current" block, passed through by the backend untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub apparent_temperature: f64,
    pub weather_code: i64,
    pub wind_speed_10m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherMeta {
    pub source: String,
}

/// `GET /api/weather/omsk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    pub city: String,
    pub coordinates: Coordinates,
    pub current: CurrentConditions,
    pub meta: WeatherMeta,
}

/// `POST /api/echo` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub message: String,
}

impl EchoRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl Default for EchoRequest {
    fn default() -> Self {
        Self::new(ECHO_GREETING)
    }
}

/// Whatever the echo endpoint answers with; no schema is imposed.
pub type EchoMessage = serde_json::Value;

/// `GET /api/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
}
