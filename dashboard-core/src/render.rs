//! Plain-text rendition of the page.
//!
//! Numbers are printed with `Display`, which gives the shortest form that
//! round-trips, so values appear exactly as the backend sent them.

use std::fmt::Write;

use crate::state::ViewState;

pub const TITLE: &str = "FastAPI + React App";
pub const SUBTITLE: &str = "Простое приложение с фронтендом и бэкендом на Vercel";

pub const USERS_HEADING: &str = "Пользователи";
pub const WEATHER_HEADING: &str = "Погода в Омске";
pub const ECHO_HEADING: &str = "Echo тест";

pub const WEATHER_BUTTON: &str = "Получить погоду";
pub const WEATHER_BUTTON_LOADING: &str = "Загрузка...";
pub const ECHO_BUTTON: &str = "Тестировать Echo";

/// Label of the weather button for the current state.
pub fn weather_button_label(state: &ViewState) -> &'static str {
    if state.loading {
        WEATHER_BUTTON_LOADING
    } else {
        WEATHER_BUTTON
    }
}

/// `-0.0` prints as `0`, like a JavaScript number would.
fn number(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

fn button(label: &str, enabled: bool) -> String {
    if enabled {
        format!("[ {label} ]")
    } else {
        format!("[ {label} ] (disabled)")
    }
}

pub fn render(state: &ViewState) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_page(&mut out, state);
    out
}

fn write_page(out: &mut String, state: &ViewState) -> std::fmt::Result {
    writeln!(out, "# {TITLE}")?;
    writeln!(out, "{SUBTITLE}")?;
    writeln!(out)?;

    writeln!(out, "## {USERS_HEADING}")?;
    for user in &state.users {
        writeln!(out, "+ {}", user.name)?;
        writeln!(out, "  {}", user.email)?;
    }
    writeln!(out)?;

    writeln!(out, "## {WEATHER_HEADING}")?;
    writeln!(
        out,
        "{}",
        button(weather_button_label(state), state.weather_button_enabled())
    )?;
    if let Some(weather) = &state.weather {
        let now = &weather.current;
        writeln!(out, "### {}", weather.city)?;
        writeln!(out, "Температура: {}°C", number(now.temperature_2m))?;
        writeln!(out, "Ощущается как: {}°C", number(now.apparent_temperature))?;
        writeln!(out, "Влажность: {}%", number(now.relative_humidity_2m))?;
        writeln!(out, "Скорость ветра: {} м/с", number(now.wind_speed_10m))?;
    }
    writeln!(out)?;

    writeln!(out, "## {ECHO_HEADING}")?;
    writeln!(out, "{}", button(ECHO_BUTTON, true))?;
    if !state.message.is_empty() {
        writeln!(out, "```")?;
        writeln!(out, "{}", state.message)?;
        writeln!(out, "```")?;
    }

    Ok(())
}
