use anyhow::Context;
use clap::{Parser, Subcommand};
use dashboard_core::{
    Config, EchoRequest, ResponseOrdering, ViewController, ViewState, render,
    backend::Backend,
    render::{ECHO_BUTTON, WEATHER_BUTTON, WEATHER_BUTTON_LOADING},
};
use inquire::{CustomType, InquireError, Select, Text};
use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};
use tokio::task::{self, JoinHandle};
use tracing::info;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "dashboard", version, about = "Terminal front-end for the dashboard backend")]
pub struct Cli {
    /// Backend base URL, e.g. "http://127.0.0.1:8000". Overrides the config file.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// How overlapping responses are resolved: "last-resolved" or "last-issued".
    #[arg(long, global = true)]
    pub ordering: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the page (user list) and print it. The default.
    Show,

    /// Fetch the user list and print the page.
    Users,

    /// Fetch the Omsk weather and print the page.
    Weather,

    /// Round-trip a message through the echo endpoint and print the page.
    Echo {
        /// Message to send instead of the default greeting.
        #[arg(long)]
        message: Option<String>,
    },

    /// Ask the backend whether it is up.
    Health,

    /// Keep the page open and press its buttons from a menu.
    Interactive,

    /// Edit the stored configuration.
    Configure,
}

impl Cli {
    pub async fn run(mut self) -> anyhow::Result<()> {
        match self.command.take().unwrap_or(Command::Show) {
            Command::Configure => configure(),
            Command::Health => health(&self.config()?).await,
            Command::Interactive => interactive(self.view()?).await,
            Command::Show => show(self.view()?, |view| {
                view.mount();
            })
            .await,
            Command::Users => show(self.view()?, ViewController::fetch_users).await,
            Command::Weather => show(self.view()?, ViewController::fetch_weather).await,
            Command::Echo { message: Some(message) } => {
                show(self.view()?, move |view| view.echo(EchoRequest::new(message))).await
            }
            Command::Echo { message: None } => {
                show(self.view()?, ViewController::test_echo).await
            }
        }
    }

    /// Stored config with command-line overrides applied.
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load()?;
        if let Some(url) = &self.base_url {
            config.set_base_url(url)?;
        }
        if let Some(ordering) = &self.ordering {
            config.ordering = ResponseOrdering::try_from(ordering.as_str())?;
        }
        info!(base_url = %config.base_url, "using backend");
        Ok(config)
    }

    fn view(&self) -> anyhow::Result<ViewController> {
        let config = self.config()?;
        let backend: Arc<dyn Backend> = Arc::new(config.backend()?);
        let view = ViewController::new(backend).with_ordering(config.ordering);
        info!(ordering = %view.ordering(), "view ready");
        Ok(view)
    }
}

/// Press one button, wait for the response and print the page once.
async fn show(
    mut view: ViewController,
    click: impl FnOnce(&mut ViewController),
) -> anyhow::Result<()> {
    click(&mut view);
    view.settle_all().await;
    print!("{}", render(view.state()));
    Ok(())
}

async fn health(config: &Config) -> anyhow::Result<()> {
    let backend = config.backend()?;
    let status = backend
        .health()
        .await
        .with_context(|| format!("Backend at {} is not reachable", backend.base_url()))?;
    println!("{}: ok={}", backend.base_url(), status.ok);
    Ok(())
}

/// One entry of the interactive menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Button {
    Weather { enabled: bool },
    Echo,
    Quit,
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Weather { enabled: true } => f.write_str(WEATHER_BUTTON),
            Button::Weather { enabled: false } => {
                write!(f, "{WEATHER_BUTTON_LOADING} (disabled)")
            }
            Button::Echo => f.write_str(ECHO_BUTTON),
            Button::Quit => f.write_str("Выход"),
        }
    }
}

fn buttons(state: &ViewState) -> Vec<Button> {
    vec![
        Button::Weather { enabled: state.weather_button_enabled() },
        Button::Echo,
        Button::Quit,
    ]
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Acts on a menu choice. The weather button is checked against the current
/// state, not the label it had when the menu was drawn.
fn press(view: &mut ViewController, button: Button) -> Flow {
    match button {
        Button::Weather { .. } if !view.state().weather_button_enabled() => {
            info!("weather button is disabled while loading");
        }
        Button::Weather { .. } => view.fetch_weather(),
        Button::Echo => view.test_echo(),
        Button::Quit => return Flow::Quit,
    }
    Flow::Continue
}

/// Prints the page with CRLF line ends so it stays aligned while a prompt
/// holds the terminal in raw mode.
fn print_page(view: &ViewController) {
    print!("{}", render(view.state()).replace('\n', "\r\n"));
    let _ = io::stdout().flush();
}

fn spawn_menu(view: &ViewController) -> JoinHandle<Result<Button, InquireError>> {
    let options = buttons(view.state());
    task::spawn_blocking(move || Select::new("Нажмите кнопку:", options).prompt())
}

enum MenuEvent {
    Picked(Result<Button, InquireError>),
    Settled(bool),
}

/// Keeps the menu open while requests run. Every settled response redraws the
/// page, and new clicks can be made before earlier ones return.
async fn interactive(mut view: ViewController) -> anyhow::Result<()> {
    view.mount();
    print_page(&view);
    let mut menu = spawn_menu(&view);

    loop {
        let event = tokio::select! {
            picked = &mut menu => MenuEvent::Picked(picked.context("Menu prompt panicked")?),
            Some(changed) = view.next_settled() => MenuEvent::Settled(changed),
        };

        match event {
            MenuEvent::Picked(Ok(button)) => {
                if press(&mut view, button) == Flow::Quit {
                    break;
                }
                print_page(&view);
                menu = spawn_menu(&view);
            }
            MenuEvent::Picked(Err(
                InquireError::OperationCanceled | InquireError::OperationInterrupted,
            )) => break,
            MenuEvent::Picked(Err(e)) => return Err(e).context("Menu prompt failed"),
            MenuEvent::Settled(true) => print_page(&view),
            MenuEvent::Settled(false) => {}
        }
    }

    Ok(())
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let url = Text::new("Backend base URL:")
        .with_default(&config.base_url)
        .prompt()
        .context("Configuration aborted")?;
    config.set_base_url(&url)?;

    config.timeout_secs = CustomType::<u64>::new("Request timeout (seconds):")
        .with_default(config.timeout_secs)
        .with_error_message("Please enter a whole number of seconds")
        .prompt()
        .context("Configuration aborted")?;

    let current = ResponseOrdering::all()
        .iter()
        .position(|o| *o == config.ordering)
        .unwrap_or(0);
    config.ordering = Select::new("Overlapping responses:", ResponseOrdering::all().to_vec())
        .with_starting_cursor(current)
        .prompt()
        .context("Configuration aborted")?;

    let path = config.save()?;
    println!("Saved configuration to {}", path.display());

    Ok(())
}
