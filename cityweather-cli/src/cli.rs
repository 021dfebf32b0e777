use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use cityweather_core::{
    CityId, Config, JsonFileStore, LocalStore, OperationClient, OperationExecutor, OperationResult,
    Scope, Submission, TaskCoordinator, WeatherFetcher, fetcher::fetcher_from_config,
};
use inquire::{Password, PasswordDisplayMode};
use tokio::runtime::Handle;
use tracing::info;

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "Current weather and forecasts for your cities")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides it.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeatherMap API key.
    Configure,

    /// Show the stored current weather of every city.
    List,

    /// Refresh current weather of every city.
    Refresh,

    /// Show the forecast of one city.
    Forecast {
        /// OpenWeatherMap city id, as shown by `list`.
        city_id: CityId,

        /// Fetch a fresh forecast before showing it.
        #[arg(long)]
        refresh: bool,
    },

    /// Add a city by name.
    Add {
        /// City name, e.g. "Oslo" or "London,GB".
        name: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::List => {
                let store = open_store(&Config::load()?)?;
                print_current(&*store)
            }
            Command::Refresh => {
                let session = Session::open()?;
                let result = session.run("refresh", |client| client.refresh_all()).await?;
                println!("{}", render::result_message(&result));
                print_current(&*session.store)
            }
            Command::Forecast { city_id, refresh } => {
                let config = Config::load()?;
                let store = if refresh {
                    let session = Session::with_config(&config)?;
                    let result = session
                        .run("forecast", |client| client.refresh_forecast(city_id))
                        .await?;
                    println!("{}", render::result_message(&result));
                    session.store
                } else {
                    open_store(&config)?
                };
                let stored = store.read(Scope::Forecast(city_id))?;
                print!("{}", render::forecast(city_id, &stored));
                Ok(())
            }
            Command::Add { name } => {
                let session = Session::open()?;
                let result = session.run("add-city", |client| client.add_city(name)).await?;
                println!("{}", render::result_message(&result));
                if result.code.is_success() {
                    print_current(&*session.store)?;
                }
                Ok(())
            }
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeatherMap API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Get one at https://openweathermap.org/appid")
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    config.set_api_key(api_key.trim().to_string());
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<JsonFileStore>> {
    let path = config.data_file_path()?;
    let store = JsonFileStore::open(&path)
        .with_context(|| format!("Failed to open weather store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn print_current(store: &dyn LocalStore) -> Result<()> {
    let stored = store.read(Scope::Current)?;
    print!("{}", render::current(&stored));
    Ok(())
}

/// Store plus a running coordinator for one command invocation.
struct Session {
    store: Arc<JsonFileStore>,
    coordinator: TaskCoordinator,
}

impl Session {
    fn open() -> Result<Self> {
        Self::with_config(&Config::load()?)
    }

    fn with_config(config: &Config) -> Result<Self> {
        let fetcher: Arc<dyn WeatherFetcher> = Arc::from(fetcher_from_config(config)?);
        let store = open_store(config)?;
        let executor = Arc::new(OperationExecutor::new(store.clone(), fetcher));
        let coordinator = TaskCoordinator::new(executor, Handle::current());

        Ok(Self { store, coordinator })
    }

    /// Submit one operation, wait for its result and for the coordinator to go idle.
    async fn run(
        &self,
        listener: &str,
        submit: impl FnOnce(&OperationClient) -> Submission,
    ) -> Result<OperationResult> {
        let (client, mut results) = OperationClient::new(self.coordinator.clone(), listener);
        let submission = submit(&client);
        info!(?submission, listener, "operation submitted");

        let result = results
            .recv()
            .await
            .ok_or_else(|| anyhow!("Operation finished without reporting a result"))?;

        self.coordinator.run_until_idle().await;
        Ok(result)
    }
}
