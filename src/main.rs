mod ads_client;
mod auth;
mod config;
mod dashboard;
mod error;
mod query;
mod runner;
mod secrets;
mod server;
mod storage;

use ads_client::GoogleAdsConnector;
use clap::{Parser, Subcommand};
use config::Config;
use error::Error;
use log::{error, info};
use reqwest::Client;
use secrets::SecretManagerClient;
use server::AppState;
use std::path::PathBuf;
use storage::{BlobStore, GcsBlobStore, LocalBlobStore};

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one Google Ads ingestion and exit
    Run,

    /// Serve the HTTP trigger; every request runs one ingestion
    Serve {
        #[arg(long, default_value_t = 8080, env = "PORT")]
        port: u16,
    },

    /// Print the latest version of a secret from the configured project
    Secret { name: String },

    /// Generate the Looker Studio dashboard configuration
    DashboardConfig {
        #[arg(long, default_value = dashboard::DEFAULT_OUTPUT)]
        output: PathBuf,
    },
}

fn build_state(config: Config) -> AppState {
    let http = Client::new();

    let secrets = SecretManagerClient::new(
        http.clone(),
        &config.endpoints.secret_manager_url,
        auth::token_source(&config, &http),
    );
    let ads = GoogleAdsConnector::new(http.clone(), &config);
    let store: Box<dyn BlobStore> = match &config.local_dir {
        Some(dir) => Box::new(LocalBlobStore::new(dir)),
        None => Box::new(GcsBlobStore::new(
            http.clone(),
            &config.endpoints.storage_url,
            auth::token_source(&config, &http),
        )),
    };

    AppState {
        config,
        secrets: Box::new(secrets),
        ads: Box::new(ads),
        store,
    }
}

fn log_sources(config: &Config) {
    for source in config.data_sources() {
        info!(
            "Source {}: enabled={}, schedule='{}', gcs_path={}",
            source.name, source.enabled, source.schedule, source.gcs_path
        );
    }
    info!(
        "Raw data bucket: {}, function logs bucket: {}",
        config.raw_data_bucket, config.function_logs_bucket
    );
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match args.command {
        Command::Run => {
            log_sources(&args.config);
            let state = build_state(args.config);
            let result = runner::Ingestion::new(
                &state.config,
                state.secrets.as_ref(),
                state.ads.as_ref(),
                state.store.as_ref(),
            )
            .run()
            .await;

            println!("{}", result.message());
            if result.status_code() != 200 {
                error!("Run failed after {:.2}s", result.elapsed_secs());
                std::process::exit(1);
            }
        }
        Command::Serve { port } => {
            log_sources(&args.config);
            if let Err(err) = server::serve(build_state(args.config), port).await {
                error!("server stopped: {}", err);
                std::process::exit(1);
            }
        }
        Command::Secret { name } => {
            let state = build_state(args.config);
            match state.secrets.fetch(&name, &state.config.project_id).await {
                Ok(value) => println!("{}", value),
                Err(err) => {
                    error!("failed to fetch secret: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Command::DashboardConfig { output } => {
            let http = Client::new();
            let bigquery = dashboard::BigQueryClient::new(
                http.clone(),
                &args.config.endpoints.bigquery_url,
                auth::token_source(&args.config, &http),
            );
            dashboard::list_dataset_tables(&bigquery, &args.config).await;

            if let Err(err) = dashboard::write_dashboard_config(&args.config, &output) {
                error!("failed to write dashboard configuration: {}", err);
                std::process::exit(1);
            }
            dashboard::log_setup_instructions(&args.config);
        }
    };

    Ok(())
}
