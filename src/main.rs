use std::{fs, path::Path};

use clap::Parser;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;

mod models;
mod repositories;
pub mod services;
pub mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Overrides `server.listen` from the config file.
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs)?;

    let mut settings = settings::Settings::load(&args.config)?;
    if let Some(listen) = args.listen {
        settings.server.listen = listen;
    }
    log::debug!("Loaded {:?} {:?} from {}.", settings.server, settings.auth, args.config);

    let conn = PgPoolOptions::new()
        .max_connections(settings.postgres.max_connections)
        .acquire_timeout(settings.store.timeout())
        .connect(&settings.postgres.url)
        .await
        .map_err(|e| anyhow::anyhow!("Could not connect to database: {}", e))?;

    sqlx::migrate!("./migrations")
        .run(&conn)
        .await
        .map_err(|e| anyhow::anyhow!("Could not run migrations: {}", e))?;

    log::info!("Starting services.");
    services::start_services(conn, settings).await
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
