mod common;
mod device_controller;
mod driver;
mod entity;
mod http_server;

use std::error::Error;

use actix_web::web;
use dotenv::dotenv;

use common::logger::init_logger;
use common::setting::Settings;
use device_controller::device_factory::make_registry;

const LOG_TAG: &str = "main";

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // ENV may come from a .env file
    dotenv().ok();

    let settings = Settings::load()?;

    init_logger(settings.log_level())?;
    info!(LOG_TAG, "settings loaded, env: {}", settings.env.env);
    debug!(LOG_TAG, "settings: {:?}", settings);

    let registry = match make_registry(&settings).await {
        Ok(registry) => {
            info!(LOG_TAG, "{} device(s) registered", registry.len());
            web::Data::new(registry)
        }
        Err(e) => {
            error!(LOG_TAG, "cannot start device: {}", e);
            return Err(e.into());
        }
    };

    let served = http_server::server::run(&settings.web, registry.clone()).await;

    info!(LOG_TAG, "http server stopped, closing devices");
    registry.close_all().await;
    served?;
    Ok(())
}
