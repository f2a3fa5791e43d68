use actix_web::{middleware::DefaultHeaders, web, App, HttpServer};

use super::routes;
use crate::common::setting::Web;
use crate::device_controller::device_registry::DeviceRegistry;
use crate::info;

const LOG_TAG: &str = "http server";

/// run the http server until it is stopped (ctrl-c)
pub async fn run(web_settings: &Web, registry: web::Data<DeviceRegistry>) -> std::io::Result<()> {
    info!(
        LOG_TAG,
        "http server listening on {}:{}", web_settings.web_host, web_settings.web_port
    );
    HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .wrap(DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*")))
            .configure(routes::configure)
    })
    .bind((web_settings.web_host.as_str(), web_settings.web_port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test as actix_test;

    use crate::driver::xap::dummy_transport::DummyXap;
    use crate::driver::xap::entity::DeviceType;
    use crate::driver::xap::testing::open_dummy;

    #[actix_web::test]
    async fn every_response_allows_any_origin() {
        let device = open_dummy(DummyXap::new(DeviceType::XAP800, 0, 1, 1)).await.unwrap();
        let mut registry = DeviceRegistry::new();
        registry.insert(0, device).unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(registry))
                .wrap(DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*")))
                .configure(routes::configure),
        )
        .await;

        for uri in ["/0", "/7"] {
            let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(
                resp.headers().get("Access-Control-Allow-Origin").unwrap(),
                "*",
                "{}",
                uri
            );
        }
    }
}
