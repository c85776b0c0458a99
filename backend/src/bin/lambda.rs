use std::time::Duration;
use vjepa_backend::auth::ApiAuth;
use vjepa_backend::lambda::{LambdaHandler, RuntimeClient};
use vjepa_backend::model::{self, ModelHandle};
use vjepa_backend::{AnalysisService, Deployment, load_settings, logging};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let settings = load_settings();
    logging::init(settings.as_ref().map_or("info", |s| s.server.log_level.as_str()));

    let runtime = match RuntimeClient::from_env() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            if let Err(report) = runtime.send_init_error(&e.to_string()).await {
                log::error!("Failed to report init error: {}", report);
            }
            std::process::exit(1);
        }
    };

    // Cold start: load once, reuse across warm invocations.
    let handle = ModelHandle::new();
    match model::load(&settings) {
        Ok(loaded) => {
            handle.install(loaded);
            log::info!("Models loaded successfully");
        }
        Err(e) => log::error!("Failed to load models: {}", e),
    }

    let service = match AnalysisService::from_settings(&settings, handle, Deployment::Serverless).await
    {
        Ok(service) => service,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            if let Err(report) = runtime.send_init_error(&e.to_string()).await {
                log::error!("Failed to report init error: {}", report);
            }
            std::process::exit(1);
        }
    };
    let handler = LambdaHandler::new(
        service,
        ApiAuth::from_settings(&settings),
        settings.server.cors.clone(),
        settings.server.max_request_bytes,
    );

    loop {
        let invocation = match runtime.next_invocation().await {
            Ok(invocation) => invocation,
            Err(e) => {
                log::error!("Failed to fetch next invocation: {}", e);
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
        };

        let response = handler.handle(invocation.payload).await;
        if let Err(e) = runtime
            .send_response(&invocation.request_id, &response)
            .await
        {
            log::error!("Failed to send response for {}: {}", invocation.request_id, e);
            if let Err(e) = runtime
                .send_error(&invocation.request_id, &e.to_string())
                .await
            {
                log::error!("Failed to report invocation error: {}", e);
            }
        }
    }
}
