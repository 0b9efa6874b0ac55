use crate::{app_state::AppState, crawler};
use actix_web::web;
use log::info;
use std::time::Duration;

/// Periodically triggers a crawl run. An interval of zero disables it.
pub fn spawn(data: web::Data<AppState>) {
    let interval = data.config.server.schedule_interval_secs;
    let run_on_startup = data.config.server.run_on_startup;

    if run_on_startup {
        info!("[scheduler] running crawl on startup");
        crawler::spawn_crawl(data.clone());
    }
    if interval == 0 {
        info!("[scheduler] disabled");
        return;
    }

    let data_clone = data.clone();
    actix_web::rt::spawn(async move {
        loop {
            // sleep between cycles
            actix_web::rt::time::sleep(Duration::from_secs(interval)).await;
            if crawler::spawn_crawl(data_clone.clone()) {
                info!("[scheduler] crawl run started");
            } else {
                info!("[scheduler] previous run still in progress, skipping cycle");
            }
        }
    });
}
