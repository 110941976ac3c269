use micro_curl::testing::{ScriptedEngine, Step};
use micro_curl::{Curl, EngineError, EventKind, Value};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let curl = Curl::new(ScriptedEngine::new());
    info!(version = curl.version(), "engine ready");

    let urls = ["http://localhost/a", "http://localhost/b", "http://localhost/missing"];
    let mut transfers = Vec::with_capacity(urls.len());
    for url in urls {
        let mut easy = match curl.easy() {
            Ok(easy) => easy,
            Err(e) => {
                error!(cause = %e, "failed to create transfer");
                return;
            }
        };
        if let Err(e) = easy.call("setopt_url", &[Value::from(url)]) {
            error!(url, cause = %e, "failed to set url");
            return;
        }
        transfers.push((url, easy));
    }

    let engine = curl.engine();
    engine.script(transfers[0].1.id(), [Step::header("HTTP/1.1 200 OK\r\n"), Step::data("hello "), Step::data("from a"), Step::done()]);
    engine.script(transfers[1].1.id(), [Step::data("b is short"), Step::done()]);
    engine.script(transfers[2].1.id(), [Step::header("HTTP/1.1 404 Not Found\r\n"), Step::fail(EngineError::new(22, "HTTP error"))]);

    let mut multi = match curl.multi() {
        Ok(multi) => multi,
        Err(e) => {
            error!(cause = %e, "failed to create transfer set");
            return;
        }
    };
    multi.set_wait_timeout(Some(Duration::from_millis(100)));

    for (url, easy) in &transfers {
        if let Err(e) = multi.add(easy) {
            error!(url, cause = %e, "failed to add transfer");
            return;
        }
    }

    for event in multi.perform() {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                error!(cause = %e, "transfers aborted");
                return;
            }
        };

        let url = transfers.iter().find(|(_, easy)| easy.id() == event.transfer).map_or("?", |(url, _)| *url);
        match event.kind {
            EventKind::Data(chunk) => info!(url, body = %String::from_utf8_lossy(&chunk), "received data"),
            EventKind::Header(chunk) => info!(url, header = %String::from_utf8_lossy(&chunk).trim_end(), "received header"),
            EventKind::Done => info!(url, "transfer done"),
            EventKind::Error(e) => warn!(url, cause = %e, "transfer failed"),
        }
    }
}
