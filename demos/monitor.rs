use evohome_hub::{Config, EntityKind, HttpRemote, Hub, MessageLogMode, Signal};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> evohome_hub::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let username = args
        .get(1)
        .cloned()
        .or_else(|| env::var("EVOHOME_USERNAME").ok())
        .expect("usage: monitor <username> <password> [--log <file>]");
    let password = args
        .get(2)
        .cloned()
        .or_else(|| env::var("EVOHOME_PASSWORD").ok())
        .expect("usage: monitor <username> <password> [--log <file>]");
    let log_path = args
        .iter()
        .position(|a| a == "--log")
        .and_then(|i| args.get(i + 1));

    let mut remote = HttpRemote::builder(username, password);
    if let Some(path) = log_path {
        remote = remote.message_log(MessageLogMode::Diffed, path);
    }
    let remote = remote.build()?;

    let config = Config::builder()
        .schedules(true)
        .heuristics(true)
        .high_precision(true)
        .build();
    let interval = config.scan_interval();

    let hub = Hub::builder(remote)
        .config(config.clone())
        .on_signal(move |signal, snapshot| {
            if signal == Signal::Assume {
                println!("(assumed)");
            }
            println!(
                "[{}] controller: {}",
                snapshot.topology().location_name,
                snapshot.controller_mode()
            );
            for id in snapshot.zone_ids() {
                let kind = EntityKind::Zone(id.clone());
                let (Ok(name), Ok(state), Ok(current), Ok(target)) = (
                    kind.name(snapshot),
                    kind.state(snapshot, &config),
                    kind.current_temperature(snapshot),
                    kind.target_temperature(snapshot),
                ) else {
                    continue;
                };
                let current = current.map_or("--".to_string(), |t| t.to_string());
                let target = target.map_or("--".to_string(), |t| t.to_string());
                println!("  {name}: {current} -> {target} | {state}");
            }
            if let Ok(state) = EntityKind::Dhw.state(snapshot, &config) {
                println!("  Hot Water: {state}");
            }
        })
        .build();

    println!("Polling every {}s...", interval.as_secs());
    loop {
        match hub.tick(chrono::Utc::now()).await {
            Ok(outcome) => tracing::debug!(?outcome, "tick"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => eprintln!("Refresh error: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}
