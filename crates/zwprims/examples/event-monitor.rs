//! Print every application command nodes send, one JSON object per line.
//!
//! Run against a controller relayed onto a Unix socket:
//!   socat UNIX-LISTEN:/tmp/zwave.sock,fork /dev/ttyACM0,raw,b115200
//!   cargo run --example event-monitor -- /tmp/zwave.sock

#[cfg(unix)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;

    use tokio_stream::StreamExt;
    use zwprims::command::standard_registry;
    use zwprims::session::{connect_bridge, Controller, SessionConfig};

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: event-monitor <bridge socket>")?;

    let session = connect_bridge(&path, SessionConfig::default()).await?;
    let controller = Controller::new(session, Arc::new(standard_registry()?));

    let version = controller.version().await?;
    let network = controller.network_id().await?;
    eprintln!(
        "{} (type {}), home {:08X}, node {}",
        version.library, version.library_type, network.home_id, network.node_id
    );

    let mut events = controller.subscribe_events(None);
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(e) => eprintln!("undecodable command: {e}"),
        }
    }
    eprintln!("controller disconnected");
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("event-monitor requires Unix socket support");
}
