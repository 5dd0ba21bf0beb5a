/*
[INPUT]:  WebSocket URL and a trading pair
[OUTPUT]: Fan-out of real-time events for two overlapping subscriptions
[POS]:    Examples - subscription multiplexing
[UPDATE]: When the subscribe surface changes
*/

use novadex_socket::{SocketConfig, SocketManager, Stream, SubscribeOptions};
use tokio::time::{Duration, sleep};
use url::Url;

/// Example: two consumers sharing one connection
///
/// Both subscriptions want the price feed; it is subscribed on the wire
/// once and unsubscribed only when the last consumer leaves.
#[tokio::main]
async fn main() -> novadex_socket::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("novadex_socket=debug")
        .init();

    let url = Url::parse("wss://sock.novadex.example/ws")?;
    let manager = SocketManager::new(SocketConfig::new(url));

    let chart = manager.subscribe(
        SubscribeOptions::for_pair(
            "ALGO_USDC",
            vec![Stream::Price, Stream::Candles],
            1,
            "YOURADDRESS",
        ),
        |event| println!("[chart] {}: {}", event.event, event.data),
    )?;

    let book = manager.subscribe(
        SubscribeOptions::for_pair(
            "ALGO_USDC",
            vec![Stream::Price, Stream::Depth],
            1,
            "YOURADDRESS",
        ),
        |event| println!("[book] {}: {}", event.event, event.data),
    )?;

    println!("subscribed: {chart} and {book} (price is shared on the wire)");

    sleep(Duration::from_secs(10)).await;

    manager.unsubscribe(chart);
    // last handler: the connection tears down here
    manager.unsubscribe(book);

    Ok(())
}
