use std::{collections::HashMap, time::Duration};

pub fn main() -> splitio::Result<()> {
    // Configure env_logger to see SDK logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("splitio")).init();

    let api_key = std::env::var("SPLIT_API_KEY")
        .expect("SPLIT_API_KEY env variable should contain SDK key");
    let mut config = splitio::ClientConfig::from_api_key(api_key);
    config.impression_listener(|impression: splitio::Impression| {
        println!("Logging impression: {:?}", impression);
    });
    let client = config.to_client();

    // Start background synchronization. Push notifications can be forwarded to the returned queue.
    let _notifications = client.start_synchronization()?;

    // Until the client is ready, every flag evaluates to "control".
    if let Err(err) = client.block_until_ready(Duration::from_secs(10)) {
        println!("client is not ready: {:?}", err);
    }

    let treatment = client.get_treatment("test-subject", "new-checkout", &HashMap::new());
    println!("Treatment: {:?}", treatment);

    client.destroy()
}
