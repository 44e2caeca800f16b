// BoxChat server entry point

#[tokio::main]
async fn main() {
    if let Err(e) = boxchat::run().await {
        eprintln!("boxchat failed to start: {}", e);
        std::process::exit(1);
    }
}
