#[tokio::main]
async fn main() {
    if let Err(e) = tourney_engine_lib::run().await {
        eprintln!("tourney-engine: {e}");
        std::process::exit(1);
    }
}
